//! STOMP over WebSocket
//!
//! Minimal STOMP 1.2 client: the frame codec plus a socket wrapper that
//! handles the CONNECT handshake, subscriptions, heartbeats and teardown.

pub mod frame;
pub mod socket;

pub use frame::{Command, Frame, Incoming, StompError};
pub use socket::{ConnectOptions, StompSocket};
