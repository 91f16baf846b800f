//! Live chat: message state, connection lifecycle and the session driver.
//!
//! Everything except [`driver`] and [`cli`] is synchronous and free of I/O, so the
//! session logic can be exercised directly in tests.

pub mod cli;
pub mod composer;
pub mod connection;
pub mod driver;
pub mod selector;
pub mod session;
pub mod store;
pub mod subscriber;

pub use composer::SendRejection;
pub use connection::{ConnectionState, ReconnectPolicy};
pub use driver::{SessionEvent, SessionHandle};
pub use selector::Conversation;
pub use session::{AdminSurface, ChatSession, SessionView, Surface, UserSurface};
pub use subscriber::Destinations;
