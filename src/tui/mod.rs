//! Terminal user interface for both chat surfaces, built on Ratatui.

mod app;
mod compose;
mod debug_log;
mod log_capture;
mod messages;
mod sidebar;
mod ui;

pub use app::run;
pub use log_capture::LogBuffer;
