//! CLI commands for lockbox.

pub mod session;

pub use session::{parse_item, SessionAction, SessionCommand, SessionOptions, SessionOutput};
