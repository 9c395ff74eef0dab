//! Command surface: s-expression requests against a running session.

pub mod dispatch;

pub use dispatch::handle_message;
