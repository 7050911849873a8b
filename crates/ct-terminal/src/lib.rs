//! ct-terminal: one interactive terminal over many remote shells
//!
//! [`MultiplexedTerminal`] opens a PTY-backed shell on each connected host,
//! broadcasts keystrokes to all of them and merges their output into one
//! stream. Session lifecycle (shell exit, errors, dropped input, keyword
//! alerts) is reported on a per-terminal [`SessionEvent`] queue.

mod driver;
pub mod error;
pub mod event;
mod resize;
pub mod terminal;

#[cfg(test)]
mod testing;

pub use error::TerminalError;
pub use event::SessionEvent;
pub use terminal::{MultiplexedTerminal, SessionSlot, TerminalOptions};
