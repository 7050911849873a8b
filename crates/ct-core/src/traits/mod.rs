//! Core trait definitions

mod connection;
mod session;

pub use connection::RemoteHost;
pub use session::{InputPipe, OutputPipe, ShellSession};
