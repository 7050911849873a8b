//! ct-mux: Fan-out/fan-in multiplexing over independent byte streams
//!
//! A [`FanOutWriter`] broadcasts one input stream to many pipes, each fed by
//! its own forwarding task so a slow pipe never holds up the others. A
//! [`FanInReader`] merges many pipes into one readable stream of host-tagged
//! chunks. Both halves share a [`CompletionGate`]: writing a Tab arms it, and
//! while armed only the most recently added source is let through, which
//! keeps N copies of an interactive completion menu off the screen.

pub mod alert;
pub mod error;
pub mod fan_in;
pub mod fan_out;
pub mod gate;

pub use alert::{HostAlert, KeywordMatcher, ALERT_KEYWORDS};
pub use error::MuxError;
pub use fan_in::{Chunk, FanInReader, CHUNK_QUEUE_CAPACITY, READ_BUFFER_SIZE};
pub use fan_out::{FanOutWriter, PipeFailure, CLOSE_FLUSH_TIMEOUT};
pub use gate::{CompletionGate, DEFAULT_COMPLETION_WINDOW};
