//! cluster-term: command-line front end
//!
//! Collects hosts and credentials, connects to every host in parallel while
//! reporting per-host progress, and drives one raw-mode terminal over the
//! hosts that answered.

pub mod commands;
pub mod credentials;
pub mod output;
pub mod progress;
pub mod surface;
