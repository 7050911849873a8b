//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::types::DEFAULT_TERM;

/// Configuration for opening multiplexed sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Username for SSH authentication
    pub username: String,

    /// SSH port used for every host
    pub port: u16,

    /// Handshake timeout per host
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Pseudo-terminal type requested on every session
    pub term: String,

    /// How long output from secondary hosts is suppressed after a Tab
    #[serde(with = "duration_millis")]
    pub completion_window: Duration,

    /// Private key to offer before the password
    pub private_key_path: Option<PathBuf>,

    /// Hosts to connect to when none are given on the command line
    pub hosts: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: whoami::username(),
            port: 22,
            connect_timeout: Duration::from_secs(10),
            term: DEFAULT_TERM.to_string(),
            completion_window: Duration::from_millis(250),
            private_key_path: None,
            hosts: vec![],
        }
    }
}
