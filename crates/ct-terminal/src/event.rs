//! Session lifecycle events

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ct_core::HostName;
use ct_mux::{HostAlert, PipeFailure};

/// Something that happened to one session after setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The remote shell ended normally or the session was closed
    Ended {
        index: usize,
        host: HostName,
        exit_status: Option<u32>,
    },
    /// The shell loop failed
    Errored {
        index: usize,
        host: HostName,
        error: String,
    },
    /// Keystrokes could no longer be delivered to this session
    InputFailed {
        index: usize,
        host: HostName,
        error: String,
    },
    /// Output matched an alert keyword
    Alert {
        host: HostName,
        keyword: &'static str,
    },
}

impl SessionEvent {
    pub fn host(&self) -> &HostName {
        match self {
            SessionEvent::Ended { host, .. }
            | SessionEvent::Errored { host, .. }
            | SessionEvent::InputFailed { host, .. }
            | SessionEvent::Alert { host, .. } => host,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Ended {
                host,
                exit_status: Some(status),
                ..
            } => write!(f, "{}: session ended (exit status {})", host, status),
            SessionEvent::Ended { host, .. } => write!(f, "{}: session ended", host),
            SessionEvent::Errored { host, error, .. } => write!(f, "{}: session failed: {}", host, error),
            SessionEvent::InputFailed { host, error, .. } => write!(f, "{}: input dropped: {}", host, error),
            SessionEvent::Alert { host, keyword } => write!(f, "{}: output mentions \"{}\"", host, keyword),
        }
    }
}

/// Forward multiplexer reports onto the event queue
///
/// Ends once both report queues are closed.
pub(crate) fn spawn_relay(
    mut failures: mpsc::UnboundedReceiver<PipeFailure>,
    mut alerts: mpsc::UnboundedReceiver<HostAlert>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut failures_open = true;
        let mut alerts_open = true;

        while failures_open || alerts_open {
            let event = tokio::select! {
                failure = failures.recv(), if failures_open => match failure {
                    Some(PipeFailure { index, host, error }) => SessionEvent::InputFailed {
                        index,
                        host,
                        error: error.to_string(),
                    },
                    None => {
                        failures_open = false;
                        continue;
                    }
                },
                alert = alerts.recv(), if alerts_open => match alert {
                    Some(HostAlert { host, keyword, .. }) => SessionEvent::Alert { host, keyword },
                    None => {
                        alerts_open = false;
                        continue;
                    }
                },
            };
            let _ = events.send(event);
        }
    })
}
