//! Per-session shell driver

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::SessionEvent;
use crate::terminal::SessionSlot;

/// Run the slot's shell until it exits, then retire the slot
///
/// The slot is marked inactive exactly once, when the shell loop returns,
/// and the outcome is reported on `events`.
pub(crate) fn spawn_driver(
    slot: &SessionSlot,
    active: Arc<DashMap<usize, bool>>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    let index = slot.index;
    let host = slot.host.clone();
    let session = Arc::clone(&slot.session);

    tokio::spawn(async move {
        let result = session.run_shell().await;
        active.insert(index, false);

        let event = match result {
            Ok(exit_status) => {
                tracing::info!(%host, index, ?exit_status, "Session ended");
                SessionEvent::Ended {
                    index,
                    host,
                    exit_status,
                }
            }
            Err(e) if e.is_benign() => {
                tracing::debug!(%host, index, "Session closed: {}", e);
                SessionEvent::Ended {
                    index,
                    host,
                    exit_status: None,
                }
            }
            Err(e) => {
                tracing::warn!(%host, index, "Session failed: {}", e);
                SessionEvent::Errored {
                    index,
                    host,
                    error: e.to_string(),
                }
            }
        };
        let _ = events.send(event);
    })
}
