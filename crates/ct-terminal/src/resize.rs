//! Window size propagation
//!
//! Size updates are published on a watch channel and forwarded by one task,
//! so a burst of resize events collapses into the latest size.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use ct_core::TerminalSize;

use crate::terminal::SessionSlot;

pub(crate) fn is_active(active: &DashMap<usize, bool>, index: usize) -> bool {
    active.get(&index).map(|entry| *entry).unwrap_or(false)
}

/// Send `size` to every active slot whose connection is still up
///
/// Returns the indices that accepted the change. Skipped and failed slots are
/// only logged; they are tried again on the next change.
pub(crate) async fn propagate(slots: &[SessionSlot], active: &DashMap<usize, bool>, size: TerminalSize) -> Vec<usize> {
    let attempts = slots.iter().map(|slot| async move {
        if !is_active(active, slot.index) {
            tracing::debug!(host = %slot.host, index = slot.index, "Not resizing inactive session");
            return None;
        }
        if !slot.connection.is_connected().await {
            tracing::debug!(host = %slot.host, index = slot.index, "Not resizing, connection is down");
            return None;
        }
        match slot.session.window_change(size).await {
            Ok(()) => Some(slot.index),
            Err(e) => {
                tracing::warn!(host = %slot.host, index = slot.index, "Window change to {} failed: {}", size, e);
                None
            }
        }
    });

    join_all(attempts).await.into_iter().flatten().collect()
}

/// Forward size changes until the sender is dropped
///
/// `initial` is the size the PTYs were opened with. Sizes published before
/// the task first runs are compared against it, not lost.
pub(crate) fn spawn_resize_task(
    slots: Arc<Vec<SessionSlot>>,
    active: Arc<DashMap<usize, bool>>,
    initial: TerminalSize,
    mut sizes: watch::Receiver<TerminalSize>,
) -> JoinHandle<()> {
    sizes.mark_changed();
    tokio::spawn(async move {
        let mut last = initial;

        while sizes.changed().await.is_ok() {
            let size = *sizes.borrow_and_update();
            if size == last {
                continue;
            }
            last = size;

            let resized = propagate(&slots, &active, size).await;
            tracing::debug!(%size, sessions = resized.len(), "Propagated window size");
        }
    })
}
