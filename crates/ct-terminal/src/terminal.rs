//! The multiplexed terminal

use std::io;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use ct_core::traits::{InputPipe, OutputPipe, RemoteHost, ShellSession};
use ct_core::types::DEFAULT_TERM;
use ct_core::{HostName, SessionError, TerminalSize};
use ct_mux::{Chunk, CompletionGate, FanInReader, FanOutWriter, DEFAULT_COMPLETION_WINDOW};

use crate::driver::spawn_driver;
use crate::error::TerminalError;
use crate::event::{spawn_relay, SessionEvent};
use crate::resize::{self, spawn_resize_task};

/// How long `close` waits for each shell driver to wind down
const DRIVER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// PTY and multiplexing parameters
#[derive(Debug, Clone)]
pub struct TerminalOptions {
    /// Terminal type sent with each PTY request
    pub term: String,
    /// Initial window size
    pub size: TerminalSize,
    /// How long a Tab suppresses output from all but the last session
    pub completion_window: Duration,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            size: TerminalSize::default(),
            completion_window: DEFAULT_COMPLETION_WINDOW,
        }
    }
}

/// One started session and the connection that owns it
pub struct SessionSlot {
    pub index: usize,
    pub host: HostName,
    pub session: Arc<dyn ShellSession>,
    pub connection: Arc<dyn RemoteHost>,
}

/// One terminal surface backed by N remote shells
pub struct MultiplexedTerminal {
    slots: Arc<Vec<SessionSlot>>,
    active: Arc<DashMap<usize, bool>>,
    writer: FanOutWriter,
    reader: FanInReader,
    gate: CompletionGate,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    sizes: watch::Sender<TerminalSize>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
    resize_task: Mutex<Option<JoinHandle<()>>>,
    closed: tokio::sync::Mutex<bool>,
}

impl MultiplexedTerminal {
    /// Start a PTY-backed shell on every connection
    ///
    /// Connections whose session or PTY setup fails are skipped with a
    /// warning. Fails only when no session could be started at all.
    pub async fn new(connections: Vec<Arc<dyn RemoteHost>>, options: TerminalOptions) -> Result<Self, TerminalError> {
        let mut slots = Vec::with_capacity(connections.len());
        let mut inputs = Vec::with_capacity(connections.len());
        let mut outputs = Vec::with_capacity(connections.len());

        for connection in connections {
            let host = connection.host().clone();
            match open_session(connection.as_ref(), &options).await {
                Ok((session, input, output)) => {
                    let index = slots.len();
                    tracing::debug!(%host, index, "Session ready");
                    inputs.push((host.clone(), Some(input)));
                    outputs.push((host.clone(), Some(output)));
                    slots.push(SessionSlot {
                        index,
                        host,
                        session,
                        connection,
                    });
                }
                Err(e) => tracing::warn!(%host, "Skipping host, session setup failed: {}", e),
            }
        }

        if slots.is_empty() {
            return Err(TerminalError::NoSessions);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        spawn_relay(failure_rx, alert_rx, event_tx.clone());

        let gate = CompletionGate::new(options.completion_window);
        let writer = FanOutWriter::new(inputs, gate.clone(), Some(failure_tx));
        let reader = FanInReader::new(outputs, gate.clone(), Some(alert_tx));

        let active: Arc<DashMap<usize, bool>> = Arc::new(slots.iter().map(|slot| (slot.index, true)).collect());
        let drivers = slots
            .iter()
            .map(|slot| spawn_driver(slot, Arc::clone(&active), event_tx.clone()))
            .collect();

        let slots = Arc::new(slots);
        let (sizes, size_rx) = watch::channel(options.size);
        let resize_task = spawn_resize_task(Arc::clone(&slots), Arc::clone(&active), options.size, size_rx);

        tracing::info!(sessions = slots.len(), "Multiplexed terminal started");

        Ok(Self {
            slots,
            active,
            writer,
            reader,
            gate,
            events: Mutex::new(Some(event_rx)),
            sizes,
            drivers: Mutex::new(drivers),
            resize_task: Mutex::new(Some(resize_task)),
            closed: tokio::sync::Mutex::new(false),
        })
    }

    /// Broadcast keystrokes to every session
    pub fn write(&self, data: &[u8]) -> Result<usize, TerminalError> {
        Ok(self.writer.write(data)?)
    }

    /// Read merged output; `Ok(0)` once every session's output has ended
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }

    /// Next chunk of output tagged with its source
    pub async fn recv_chunk(&self) -> Option<Chunk> {
        self.reader.recv_chunk().await
    }

    /// Take the lifecycle event queue; only the first call gets it
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.lock().take()
    }

    /// Publish a new window size; only actual changes are forwarded
    pub fn resize(&self, size: TerminalSize) {
        self.sizes.send_replace(size);
    }

    /// Forward `size` once, now; returns the indices that were resized
    pub async fn propagate_resize(&self, size: TerminalSize) -> Vec<usize> {
        resize::propagate(&self.slots, &self.active, size).await
    }

    pub fn session_count(&self) -> usize {
        self.slots.len()
    }

    /// Sessions whose shell has not ended yet
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|entry| *entry.value()).count()
    }

    pub fn is_active(&self, index: usize) -> bool {
        resize::is_active(&self.active, index)
    }

    /// Hosts in session order
    pub fn hosts(&self) -> Vec<HostName> {
        self.slots.iter().map(|slot| slot.host.clone()).collect()
    }

    pub fn completion_gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// Tear everything down once
    ///
    /// Concurrent and repeated calls after the first return `Ok(())` right
    /// away. Order: output reader, input writer (which shuts the input pipes),
    /// sessions, then the background tasks.
    pub async fn close(&self) -> Result<(), TerminalError> {
        let Ok(mut closed) = self.closed.try_lock() else {
            tracing::debug!("Terminal close already in progress");
            return Ok(());
        };
        if *closed {
            return Ok(());
        }
        *closed = true;

        tracing::info!(sessions = self.slots.len(), "Closing multiplexed terminal");
        let mut failures = Vec::new();

        self.reader.close().await;

        if let Err(e) = self.writer.close().await {
            failures.push(e.to_string());
        }

        for slot in self.slots.iter() {
            match slot.session.close().await {
                Ok(()) => {}
                Err(e) if e.is_benign() => {
                    tracing::debug!(host = %slot.host, "Session already closed");
                }
                Err(e) => failures.push(format!("{}: {}", slot.host, e)),
            }
        }

        if let Some(task) = self.resize_task.lock().take() {
            task.abort();
        }

        let drivers = std::mem::take(&mut *self.drivers.lock());
        for driver in drivers {
            if tokio::time::timeout(DRIVER_JOIN_TIMEOUT, driver).await.is_err() {
                tracing::debug!("Session driver still running after close");
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TerminalError::Close { failures })
        }
    }
}

/// Create a session with a PTY and take its pipes
///
/// A session that fails after creation is closed before the error is returned.
async fn open_session(
    connection: &dyn RemoteHost,
    options: &TerminalOptions,
) -> Result<(Arc<dyn ShellSession>, InputPipe, OutputPipe), SessionError> {
    let session = connection.create_session().await?;

    let setup = async {
        session.request_pty(&options.term, options.size).await?;
        session.take_pipes()
    }
    .await;

    match setup {
        Ok((input, output)) => Ok((session, input, output)),
        Err(e) => {
            if let Err(close_err) = session.close().await {
                tracing::debug!(host = %connection.host(), "Closing failed session: {}", close_err);
            }
            Err(e)
        }
    }
}
