//! Output merge from many session pipes into one stream
//!
//! One reader task per pipe pushes host-tagged chunks onto a shared queue.
//! Each host has exactly one producer, so per-host order is preserved; there
//! is no ordering between hosts. A reader task ends for good on the first
//! read failure or end-of-stream.

use std::io;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ct_core::traits::OutputPipe;
use ct_core::{is_benign_io, HostName};

use crate::alert::{HostAlert, KeywordMatcher};
use crate::gate::CompletionGate;

/// Size of each reader task's read buffer
pub const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the shared chunk queue.
///
/// Large enough to absorb a burst from every host while the consumer is
/// rendering; small enough that a stalled consumer applies backpressure to
/// the readers instead of buffering without bound.
pub const CHUNK_QUEUE_CAPACITY: usize = 256;

/// A piece of output from one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Source index within the reader
    pub index: usize,
    /// Host that produced the output
    pub host: HostName,
    /// Raw bytes
    pub data: Bytes,
}

/// Decides which chunks reach the queue and raises keyword alerts
struct ChunkFilter {
    gate: CompletionGate,
    /// Most recently added source; the only one let through while the gate is armed
    primary: usize,
    matcher: KeywordMatcher,
    alerts: Option<mpsc::UnboundedSender<HostAlert>>,
}

impl ChunkFilter {
    fn admit(&self, index: usize) -> bool {
        index == self.primary || !self.gate.is_armed()
    }

    fn scan(&self, index: usize, host: &HostName, data: &[u8]) {
        for keyword in self.matcher.matches(data) {
            tracing::debug!(%host, index, keyword, "Keyword in output");
            if let Some(alerts) = &self.alerts {
                let _ = alerts.send(HostAlert {
                    index,
                    host: host.clone(),
                    keyword,
                });
            }
        }
    }
}

/// Consumer-side state, only touched by `read`/`recv_chunk`
struct ReadState {
    rx: mpsc::Receiver<Chunk>,
    /// Partially consumed chunk
    pending: Option<Chunk>,
    /// End-of-stream was returned; nothing is emitted after this
    finished: bool,
}

/// Merges many session output pipes into one readable stream
pub struct FanInReader {
    state: tokio::sync::Mutex<ReadState>,
    done: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FanInReader {
    /// Create a reader over `pipes`, spawning one reader task per present pipe
    ///
    /// The last entry is the primary source for completion suppression.
    /// Must be called from within a tokio runtime.
    pub fn new(
        pipes: Vec<(HostName, Option<OutputPipe>)>,
        gate: CompletionGate,
        alerts: Option<mpsc::UnboundedSender<HostAlert>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);
        let done = CancellationToken::new();
        let filter = Arc::new(ChunkFilter {
            gate,
            primary: pipes.len().saturating_sub(1),
            matcher: KeywordMatcher::new(),
            alerts,
        });

        let mut tasks = Vec::with_capacity(pipes.len());
        for (index, (host, pipe)) in pipes.into_iter().enumerate() {
            let Some(pipe) = pipe else {
                tracing::debug!(%host, index, "No output pipe, skipping");
                continue;
            };
            tasks.push(tokio::spawn(pump(
                index,
                host,
                pipe,
                tx.clone(),
                Arc::clone(&filter),
                done.clone(),
            )));
        }
        // The queue closes once every reader task has dropped its sender
        drop(tx);

        Self {
            state: tokio::sync::Mutex::new(ReadState {
                rx,
                pending: None,
                finished: false,
            }),
            done,
            tasks: Mutex::new(tasks),
        }
    }

    /// Read merged output into `buf`
    ///
    /// Drains the internal buffer first, then waits for the next chunk or
    /// the close signal. Returns `Ok(0)` once every reader task has finished
    /// (or the reader was closed) and the buffer is empty; never returns data
    /// after that.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        loop {
            if let Some(chunk) = state.pending.as_mut() {
                let n = chunk.data.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk.data[..n]);
                chunk.data.advance(n);
                if chunk.data.is_empty() {
                    state.pending = None;
                }
                return Ok(n);
            }

            match self.next(&mut state).await {
                Some(chunk) => state.pending = Some(chunk),
                None => return Ok(0),
            }
        }
    }

    /// Receive the next tagged chunk, or `None` at end-of-stream
    ///
    /// Returns the unread remainder of a partially read chunk first.
    pub async fn recv_chunk(&self) -> Option<Chunk> {
        let mut state = self.state.lock().await;
        if let Some(chunk) = state.pending.take() {
            return Some(chunk);
        }
        self.next(&mut state).await
    }

    async fn next(&self, state: &mut ReadState) -> Option<Chunk> {
        if state.finished {
            return None;
        }

        let next = tokio::select! {
            biased;
            _ = self.done.cancelled() => None,
            chunk = state.rx.recv() => chunk,
        };

        if next.is_none() {
            state.finished = true;
        }
        next
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Stop all reader tasks; pending reads return end-of-stream
    ///
    /// Idempotent: only the first call signals and waits for the tasks.
    pub async fn close(&self) {
        if self.done.is_cancelled() {
            return;
        }
        self.done.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!("Output reader task failed: {}", e);
            }
        }
    }
}

/// Read one pipe until it fails or the reader is closed
async fn pump(
    index: usize,
    host: HostName,
    mut pipe: OutputPipe,
    tx: mpsc::Sender<Chunk>,
    filter: Arc<ChunkFilter>,
    done: CancellationToken,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            _ = done.cancelled() => break,
            result = pipe.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::debug!(%host, index, "Output stream ended");
                    break;
                }
                Ok(n) => n,
                Err(e) if is_benign_io(&e) => {
                    tracing::debug!(%host, index, "Output stream closed: {}", e);
                    break;
                }
                Err(e) => {
                    tracing::warn!(%host, index, "Output read failed: {}", e);
                    break;
                }
            }
        };

        filter.scan(index, &host, &buf[..n]);

        if !filter.admit(index) {
            tracing::trace!(%host, index, bytes = n, "Suppressed while completion in flight");
            continue;
        }

        let chunk = Chunk {
            index,
            host: host.clone(),
            data: Bytes::copy_from_slice(&buf[..n]),
        };

        tokio::select! {
            _ = done.cancelled() => break,
            sent = tx.send(chunk) => if sent.is_err() {
                break;
            }
        }
    }

    tracing::trace!(%host, index, "Output reader task exiting");
}
