//! Keystroke broadcast to many input pipes
//!
//! Every pipe is owned by its own forwarding task fed by an unbounded queue.
//! `write` only enqueues, so one call dispatches to all pipes without waiting
//! for any individual delivery, and a stalled pipe cannot block the others.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ct_core::traits::InputPipe;
use ct_core::{is_benign_io, HostName};

use crate::error::MuxError;
use crate::gate::CompletionGate;

const TAB: u8 = b'\t';

/// How long `close` lets forwarders flush before abandoning stalled pipes
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// A write failure on one pipe
///
/// The pipe is considered dead afterwards and no longer receives data.
#[derive(Debug)]
pub struct PipeFailure {
    /// Source index within the writer
    pub index: usize,
    /// Host behind the pipe
    pub host: HostName,
    /// Underlying error
    pub error: io::Error,
}

/// Broadcasts one input stream to many session input pipes
pub struct FanOutWriter {
    /// Per-pipe queues; `None` slots are absent or dead pipes
    senders: Mutex<Option<Vec<Option<mpsc::UnboundedSender<Bytes>>>>>,
    /// Forwarding tasks, drained by `close`
    tasks: Mutex<Vec<(HostName, JoinHandle<io::Result<()>>)>>,
    /// Fired by `close` when forwarders do not finish in time
    abandon: CancellationToken,
    gate: CompletionGate,
}

impl FanOutWriter {
    /// Create a writer over `pipes`, spawning one forwarder per present pipe
    ///
    /// Must be called from within a tokio runtime. Write failures are
    /// reported on `failures` when provided.
    pub fn new(
        pipes: Vec<(HostName, Option<InputPipe>)>,
        gate: CompletionGate,
        failures: Option<mpsc::UnboundedSender<PipeFailure>>,
    ) -> Self {
        let mut senders = Vec::with_capacity(pipes.len());
        let mut tasks = Vec::with_capacity(pipes.len());
        let abandon = CancellationToken::new();

        for (index, (host, pipe)) in pipes.into_iter().enumerate() {
            let Some(pipe) = pipe else {
                tracing::debug!(%host, index, "No input pipe, skipping");
                senders.push(None);
                continue;
            };

            let (tx, rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(forward(
                index,
                host.clone(),
                pipe,
                rx,
                failures.clone(),
                abandon.clone(),
            ));
            senders.push(Some(tx));
            tasks.push((host, handle));
        }

        Self {
            senders: Mutex::new(Some(senders)),
            tasks: Mutex::new(tasks),
            abandon,
            gate,
        }
    }

    /// Send `data` to every still-open pipe
    ///
    /// Returns `data.len()` once the bytes are queued for every pipe; per-pipe
    /// delivery failures surface through the failure queue, not here. A Tab
    /// anywhere in `data` arms the completion gate.
    pub fn write(&self, data: &[u8]) -> Result<usize, MuxError> {
        let mut guard = self.senders.lock();
        let senders = guard.as_mut().ok_or(MuxError::Closed)?;

        if data.contains(&TAB) {
            self.gate.arm();
        }

        let chunk = Bytes::copy_from_slice(data);
        for slot in senders.iter_mut() {
            let dead = matches!(slot, Some(tx) if tx.send(chunk.clone()).is_err());
            if dead {
                // Forwarder exited after a write failure
                *slot = None;
            }
        }

        Ok(data.len())
    }

    /// Number of pipes still accepting data
    pub fn open_count(&self) -> usize {
        self.senders
            .lock()
            .as_ref()
            .map(|senders| {
                senders
                    .iter()
                    .flatten()
                    .filter(|tx| !tx.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Shared completion gate
    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// Close every pipe
    ///
    /// Queued data is flushed before each pipe is shut down. Pipes that do
    /// not drain within [`CLOSE_FLUSH_TIMEOUT`] are abandoned with whatever
    /// is still queued. End-of-stream class errors are swallowed; anything
    /// else is aggregated. Safe to call more than once.
    pub async fn close(&self) -> Result<(), MuxError> {
        // Dropping the senders ends every forwarder's loop
        drop(self.senders.lock().take());
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return Ok(());
        }

        let (hosts, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let joined = join_all(handles);
        tokio::pin!(joined);
        let results = tokio::select! {
            results = &mut joined => results,
            _ = tokio::time::sleep(CLOSE_FLUSH_TIMEOUT) => {
                tracing::debug!("Input pipes still busy, abandoning pending keystrokes");
                self.abandon.cancel();
                joined.await
            }
        };

        let mut failures = Vec::new();
        for (host, result) in hosts.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) if is_benign_io(&e) => {
                    tracing::debug!(%host, "Input pipe already closed: {}", e);
                }
                Ok(Err(e)) => failures.push(format!("{}: {}", host, e)),
                Err(e) => failures.push(format!("{}: forwarder task failed: {}", host, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MuxError::Close { failures })
        }
    }
}

/// Drain one pipe's queue into the pipe, then shut it down
///
/// Returns early, without shutting the pipe down, once `abandon` fires.
async fn forward(
    index: usize,
    host: HostName,
    mut pipe: InputPipe,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    failures: Option<mpsc::UnboundedSender<PipeFailure>>,
    abandon: CancellationToken,
) -> io::Result<()> {
    loop {
        let data = tokio::select! {
            biased;
            _ = abandon.cancelled() => return Ok(()),
            data = rx.recv() => data,
        };
        let Some(data) = data else { break };

        let result = tokio::select! {
            _ = abandon.cancelled() => {
                tracing::debug!(%host, index, "Input pipe stalled, dropping queued keystrokes");
                return Ok(());
            }
            result = async {
                pipe.write_all(&data).await?;
                pipe.flush().await
            } => result,
        };

        if let Err(error) = result {
            if is_benign_io(&error) {
                tracing::debug!(%host, index, "Input pipe closed: {}", error);
            } else {
                tracing::warn!(%host, index, "Dropping keystrokes, input write failed: {}", error);
            }
            if let Some(failures) = &failures {
                let _ = failures.send(PipeFailure { index, host, error });
            }
            return Ok(());
        }
    }

    let shutdown = tokio::select! {
        _ = abandon.cancelled() => return Ok(()),
        result = pipe.shutdown() => result,
    };
    match shutdown {
        Err(e) if is_benign_io(&e) => Ok(()),
        other => other,
    }
}

impl AsyncWrite for FanOutWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(
            FanOutWriter::write(&self, buf)
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e)),
        )
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Forwarders finish their queues and shut the pipes down on their own
        drop(self.senders.lock().take());
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn writer_over(count: usize) -> (FanOutWriter, Vec<DuplexStream>) {
        let mut pipes = Vec::new();
        let mut remotes = Vec::new();
        for i in 0..count {
            let (local, remote) = duplex(1024);
            pipes.push((HostName::new(format!("host-{}", i)), Some(Box::new(local) as InputPipe)));
            remotes.push(remote);
        }
        (FanOutWriter::new(pipes, CompletionGate::default(), None), remotes)
    }

    async fn read_exact(remote: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), remote.read_exact(&mut buf))
            .await
            .expect("timed out waiting for broadcast")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_write_reaches_every_pipe_unmodified() {
        let (writer, mut remotes) = writer_over(3);

        let n = writer.write(b"uptime\r").unwrap();
        assert_eq!(n, 7);

        for remote in remotes.iter_mut() {
            assert_eq!(read_exact(remote, 7).await, b"uptime\r");
        }
    }

    #[tokio::test]
    async fn test_absent_pipes_are_skipped() {
        let (local, mut remote) = duplex(64);
        let pipes = vec![
            (HostName::new("gone"), None),
            (HostName::new("live"), Some(Box::new(local) as InputPipe)),
        ];
        let writer = FanOutWriter::new(pipes, CompletionGate::default(), None);

        writer.write(b"ls\r").unwrap();
        assert_eq!(read_exact(&mut remote, 3).await, b"ls\r");
        assert_eq!(writer.open_count(), 1);
    }

    #[tokio::test]
    async fn test_dead_pipe_does_not_block_others() {
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
        let (dead_local, dead_remote) = duplex(64);
        let (live_local, mut live_remote) = duplex(64);
        drop(dead_remote);

        let pipes = vec![
            (HostName::new("dead"), Some(Box::new(dead_local) as InputPipe)),
            (HostName::new("live"), Some(Box::new(live_local) as InputPipe)),
        ];
        let writer = FanOutWriter::new(pipes, CompletionGate::default(), Some(failure_tx));

        writer.write(b"whoami\r").unwrap();
        assert_eq!(read_exact(&mut live_remote, 7).await, b"whoami\r");

        let failure = tokio::time::timeout(Duration::from_secs(2), failure_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failure.index, 0);
        assert_eq!(failure.host.as_str(), "dead");

        // Further writes still succeed for the caller and reach the live pipe
        writer.write(b"id\r").unwrap();
        assert_eq!(read_exact(&mut live_remote, 3).await, b"id\r");
    }

    #[tokio::test]
    async fn test_stalled_pipe_does_not_block_others() {
        // A 1-byte buffer nobody reads from stalls its forwarder
        let (stalled_local, _stalled_remote) = duplex(1);
        let (live_local, mut live_remote) = duplex(1024);
        let pipes = vec![
            (HostName::new("slow"), Some(Box::new(stalled_local) as InputPipe)),
            (HostName::new("fast"), Some(Box::new(live_local) as InputPipe)),
        ];
        let writer = FanOutWriter::new(pipes, CompletionGate::default(), None);

        for _ in 0..10 {
            writer.write(b"abc").unwrap();
        }
        assert_eq!(read_exact(&mut live_remote, 30).await, b"abc".repeat(10));
    }

    #[tokio::test]
    async fn test_tab_arms_gate() {
        let (writer, _remotes) = writer_over(2);
        assert!(!writer.gate().is_armed());

        writer.write(b"sys").unwrap();
        assert!(!writer.gate().is_armed());

        writer.write(b"\t").unwrap();
        assert!(writer.gate().is_armed());
    }

    #[tokio::test]
    async fn test_close_shuts_pipes_and_is_idempotent() {
        let (writer, mut remotes) = writer_over(2);
        writer.write(b"exit\r").unwrap();

        writer.close().await.unwrap();
        writer.close().await.unwrap();

        for remote in remotes.iter_mut() {
            let mut all = Vec::new();
            remote.read_to_end(&mut all).await.unwrap();
            assert_eq!(all, b"exit\r");
        }
        assert!(matches!(writer.write(b"x"), Err(MuxError::Closed)));
        assert_eq!(writer.open_count(), 0);
    }

    #[tokio::test]
    async fn test_close_does_not_wait_forever_on_stalled_pipe() {
        let (stalled_local, _stalled_remote) = duplex(1);
        let (live_local, mut live_remote) = duplex(1024);
        let pipes = vec![
            (HostName::new("slow"), Some(Box::new(stalled_local) as InputPipe)),
            (HostName::new("fast"), Some(Box::new(live_local) as InputPipe)),
        ];
        let writer = FanOutWriter::new(pipes, CompletionGate::default(), None);
        writer.write(b"abcdef").unwrap();

        tokio::time::timeout(Duration::from_secs(3), writer.close())
            .await
            .expect("close blocked on a stalled pipe")
            .unwrap();

        let mut all = Vec::new();
        live_remote.read_to_end(&mut all).await.unwrap();
        assert_eq!(all, b"abcdef");
    }

    #[tokio::test]
    async fn test_async_write_broadcasts() {
        let (mut writer, mut remotes) = writer_over(2);

        let n = AsyncWriteExt::write(&mut writer, b"pwd\r").await.unwrap();
        assert_eq!(n, 4);
        for remote in remotes.iter_mut() {
            assert_eq!(read_exact(remote, 4).await, b"pwd\r");
        }

        writer.shutdown().await.unwrap();
        assert!(matches!(FanOutWriter::write(&writer, b"x"), Err(MuxError::Closed)));
    }
}
