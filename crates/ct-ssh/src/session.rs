//! Interactive shell session over one SSH channel
//!
//! A single pump task owns the russh channel. Requests arrive on a command
//! queue, keystrokes arrive through an in-memory input pipe, and channel
//! output is written into an in-memory output pipe. Replies to requests sent
//! with `want_reply` come back in order, so pending requests are matched
//! first-in first-out against `Success`/`Failure` messages.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot, watch};

use ct_core::traits::{InputPipe, OutputPipe, ShellSession};
use ct_core::{HostName, SessionError, TerminalSize};

/// Buffer size of each in-memory pipe
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Size of the pump's stdin read buffer
const STDIN_CHUNK_SIZE: usize = 4096;

/// Capacity of the command queue
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Terminal modes sent with the PTY request: echo on, 14.4k baud
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Requests handled by the pump task
enum ChannelCommand {
    Pty {
        term: String,
        size: TerminalSize,
        reply: Reply,
    },
    Shell {
        reply: Reply,
    },
    WindowChange {
        size: TerminalSize,
        reply: Reply,
    },
    Close {
        reply: Reply,
    },
}

/// Request still waiting for the server's answer
#[derive(Debug, Clone, Copy)]
enum PendingKind {
    Pty,
    Shell,
}

impl PendingKind {
    fn rejected(self) -> SessionError {
        match self {
            PendingKind::Pty => SessionError::Pty("rejected by server".to_string()),
            PendingKind::Shell => SessionError::Shell("rejected by server".to_string()),
        }
    }
}

/// A shell session bound to one SSH channel
pub struct SshSession {
    host: HostName,
    commands: mpsc::Sender<ChannelCommand>,
    /// Caller-side ends of the input and output pipes, until taken
    pipes: Mutex<Option<(DuplexStream, DuplexStream)>>,
    /// `Some(status)` once the channel has ended
    exit: watch::Receiver<Option<Option<u32>>>,
}

impl SshSession {
    /// Start the pump task for `channel`
    pub fn spawn(host: HostName, channel: Channel<Msg>) -> Arc<Self> {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (input, stdin) = tokio::io::duplex(PIPE_BUFFER_SIZE);
        let (stdout, output) = tokio::io::duplex(PIPE_BUFFER_SIZE);
        let (exit_tx, exit) = watch::channel(None);

        let pump = Pump {
            host: host.clone(),
            channel,
            commands: command_rx,
            stdin,
            stdin_open: true,
            stdout: Some(stdout),
            pending: VecDeque::new(),
            exit_status: None,
            exit: exit_tx,
        };
        tokio::spawn(pump.run());

        Arc::new(Self {
            host,
            commands,
            pipes: Mutex::new(Some((input, output))),
            exit,
        })
    }

    pub fn host(&self) -> &HostName {
        &self.host
    }

    /// Whether the channel has ended
    pub fn is_finished(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn request(&self, build: impl FnOnce(Reply) -> ChannelCommand) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::AlreadyClosed)?;
        rx.await.map_err(|_| SessionError::AlreadyClosed)?
    }
}

#[async_trait]
impl ShellSession for SshSession {
    async fn request_pty(&self, term: &str, size: TerminalSize) -> Result<(), SessionError> {
        let term = term.to_string();
        self.request(|reply| ChannelCommand::Pty { term, size, reply }).await
    }

    fn take_pipes(&self) -> Result<(InputPipe, OutputPipe), SessionError> {
        let (input, output) = self
            .pipes
            .lock()
            .take()
            .ok_or_else(|| SessionError::Pipes("already taken".to_string()))?;
        Ok((Box::new(input), Box::new(output)))
    }

    async fn run_shell(&self) -> Result<Option<u32>, SessionError> {
        self.request(|reply| ChannelCommand::Shell { reply }).await?;
        tracing::debug!(host = %self.host, "Shell started");

        let mut exit = self.exit.clone();
        let status = *exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::AlreadyClosed)?;
        Ok(status.flatten())
    }

    async fn window_change(&self, size: TerminalSize) -> Result<(), SessionError> {
        self.request(|reply| ChannelCommand::WindowChange { size, reply }).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| ChannelCommand::Close { reply }).await
    }
}

/// What woke the pump
enum PumpEvent {
    Channel(Option<ChannelMsg>),
    Command(Option<ChannelCommand>),
    Input(io::Result<usize>),
}

struct Pump {
    host: HostName,
    channel: Channel<Msg>,
    commands: mpsc::Receiver<ChannelCommand>,
    stdin: DuplexStream,
    stdin_open: bool,
    /// Dropped on channel EOF so readers see end-of-stream
    stdout: Option<DuplexStream>,
    pending: VecDeque<(PendingKind, Reply)>,
    exit_status: Option<u32>,
    exit: watch::Sender<Option<Option<u32>>>,
}

impl Pump {
    async fn run(mut self) {
        let mut buf = vec![0u8; STDIN_CHUNK_SIZE];

        loop {
            let event = tokio::select! {
                msg = self.channel.wait() => PumpEvent::Channel(msg),
                cmd = self.commands.recv() => PumpEvent::Command(cmd),
                n = self.stdin.read(&mut buf), if self.stdin_open => PumpEvent::Input(n),
            };

            let keep_going = match event {
                PumpEvent::Channel(Some(msg)) => self.on_message(msg).await,
                PumpEvent::Channel(None) => false,
                PumpEvent::Command(Some(cmd)) => self.on_command(cmd).await,
                PumpEvent::Command(None) => {
                    // Session handle dropped
                    let _ = self.channel.close().await;
                    false
                }
                PumpEvent::Input(Ok(0)) | PumpEvent::Input(Err(_)) => {
                    self.stdin_open = false;
                    if let Err(e) = self.channel.eof().await {
                        tracing::debug!(host = %self.host, "Failed to send EOF: {}", e);
                    }
                    true
                }
                PumpEvent::Input(Ok(n)) => match self.channel.data(&buf[..n]).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(host = %self.host, "Channel write failed: {}", e);
                        false
                    }
                },
            };

            if !keep_going {
                break;
            }
        }

        self.finish();
    }

    async fn on_message(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => self.write_output(&data).await,
            ChannelMsg::ExtendedData { data, .. } => self.write_output(&data).await,
            ChannelMsg::Success => {
                if let Some((_, reply)) = self.pending.pop_front() {
                    let _ = reply.send(Ok(()));
                }
            }
            ChannelMsg::Failure => {
                if let Some((kind, reply)) = self.pending.pop_front() {
                    let _ = reply.send(Err(kind.rejected()));
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                tracing::debug!(host = %self.host, exit_status, "Remote shell exited");
                self.exit_status = Some(exit_status);
            }
            ChannelMsg::Eof => {
                self.close_output().await;
            }
            ChannelMsg::Close => return false,
            other => tracing::trace!(host = %self.host, "Ignoring channel message: {:?}", other),
        }
        true
    }

    async fn on_command(&mut self, cmd: ChannelCommand) -> bool {
        match cmd {
            ChannelCommand::Pty { term, size, reply } => {
                let sent = self
                    .channel
                    .request_pty(true, &term, size.cols as u32, size.rows as u32, 0, 0, PTY_MODES)
                    .await;
                match sent {
                    Ok(()) => self.pending.push_back((PendingKind::Pty, reply)),
                    Err(e) => {
                        let _ = reply.send(Err(SessionError::Pty(e.to_string())));
                    }
                }
                true
            }
            ChannelCommand::Shell { reply } => {
                match self.channel.request_shell(true).await {
                    Ok(()) => self.pending.push_back((PendingKind::Shell, reply)),
                    Err(e) => {
                        let _ = reply.send(Err(SessionError::Shell(e.to_string())));
                    }
                }
                true
            }
            ChannelCommand::WindowChange { size, reply } => {
                let result = self
                    .channel
                    .window_change(size.cols as u32, size.rows as u32, 0, 0)
                    .await
                    .map_err(|e| SessionError::WindowChange(e.to_string()));
                let _ = reply.send(result);
                true
            }
            ChannelCommand::Close { reply } => {
                if let Err(e) = self.channel.close().await {
                    tracing::debug!(host = %self.host, "Channel close failed: {}", e);
                }
                let _ = reply.send(Ok(()));
                false
            }
        }
    }

    async fn write_output(&mut self, data: &[u8]) {
        let Some(stdout) = self.stdout.as_mut() else {
            return;
        };
        if let Err(e) = stdout.write_all(data).await {
            // Nobody is reading the output any more
            tracing::debug!(host = %self.host, "Dropping output: {}", e);
            self.stdout = None;
        }
    }

    async fn close_output(&mut self) {
        if let Some(mut stdout) = self.stdout.take() {
            let _ = stdout.shutdown().await;
        }
    }

    fn finish(mut self) {
        for (_, reply) in self.pending.drain(..) {
            let _ = reply.send(Err(SessionError::AlreadyClosed));
        }
        self.stdout = None;
        let _ = self.exit.send(Some(self.exit_status));
        tracing::debug!(host = %self.host, exit_status = ?self.exit_status, "Channel pump finished");
    }
}
