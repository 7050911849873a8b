//! In-memory hosts and sessions for terminal tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::watch;

use ct_core::traits::{InputPipe, OutputPipe, RemoteHost, ShellSession};
use ct_core::{HostName, SessionError, TerminalSize};

const PIPE_CAPACITY: usize = 8192;

/// How a fake shell finishes
#[derive(Debug, Clone)]
pub enum ShellEnd {
    Exited(Option<u32>),
    Failed(String),
}

/// Test-side ends of a fake session's pipes
pub struct FakeRemote {
    /// Receives what the terminal wrote to the session
    pub input: DuplexStream,
    /// Bytes written here appear as session output
    pub output: DuplexStream,
}

pub struct FakeSession {
    pipes: Mutex<Option<(DuplexStream, DuplexStream)>>,
    end: watch::Sender<Option<ShellEnd>>,
    fail_pty: AtomicBool,
    ptys: Mutex<Vec<(String, TerminalSize)>>,
    resizes: Mutex<Vec<TerminalSize>>,
    close_calls: AtomicUsize,
}

impl FakeSession {
    pub fn end(&self, how: ShellEnd) {
        self.end.send_replace(Some(how));
    }

    pub fn fail_pty(&self) {
        self.fail_pty.store(true, Ordering::SeqCst);
    }

    pub fn ptys(&self) -> Vec<(String, TerminalSize)> {
        self.ptys.lock().clone()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.resizes.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn has_ended(&self) -> bool {
        self.end.borrow().is_some()
    }
}

#[async_trait]
impl ShellSession for FakeSession {
    async fn request_pty(&self, term: &str, size: TerminalSize) -> Result<(), SessionError> {
        if self.fail_pty.load(Ordering::SeqCst) {
            return Err(SessionError::Pty("rejected".to_string()));
        }
        self.ptys.lock().push((term.to_string(), size));
        Ok(())
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
        let mut end = self.end.subscribe();
        let how = end
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::AlreadyClosed)?
            .clone();
        match how {
            Some(ShellEnd::Exited(status)) => Ok(status),
            Some(ShellEnd::Failed(message)) => Err(SessionError::Shell(message)),
            None => Err(SessionError::AlreadyClosed),
        }
    }

    async fn window_change(&self, size: TerminalSize) -> Result<(), SessionError> {
        if self.has_ended() {
            return Err(SessionError::AlreadyClosed);
        }
        self.resizes.lock().push(size);
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.has_ended() {
            return Err(SessionError::AlreadyClosed);
        }
        self.end(ShellEnd::Exited(None));
        Ok(())
    }
}

pub struct FakeHost {
    host: HostName,
    session: Arc<FakeSession>,
    connected: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeHost {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteHost for FakeHost {
    fn host(&self) -> &HostName {
        &self.host
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_session(&self) -> Result<Arc<dyn ShellSession>, SessionError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::Setup("refused".to_string()));
        }
        let session: Arc<dyn ShellSession> = self.session.clone();
        Ok(session)
    }
}

/// A connected fake host with one session and the test's ends of its pipes
pub fn fake_host(name: &str) -> (Arc<FakeHost>, Arc<FakeSession>, FakeRemote) {
    let (input_local, input_remote) = duplex(PIPE_CAPACITY);
    let (output_local, output_remote) = duplex(PIPE_CAPACITY);
    let (end, _) = watch::channel(None);

    let session = Arc::new(FakeSession {
        pipes: Mutex::new(Some((input_local, output_local))),
        end,
        fail_pty: AtomicBool::new(false),
        ptys: Mutex::new(Vec::new()),
        resizes: Mutex::new(Vec::new()),
        close_calls: AtomicUsize::new(0),
    });
    let host = Arc::new(FakeHost {
        host: HostName::new(name),
        session: Arc::clone(&session),
        connected: AtomicBool::new(true),
        fail_create: AtomicBool::new(false),
    });
    let remote = FakeRemote {
        input: input_remote,
        output: output_remote,
    };

    (host, session, remote)
}
