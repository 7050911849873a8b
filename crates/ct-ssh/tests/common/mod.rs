//! In-process SSH server for integration tests
//!
//! Accepts one user by password (or by keyboard-interactive answered with
//! the same password), grants PTY and shell requests, echoes
//! input back, and ends the shell with status 0 when it sees `exit`.

#![allow(dead_code)]

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use russh::server::{Auth, Handler, Msg, Response, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;

pub const USER: &str = "tester";
pub const PASSWORD: &str = "secret";
pub const PROMPT: &[u8] = b"$ ";

/// What the server observed, shared across connections
#[derive(Default, Clone)]
pub struct Recorder {
    /// (term, cols, rows) per PTY request
    pub ptys: Arc<Mutex<Vec<(String, u32, u32)>>>,
    /// (cols, rows) per window change
    pub resizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

/// How the server lets the test user in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Password,
    /// Plain password auth is refused; the password must be typed at a
    /// keyboard-interactive prompt
    KeyboardInteractive,
}

struct EchoHandler {
    recorder: Recorder,
    mode: AuthMode,
}

#[async_trait]
impl Handler for EchoHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if self.mode == AuthMode::Password && user == USER && password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn auth_keyboard_interactive(
        &mut self,
        user: &str,
        _submethods: &str,
        response: Option<Response<'async_trait>>,
    ) -> Result<Auth, Self::Error> {
        if self.mode != AuthMode::KeyboardInteractive || user != USER {
            return Ok(Auth::Reject {
                proceed_with_methods: None,
            });
        }
        match response {
            None => Ok(Auth::Partial {
                name: Cow::Borrowed("login"),
                instructions: Cow::Borrowed(""),
                prompts: Cow::Owned(vec![(Cow::Borrowed("Password: "), false)]),
            }),
            Some(mut answers) => {
                if answers.next() == Some(PASSWORD.as_bytes()) {
                    Ok(Auth::Accept)
                } else {
                    Ok(Auth::Reject {
                        proceed_with_methods: None,
                    })
                }
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.recorder
            .ptys
            .lock()
            .push((term.to_string(), col_width, row_height));
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        session.channel_success(channel);
        session.data(channel, CryptoVec::from_slice(PROMPT));
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.recorder.resizes.lock().push((col_width, row_height));
        Ok(())
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        if data.windows(4).any(|w| w == b"exit") {
            session.exit_status_request(channel, 0);
            session.eof(channel);
            session.close(channel);
        } else {
            session.data(channel, CryptoVec::from_slice(data));
        }
        Ok(())
    }
}

/// Start a password-auth server on an ephemeral loopback port
pub async fn spawn_server() -> (SocketAddr, Recorder) {
    spawn_server_with(AuthMode::Password).await
}

/// Start a server that admits the test user only through `mode`
pub async fn spawn_server_with(mode: AuthMode) -> (SocketAddr, Recorder) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = russh::server::Config::default();
    config.keys.push(KeyPair::generate_ed25519().unwrap());
    config.auth_rejection_time = Duration::from_millis(10);
    config.auth_rejection_time_initial = Some(Duration::from_millis(0));
    let config = Arc::new(config);

    let recorder = Recorder::default();
    let shared = recorder.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = EchoHandler {
                recorder: shared.clone(),
                mode,
            };
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                let _ = russh::server::run_stream(config, socket, handler).await;
            });
        }
    });

    (addr, recorder)
}
