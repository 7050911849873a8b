//! Host and credential collection
//!
//! Flags win over the config file. The password comes from `--password`,
//! `CT_PASSWORD`, or an interactive prompt.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use thiserror::Error;

use ct_core::config::ClientConfig;
use ct_core::HostName;
use ct_ssh::{ConnectionDescriptor, Credentials};

use crate::commands::ConnectArgs;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No hosts given; pass them as arguments or set `hosts` in the config file")]
    NoHosts,

    #[error("Failed to read private key {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Password prompt cancelled")]
    PromptCancelled,

    #[error("Password prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Everything needed to connect to the requested hosts
#[derive(Debug, Clone)]
pub struct Target {
    /// Hosts in the order given, without duplicates
    pub hosts: Vec<HostName>,
    pub credentials: Credentials,
    pub port: u16,
    pub timeout: Duration,
    pub term: String,
    pub completion_window: Duration,
}

impl Target {
    /// One descriptor per host, in host order
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.credentials
            .descriptors_for(self.hosts.iter().cloned(), self.port, self.timeout)
    }
}

/// Merge flags and config into a target, without asking for a password
pub fn resolve(args: &ConnectArgs, config: &ClientConfig) -> Result<Target, CredentialError> {
    let requested = if args.hosts.is_empty() {
        &config.hosts
    } else {
        &args.hosts
    };

    let mut hosts: Vec<HostName> = Vec::with_capacity(requested.len());
    for host in requested.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        let host = HostName::new(host);
        if hosts.contains(&host) {
            tracing::warn!(%host, "Ignoring duplicate host");
            continue;
        }
        hosts.push(host);
    }
    if hosts.is_empty() {
        return Err(CredentialError::NoHosts);
    }

    let key_path = args.identity.clone().or_else(|| config.private_key_path.clone());
    let private_key = match key_path {
        Some(path) => Some(std::fs::read(&path).map_err(|source| CredentialError::KeyRead { path, source })?),
        None => None,
    };

    let credentials = Credentials {
        username: args.user.clone().unwrap_or_else(|| config.username.clone()),
        password: args.password.clone().unwrap_or_default(),
        use_key: private_key.is_some(),
        private_key,
    };

    Ok(Target {
        hosts,
        credentials,
        port: args.port.unwrap_or(config.port),
        timeout: args.timeout.map(Duration::from_secs).unwrap_or(config.connect_timeout),
        term: args.term.clone().unwrap_or_else(|| config.term.clone()),
        completion_window: config.completion_window,
    })
}

/// Whether a password should be asked for interactively
pub fn needs_prompt(args: &ConnectArgs, target: &Target) -> bool {
    !args.no_prompt
        && target.credentials.password.is_empty()
        && !target.credentials.use_key
        && std::io::stdin().is_terminal()
}

/// Read a password without echo
///
/// Runs the terminal in raw mode for the duration of the prompt. Ctrl+C or
/// Esc cancels.
pub fn prompt_password(prompt: &str) -> Result<String, CredentialError> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    enable_raw_mode()?;
    let result = read_hidden_line();
    disable_raw_mode()?;
    writeln!(stderr)?;

    result
}

fn read_hidden_line() -> Result<String, CredentialError> {
    let mut password = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, kind, ..
        }) = event::read()?
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }

        match code {
            KeyCode::Enter => return Ok(password),
            KeyCode::Esc => return Err(CredentialError::PromptCancelled),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(CredentialError::PromptCancelled);
            }
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            username: "from-config".to_string(),
            port: 2222,
            hosts: vec!["cfg-a".to_string(), "cfg-b".to_string()],
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_config_hosts_used_when_none_given() {
        let target = resolve(&ConnectArgs::default(), &config()).unwrap();
        assert_eq!(target.hosts, vec![HostName::new("cfg-a"), HostName::new("cfg-b")]);
        assert_eq!(target.credentials.username, "from-config");
        assert_eq!(target.port, 2222);
    }

    #[test]
    fn test_flags_override_config() {
        let args = ConnectArgs {
            hosts: vec!["a".into(), "b".into(), "a".into()],
            user: Some("ops".into()),
            port: Some(22),
            password: Some("pw".into()),
            timeout: Some(3),
            term: Some("vt100".into()),
            ..Default::default()
        };
        let target = resolve(&args, &config()).unwrap();

        assert_eq!(target.hosts, vec![HostName::new("a"), HostName::new("b")]);
        assert_eq!(target.credentials.username, "ops");
        assert_eq!(target.credentials.password, "pw");
        assert_eq!(target.port, 22);
        assert_eq!(target.timeout, Duration::from_secs(3));
        assert_eq!(target.term, "vt100");

        let descriptors = target.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[1].host().as_str(), "b");
        assert_eq!(descriptors[1].password(), "pw");
    }

    #[test]
    fn test_no_hosts_is_an_error() {
        let result = resolve(&ConnectArgs::default(), &ClientConfig::default());
        assert!(matches!(result, Err(CredentialError::NoHosts)));
    }

    #[test]
    fn test_identity_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_test");
        std::fs::write(&path, b"key bytes").unwrap();

        let args = ConnectArgs {
            hosts: vec!["a".into()],
            identity: Some(path),
            ..Default::default()
        };
        let target = resolve(&args, &config()).unwrap();
        assert!(target.credentials.use_key);
        assert_eq!(target.credentials.private_key.as_deref(), Some(&b"key bytes"[..]));
        assert!(!needs_prompt(&args, &target));
    }

    #[test]
    fn test_missing_identity_file() {
        let args = ConnectArgs {
            hosts: vec!["a".into()],
            identity: Some(PathBuf::from("/nonexistent/id_none")),
            ..Default::default()
        };
        assert!(matches!(resolve(&args, &config()), Err(CredentialError::KeyRead { .. })));
    }
}
