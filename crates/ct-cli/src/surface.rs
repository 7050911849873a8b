//! Interactive raw-mode surface over a multiplexed terminal
//!
//! Keystrokes go to every host; merged output goes to stdout. Ctrl+]
//! detaches.

use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use tokio::sync::mpsc;

use ct_core::TerminalSize;
use ct_terminal::MultiplexedTerminal;

/// How often the input thread checks for a stop request
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Capacity of the terminal event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

const OUTPUT_BUFFER_SIZE: usize = 4096;

/// Why the interactive loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceExit {
    /// The user pressed Ctrl+]
    Detached,
    /// Every host's output ended
    OutputEnded,
}

/// Current local terminal size, if stdout is a terminal
pub fn local_size() -> Option<TerminalSize> {
    size().ok().map(|(cols, rows)| TerminalSize::new(rows, cols))
}

/// Restores cooked mode and the main screen, also on early return
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let guard = Self;
        let mut out = stdout();
        out.execute(EnterAlternateScreen)?;
        out.execute(EnableBracketedPaste)?;
        Ok(guard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut out = stdout();
        let _ = out.execute(DisableBracketedPaste);
        let _ = out.execute(LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Run the interactive loop until detach or end of output
pub async fn run(terminal: &MultiplexedTerminal) -> Result<SurfaceExit> {
    let _guard = RawModeGuard::enter()?;
    let mut out = stdout();

    if let Some(size) = local_size() {
        terminal.resize(size);
    }

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let stop = Arc::new(AtomicBool::new(false));
    let input_thread = {
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Relaxed) {
                if event::poll(EVENT_POLL_INTERVAL).unwrap_or(false) {
                    let Ok(evt) = event::read() else { break };
                    if event_tx.blocking_send(evt).is_err() {
                        break;
                    }
                }
            }
        })
    };

    let mut buf = vec![0u8; OUTPUT_BUFFER_SIZE];
    let exit = loop {
        tokio::select! {
            Some(evt) = event_rx.recv() => {
                match evt {
                    Event::Key(KeyEvent { code, modifiers, kind, .. }) => {
                        if kind == KeyEventKind::Release {
                            continue;
                        }
                        if is_detach(code, modifiers) {
                            break SurfaceExit::Detached;
                        }
                        let data = key_to_bytes(code, modifiers);
                        if !data.is_empty() && terminal.write(&data).is_err() {
                            break SurfaceExit::OutputEnded;
                        }
                    }
                    Event::Paste(text) => {
                        if terminal.write(text.as_bytes()).is_err() {
                            break SurfaceExit::OutputEnded;
                        }
                    }
                    Event::Resize(cols, rows) => {
                        terminal.resize(TerminalSize::new(rows, cols));
                    }
                    _ => {}
                }
            }

            result = terminal.read(&mut buf) => {
                match result {
                    Ok(0) => break SurfaceExit::OutputEnded,
                    Ok(n) => {
                        out.write_all(&buf[..n])?;
                        out.flush()?;
                    }
                    Err(e) => {
                        tracing::warn!("Error reading terminal output: {}", e);
                        break SurfaceExit::OutputEnded;
                    }
                }
            }
        }
    };

    stop.store(true, Ordering::Relaxed);
    let _ = input_thread.await;

    Ok(exit)
}

fn is_detach(code: KeyCode, modifiers: KeyModifiers) -> bool {
    modifiers.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char(']') | KeyCode::Char('5'))
}

/// Convert a key event to the bytes a terminal would send
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    match code {
        Char(c) => {
            if modifiers.contains(KeyModifiers::CONTROL) {
                control_byte(c).map(|b| vec![b]).unwrap_or_default()
            } else if modifiers.contains(KeyModifiers::ALT) {
                // Alt+key sends ESC followed by the key
                let mut bytes = vec![0x1b];
                bytes.extend_from_slice(c.to_string().as_bytes());
                bytes
            } else {
                c.to_string().into_bytes()
            }
        }
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => vec![0x1b, b'[', b'Z'],
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => vec![0x1b, b'[', b'A'],
        Down => vec![0x1b, b'[', b'B'],
        Right => vec![0x1b, b'[', b'C'],
        Left => vec![0x1b, b'[', b'D'],
        Home => vec![0x1b, b'[', b'H'],
        End => vec![0x1b, b'[', b'F'],
        PageUp => vec![0x1b, b'[', b'5', b'~'],
        PageDown => vec![0x1b, b'[', b'6', b'~'],
        Delete => vec![0x1b, b'[', b'3', b'~'],
        Insert => vec![0x1b, b'[', b'2', b'~'],
        F(n) => match n {
            1 => vec![0x1b, b'O', b'P'],
            2 => vec![0x1b, b'O', b'Q'],
            3 => vec![0x1b, b'O', b'R'],
            4 => vec![0x1b, b'O', b'S'],
            5 => vec![0x1b, b'[', b'1', b'5', b'~'],
            6 => vec![0x1b, b'[', b'1', b'7', b'~'],
            7 => vec![0x1b, b'[', b'1', b'8', b'~'],
            8 => vec![0x1b, b'[', b'1', b'9', b'~'],
            9 => vec![0x1b, b'[', b'2', b'0', b'~'],
            10 => vec![0x1b, b'[', b'2', b'1', b'~'],
            11 => vec![0x1b, b'[', b'2', b'3', b'~'],
            12 => vec![0x1b, b'[', b'2', b'4', b'~'],
            _ => vec![],
        },
        _ => vec![],
    }
}

/// Ctrl+A = 0x01 ... Ctrl+Z = 0x1a, plus the C0 punctuation controls
fn control_byte(c: char) -> Option<u8> {
    match c.to_ascii_lowercase() {
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '7' => Some(0x1f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_control_keys() {
        assert_eq!(key_to_bytes(KeyCode::Char('a'), KeyModifiers::NONE), b"a");
        assert_eq!(key_to_bytes(KeyCode::Char('C'), KeyModifiers::CONTROL), vec![0x03]);
        assert_eq!(key_to_bytes(KeyCode::Char('d'), KeyModifiers::CONTROL), vec![0x04]);
        assert_eq!(key_to_bytes(KeyCode::Enter, KeyModifiers::NONE), b"\r");
        assert_eq!(key_to_bytes(KeyCode::Tab, KeyModifiers::NONE), b"\t");
        assert_eq!(key_to_bytes(KeyCode::Backspace, KeyModifiers::NONE), vec![0x7f]);
    }

    #[test]
    fn test_alt_and_unicode_keys() {
        assert_eq!(key_to_bytes(KeyCode::Char('b'), KeyModifiers::ALT), vec![0x1b, b'b']);
        assert_eq!(key_to_bytes(KeyCode::Char('é'), KeyModifiers::NONE), "é".as_bytes());
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(key_to_bytes(KeyCode::Up, KeyModifiers::NONE), b"\x1b[A");
        assert_eq!(key_to_bytes(KeyCode::BackTab, KeyModifiers::SHIFT), b"\x1b[Z");
        assert_eq!(key_to_bytes(KeyCode::F(5), KeyModifiers::NONE), b"\x1b[15~");
        assert!(key_to_bytes(KeyCode::F(20), KeyModifiers::NONE).is_empty());
    }

    #[test]
    fn test_detach_key() {
        assert!(is_detach(KeyCode::Char(']'), KeyModifiers::CONTROL));
        assert!(!is_detach(KeyCode::Char(']'), KeyModifiers::NONE));
        assert!(!is_detach(KeyCode::Char('c'), KeyModifiers::CONTROL));
    }
}
