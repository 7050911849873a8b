//! Output formatting utilities for the CLI
//!
//! Per-host progress lines, the connect results table, and colored status
//! messages.

use tabled::{settings::Style, Table, Tabled};

use ct_ssh::ConnectResult;
use ct_terminal::SessionEvent;

use crate::progress::HostOutcome;

/// Format connect outcomes as a table
pub fn format_results(outcomes: &[HostOutcome]) -> String {
    if outcomes.is_empty() {
        return "No hosts".to_string();
    }

    #[derive(Tabled)]
    struct ResultRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let rows: Vec<ResultRow> = outcomes
        .iter()
        .map(|o| ResultRow {
            host: o.host.to_string(),
            status: if o.is_connected() { "connected" } else { "failed" }.to_string(),
            detail: o.error.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One line of connect progress, e.g. `[2/5] web-1: connected`
pub fn format_progress(result: &ConnectResult, reported: usize, total: usize) -> String {
    match &result.error {
        None => format!("[{}/{}] {}: connected", reported, total, result.host),
        Some(e) => format!("[{}/{}] {}: {}", reported, total, result.host, e),
    }
}

/// Print one progress line with the matching color
pub fn print_progress(result: &ConnectResult, reported: usize, total: usize) {
    let line = format_progress(result, reported, total);
    if result.is_success() {
        print_success(&line);
    } else {
        print_error(&line);
    }
}

/// Print a lifecycle event collected during the interactive session
pub fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Ended { .. } => print_info(&event.to_string()),
        SessionEvent::Alert { .. } => print_warning(&event.to_string()),
        SessionEvent::Errored { .. } | SessionEvent::InputFailed { .. } => print_error(&event.to_string()),
    }
}

/// Tell the user that server identities are taken on trust
pub fn print_host_key_notice() {
    print_warning("Host identity is NOT verified: any server key is accepted for every host");
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
