//! CLI output for the watch command.
//!
//! Events go to stdout as one JSON object per line. Status lines go to
//! stderr, colored, so stdout stays machine-readable.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::broadcast::EventPayload;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// One event as printed on stdout.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    pub received_at: DateTime<Utc>,
    pub event: &'a str,
    pub payload: &'a EventPayload,
}

impl<'a> EventLine<'a> {
    #[must_use]
    pub fn new(event: &'a str, payload: &'a EventPayload) -> Self {
        Self {
            received_at: Utc::now(),
            event,
            payload,
        }
    }
}

/// Print an event as a JSON line on stdout.
pub fn print_event(event: &str, payload: &EventPayload) {
    let line = EventLine::new(event, payload);
    match serde_json::to_string(&line) {
        Ok(json) => {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{json}");
            let _ = stdout.flush();
        }
        Err(e) => tracing::warn!(event = %event, error = %e, "Failed to serialize event"),
    }
}

/// Print that the stream is being watched.
pub fn print_watching(host: &str, port: u16, auto_restart: bool) {
    eprintln!(
        "{} {} {}:{} {}",
        timestamp().dimmed(),
        "[STREAM]".blue().bold(),
        host.cyan(),
        port,
        format!("auto_restart={auto_restart}").dimmed()
    );
}

/// Print that the stream closed.
pub fn print_stream_end(payload: &str, restarting: bool) {
    let action = if restarting { "restarting" } else { "stopped" };
    eprintln!(
        "{} {} {} - {}",
        timestamp().dimmed(),
        "[CLOSED]".yellow().bold(),
        truncate(payload.trim(), 120),
        action.dimmed()
    );
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
