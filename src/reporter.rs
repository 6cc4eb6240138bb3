//! stdout is reserved for machine-readable output; logs go to stderr.

use serde::Serialize;
use tracing::warn;

use crate::types::{ExitSummary, TickEvent};

/// Render a tick event as one JSON line.
pub fn event_line(event: &TickEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

fn emit<T: Serialize>(what: &str, value: &T, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to serialize {what}: {e}"),
    }
}

/// Emit a tick event as a single JSON line to stdout.
pub fn report_event(event: &TickEvent) {
    emit("tick event", event, false);
}

/// Emit the exit summary as pretty-printed JSON to stdout.
pub fn report_exit_summary(summary: &ExitSummary) {
    emit("exit summary", summary, true);
}
