//! Output layer shared by all `tl` commands.
//!
//! Every command receives an [`OutputMode`]: aligned text for people or
//! pretty-printed JSON for scripts.

use serde::Serialize;
use std::io::{self, Write};
use threadline_core::{EngineError, Thread};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// A structured error with an optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }
}

impl From<&EngineError> for CliError {
    fn from(error: &EngineError) -> Self {
        Self {
            message: error.to_string(),
            suggestion: error.hint().map(str::to_string),
            error_code: Some(error.code().code().to_string()),
        }
    }
}

/// Render a serializable value to stdout. Text mode calls `text_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Format a microsecond timestamp as UTC minutes, or `-`.
pub fn format_micros(micros: Option<i64>) -> String {
    micros
        .and_then(chrono::DateTime::from_timestamp_micros)
        .map_or_else(|| "-".to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

/// One text row for a thread: id, counters, last activity and preview.
pub fn thread_row(w: &mut dyn Write, thread: &Thread, indent: &str) -> io::Result<()> {
    let participants: Vec<&str> = thread.participant_ids().collect();
    let preview = thread.last_event_text.as_deref().unwrap_or("");
    writeln!(
        w,
        "{indent}{:<24} {:>5} {:>4}  {:<16}  {:<28} {}",
        thread.thread_id,
        thread.count,
        thread.unread_count,
        format_micros(thread.last_event_timestamp),
        participants.join(","),
        truncate(preview, 40),
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_mode() {
        assert_eq!(OutputMode::from_json_flag(true), OutputMode::Json);
        assert_eq!(OutputMode::from_json_flag(false), OutputMode::Text);
    }

    #[test]
    fn timestamps_render_in_utc_minutes() {
        assert_eq!(format_micros(None), "-");
        assert_eq!(format_micros(Some(0)), "1970-01-01 00:00");
    }

    #[test]
    fn long_previews_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5), "abcd…");
    }

    #[test]
    fn thread_rows_list_participants() {
        let mut thread = Thread::new(threadline_core::EventType::Text, "acc", "t1");
        thread.participants = vec![threadline_core::Participant::new("acc", "+15550100")];
        let mut buf = Vec::new();
        thread_row(&mut buf, &thread, "").expect("write row");
        let row = String::from_utf8(buf).expect("utf8");
        assert!(row.starts_with("t1"));
        assert!(row.contains("+15550100"));
    }
}
