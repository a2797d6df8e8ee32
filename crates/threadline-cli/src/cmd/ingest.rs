//! `tl ingest`: write a JSON-lines file of events as one batch.

use anyhow::Context;
use clap::Args;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use threadline_core::{Engine, Event};

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// File with one JSON event per line. Blank lines are skipped.
    pub file: PathBuf,
}

/// Parse every non-blank line of `content` as an [`Event`].
pub fn parse_events(content: &str, source: &Path) -> anyhow::Result<Vec<Event>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Event>(line)
                .with_context(|| format!("{}:{}: invalid event", source.display(), i + 1))
        })
        .collect()
}

pub fn run_ingest(args: &IngestArgs, engine: &Engine, output: OutputMode) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let events = parse_events(&content, &args.file)?;
    let report = engine.write_events(&events)?;

    render(output, &report, |r, w: &mut dyn Write| {
        writeln!(
            w,
            "ingested {} events: {} added, {} updated; {} new threads, {} updated",
            events.len(),
            r.events_added,
            r.events_modified,
            r.threads_added,
            r.threads_modified
        )
    })
}
