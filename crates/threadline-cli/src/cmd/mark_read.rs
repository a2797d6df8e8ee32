//! `tl mark-read`: mark every event of a thread as read.

use std::io::Write;

use serde::Serialize;
use threadline_core::{Engine, ThreadKey};

use super::ThreadArgs;
use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct MarkReadResult {
    thread: ThreadKey,
    changed: bool,
}

pub fn run_mark_read(args: &ThreadArgs, engine: &Engine, output: OutputMode) -> anyhow::Result<()> {
    let key = args.key();
    engine.mark_threads_as_read(std::slice::from_ref(&key));
    let changed = engine.tick()? > 0;

    render(
        output,
        &MarkReadResult {
            thread: key,
            changed,
        },
        |r, w: &mut dyn Write| {
            if r.changed {
                writeln!(w, "marked {} as read", r.thread)
            } else {
                writeln!(w, "{} had no unread events", r.thread)
            }
        },
    )
}
