//! `tl remove-thread`: delete a thread and all of its events.

use std::io::Write;

use anyhow::bail;
use threadline_core::Engine;

use super::ThreadArgs;
use crate::output::{OutputMode, render};

pub fn run_remove_thread(
    args: &ThreadArgs,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let key = args.key();
    if engine.remove_threads(std::slice::from_ref(&key))? == 0 {
        bail!("thread {key} not found");
    }
    render(output, &key, |k, w: &mut dyn Write| writeln!(w, "removed {k}"))
}
