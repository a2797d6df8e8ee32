//! `tl conversations`: list grouped conversations from the cache.

use std::io::Write;

use clap::Args;
use threadline_core::Engine;

use super::TypeArg;
use crate::output::{OutputMode, render, thread_row};

#[derive(Args, Debug)]
pub struct ConversationsArgs {
    #[arg(long = "type", value_enum, default_value_t = TypeArg::Text)]
    pub event_type: TypeArg,
}

pub fn run_conversations(
    args: &ConversationsArgs,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let conversations = engine.conversations(args.event_type.into())?;
    render(output, &conversations, |list, w: &mut dyn Write| {
        if list.is_empty() {
            return writeln!(w, "no conversations");
        }
        for conversation in list {
            writeln!(
                w,
                "#{} ({} threads, {} unread)",
                conversation.id(),
                conversation.len(),
                conversation.unread_count()
            )?;
            for thread in conversation.members() {
                thread_row(w, thread, "  ")?;
            }
        }
        Ok(())
    })
}
