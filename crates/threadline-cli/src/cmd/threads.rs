//! `tl threads`: list threads, optionally grouped into conversations.

use std::io::Write;

use clap::Args;
use threadline_core::{Engine, Sort, SortOrder, ThreadItem, ViewOptions};

use super::{TypeArg, combine_filters};
use crate::output::{OutputMode, render, thread_row};

#[derive(Args, Debug)]
pub struct ThreadsArgs {
    #[arg(long = "type", value_enum, default_value_t = TypeArg::Text)]
    pub event_type: TypeArg,

    /// Collapse threads of the same contact into one conversation.
    #[arg(long)]
    pub grouped: bool,

    /// Property filter `key=value`; repeat to AND several.
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Thread property to sort by.
    #[arg(long, default_value = "last_event_timestamp")]
    pub sort: String,

    /// Sort ascending instead of descending.
    #[arg(long)]
    pub asc: bool,

    /// Rows per page.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Keep paging until the view is exhausted.
    #[arg(long)]
    pub all: bool,
}

impl ThreadsArgs {
    fn sort(&self) -> Sort {
        let order = if self.asc {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        Sort::new(self.sort.clone(), order)
    }
}

pub fn run_threads(args: &ThreadsArgs, engine: &Engine, output: OutputMode) -> anyhow::Result<()> {
    let predicate = combine_filters(&args.filters)?;
    let options = ViewOptions {
        grouped: args.grouped,
        page_size: args.limit,
    };
    let mut view = engine.query_threads(args.event_type.into(), args.sort(), predicate, options)?;

    let mut items: Vec<ThreadItem> = view.next_page()?;
    while args.all && !view.is_exhausted() {
        let page = view.next_page()?;
        if page.is_empty() {
            break;
        }
        items.extend(page);
    }
    view.destroy();

    render(output, &items, |items, w: &mut dyn Write| {
        if items.is_empty() {
            return writeln!(w, "no threads");
        }
        writeln!(
            w,
            "{:<24} {:>5} {:>4}  {:<16}  {:<28} {}",
            "THREAD", "COUNT", "NEW", "LAST", "PARTICIPANTS", "PREVIEW"
        )?;
        for item in items {
            thread_row(w, &item.thread, "")?;
            for member in item.members.iter().skip(1) {
                thread_row(w, member, "  + ")?;
            }
        }
        Ok(())
    })
}
