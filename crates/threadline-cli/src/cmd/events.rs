//! `tl events`: list the events of one thread.

use std::io::Write;

use clap::Args;
use threadline_core::{Engine, Event, Predicate, Sort, SortOrder, ViewOptions};

use super::ThreadArgs;
use crate::output::{OutputMode, format_micros, render};

#[derive(Args, Debug)]
pub struct EventsArgs {
    #[command(flatten)]
    pub thread: ThreadArgs,

    /// Maximum events to show, newest first.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

pub fn run_events(args: &EventsArgs, engine: &Engine, output: OutputMode) -> anyhow::Result<()> {
    let predicate = Predicate::and(vec![
        Predicate::equals("account_id", args.thread.account.as_str()),
        Predicate::equals("thread_id", args.thread.thread.as_str()),
    ]);
    let mut view = engine.query_events(
        args.thread.event_type.into(),
        Sort::new("timestamp", SortOrder::Descending),
        Some(predicate),
        ViewOptions::default().with_page_size(args.limit),
    )?;
    let events = view.next_page()?;
    view.destroy();

    render(output, &events, |events, w: &mut dyn Write| {
        if events.is_empty() {
            return writeln!(w, "no events");
        }
        for event in events {
            let marker = if is_unread(event) { "*" } else { " " };
            let body = match event {
                Event::Text(e) => e.message.clone(),
                Event::Voice(e) if e.missed => "missed call".to_string(),
                Event::Voice(e) => format!("call, {}s", e.duration),
            };
            writeln!(
                w,
                "{marker} {:<16}  {:<20} {:<20} {body}",
                format_micros(Some(event.timestamp())),
                event.event_id(),
                event.sender_id(),
            )?;
        }
        Ok(())
    })
}

const fn is_unread(event: &Event) -> bool {
    match event {
        Event::Text(e) => e.new_event,
        Event::Voice(e) => e.new_event,
    }
}
