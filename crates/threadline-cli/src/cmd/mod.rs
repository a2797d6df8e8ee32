pub mod conversations;
pub mod events;
pub mod ingest;
pub mod mark_read;
pub mod remove_thread;
pub mod threads;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use threadline_core::{EventType, Predicate, ThreadKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TypeArg {
    #[default]
    Text,
    Voice,
}

impl From<TypeArg> for EventType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Text => Self::Text,
            TypeArg::Voice => Self::Voice,
        }
    }
}

/// Identifies one thread on the command line.
#[derive(Args, Debug, Clone)]
pub struct ThreadArgs {
    /// Account the thread belongs to.
    #[arg(long)]
    pub account: String,

    /// Thread id within the account.
    #[arg(long)]
    pub thread: String,

    /// Event family of the thread.
    #[arg(long = "type", value_enum, default_value_t = TypeArg::Text)]
    pub event_type: TypeArg,
}

impl ThreadArgs {
    pub fn key(&self) -> ThreadKey {
        ThreadKey::new(
            self.event_type.into(),
            self.account.clone(),
            self.thread.clone(),
        )
    }
}

/// Parse `key=value` into an equality predicate. Values that parse as JSON
/// scalars (numbers, booleans, null) compare as such; anything else is text.
pub fn parse_filter(raw: &str) -> anyhow::Result<Predicate> {
    let (property, value) = raw
        .split_once('=')
        .with_context(|| format!("filter '{raw}' is not of the form key=value"))?;
    let property = property.trim();
    if property.is_empty() {
        bail!("filter '{raw}' has an empty property name");
    }
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(v) if !v.is_object() && !v.is_array() && !v.is_string() => v,
        _ => serde_json::Value::String(value.to_string()),
    };
    Ok(Predicate::equals(property, value))
}

/// AND together every `--filter`; `None` when there are none.
pub fn combine_filters(raw: &[String]) -> anyhow::Result<Option<Predicate>> {
    let mut predicates = raw
        .iter()
        .map(|f| parse_filter(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(match predicates.len() {
        0 => None,
        1 => predicates.pop(),
        _ => Some(Predicate::and(predicates)),
    })
}
