//! threadline-core library.
//!
//! A persistent store for text and voice conversation history with
//! phone-number aware grouping and paginated, live-updating views.
//!
//! # Conventions
//!
//! - **Errors**: internal helpers return `anyhow::Result`; the [`Engine`]
//!   surface returns [`EngineError`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod model;
pub mod notify;
pub mod readmark;
pub mod sort;
pub mod view;

pub use cache::Conversation;
pub use config::{EngineConfig, GroupingConfig};
pub use engine::{Engine, RemoveReport, WriteReport};
pub use error::{EngineError, ErrorCode};
pub use filter::{Comparison, MatchFlags, Predicate};
pub use model::{
    Attachment, ChatType, Event, EventKey, EventType, Participant, RoomInfo, TextEvent, Thread,
    ThreadKey, VoiceEvent,
};
pub use notify::{Notification, Subscription};
pub use sort::{CaseSensitivity, Sort, SortOrder};
pub use view::{DestroyHandle, EventView, ThreadItem, ThreadView, ViewOptions};
