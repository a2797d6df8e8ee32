use std::fmt;
use std::path::PathBuf;

/// Machine-readable error codes surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    StoreOpenFailed,
    ConfigParseError,
    InvalidPredicate,
    InvalidSort,
    WriteFailed,
    ReadFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidPredicate => "E2001",
            Self::InvalidSort => "E2002",
            Self::WriteFailed => "E3001",
            Self::ReadFailed => "E3002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "Store could not be opened",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidPredicate => "Invalid predicate",
            Self::InvalidSort => "Invalid sort specification",
            Self::WriteFailed => "Batch write failed and was rolled back",
            Self::ReadFailed => "Store read failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::StoreOpenFailed => Some("Check that the data directory exists and is writable."),
            Self::ConfigParseError => Some("Fix syntax in threadline.toml and retry."),
            Self::InvalidPredicate => {
                Some("Filter on a known property of the queried record type.")
            }
            Self::InvalidSort => Some("Sort on a known property of the queried record type."),
            Self::WriteFailed => Some("No part of the batch was stored; retry the whole batch."),
            Self::ReadFailed => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by the [`crate::engine::Engine`] surface.
///
/// Lookups that find nothing are not errors; they return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to open store at {}: {cause:#}", path.display())]
    Open { path: PathBuf, cause: anyhow::Error },

    #[error("failed to load configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    #[error("batch write failed and was rolled back: {0:#}")]
    Write(anyhow::Error),

    #[error("store read failed: {0:#}")]
    Read(anyhow::Error),
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } => ErrorCode::StoreOpenFailed,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::InvalidPredicate(_) => ErrorCode::InvalidPredicate,
            Self::InvalidSort(_) => ErrorCode::InvalidSort,
            Self::Write(_) => ErrorCode::WriteFailed,
            Self::Read(_) => ErrorCode::ReadFailed,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
