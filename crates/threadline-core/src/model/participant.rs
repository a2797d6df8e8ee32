use serde::{Deserialize, Serialize};

use crate::cache::phone;

/// Membership state of a participant inside a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    #[default]
    Regular,
    LocalPending,
    RemotePending,
}

impl ParticipantState {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Regular => 0,
            Self::LocalPending => 1,
            Self::RemotePending => 2,
        }
    }

    /// Unknown tags decode as [`Self::Regular`].
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::LocalPending,
            2 => Self::RemotePending,
            _ => Self::Regular,
        }
    }
}

/// Role bitmask of a participant (or of the local user in a room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roles(pub u32);

impl Roles {
    pub const NONE: Self = Self(0);
    pub const MEMBER: Self = Self(1);
    pub const ADMIN: Self = Self(2);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A participant scoped to one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub account_id: String,
    pub identifier: String,
    pub normalized_identifier: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub state: ParticipantState,
    #[serde(default)]
    pub roles: Roles,
}

impl Participant {
    /// Build a regular participant, deriving the normalized identifier.
    pub fn new(account_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            account_id: account_id.into(),
            normalized_identifier: phone::normalize(&identifier),
            identifier,
            alias: None,
            state: ParticipantState::Regular,
            roles: Roles::NONE,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub const fn with_state(mut self, state: ParticipantState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub const fn with_roles(mut self, roles: Roles) -> Self {
        self.roles = roles;
        self
    }
}
