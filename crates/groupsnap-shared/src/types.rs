use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(SessionId);
uuid_id!(UserId);
uuid_id!(MemberId);
uuid_id!(ContributionId);
uuid_id!(ResultId);

/// What kind of group a session belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    LocalTemporary,
    GlobalTemporary,
    Permanent,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalTemporary => "local_temporary",
            Self::GlobalTemporary => "global_temporary",
            Self::Permanent => "permanent",
        }
    }
}

impl Default for SessionKind {
    fn default() -> Self {
        Self::GlobalTemporary
    }
}

impl FromStr for SessionKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_temporary" => Ok(Self::LocalTemporary),
            "global_temporary" => Ok(Self::GlobalTemporary),
            "permanent" => Ok(Self::Permanent),
            other => Err(SessionError::InvalidKind(other.to_string())),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Recruiting,
    ReadyCheck,
    Countdown,
    PhotoTaking,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recruiting => "recruiting",
            Self::ReadyCheck => "ready_check",
            Self::Countdown => "countdown",
            Self::PhotoTaking => "photo_taking",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    /// Phases in which members upload their photo.
    pub fn accepts_contributions(&self) -> bool {
        matches!(self, Self::Countdown | Self::PhotoTaking)
    }
}

impl FromStr for SessionStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recruiting" => Ok(Self::Recruiting),
            "ready_check" => Ok(Self::ReadyCheck),
            "countdown" => Ok(Self::Countdown),
            "photo_taking" => Ok(Self::PhotoTaking),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(SessionError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
