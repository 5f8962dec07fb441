use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Effective permission level of a user within a team.
///
/// `Owner` is never stored: it is implied by being the team creator.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Whether this role can be persisted on a membership row.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Self::Owner)
    }

    pub fn can_edit(&self) -> bool {
        *self >= Self::Editor
    }

    pub fn can_manage_members(&self) -> bool {
        *self >= Self::Admin
    }

    pub fn can_delete_team(&self) -> bool {
        *self == Self::Owner
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(Error::Validation(format!("unknown team role: {other}"))),
        }
    }
}
