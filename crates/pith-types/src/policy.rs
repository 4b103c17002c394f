use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// How historical object versions are retained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningPolicy {
    /// Every write creates a retained version (optionally capped).
    #[default]
    Auto,
    /// Versions are retained until explicitly purged.
    Manual,
    /// Previous versions are purged as soon as a new one commits.
    None,
}

impl VersioningPolicy {
    /// Whether older versions survive a commit.
    pub fn keeps_history(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for VersioningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for VersioningPolicy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            other => Err(TypeError::UnknownPolicy(other.to_string())),
        }
    }
}
