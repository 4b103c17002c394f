use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum object name length in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// Address of an object: `account/container/name`.
///
/// Account and container are single path segments; the object name may
/// itself contain `/` (pseudo-directories).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectPath {
    pub account: String,
    pub container: String,
    pub name: String,
}

impl ObjectPath {
    /// Build a validated path.
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let path = Self {
            account: account.into(),
            container: container.into(),
            name: name.into(),
        };
        path.validate()?;
        Ok(path)
    }

    /// Check segment rules without constructing a new path.
    pub fn validate(&self) -> Result<(), TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            path: self.to_string(),
            reason: reason.to_string(),
        };
        if self.account.is_empty() {
            return Err(invalid("empty account"));
        }
        if self.container.is_empty() {
            return Err(invalid("empty container"));
        }
        if self.name.is_empty() {
            return Err(invalid("empty object name"));
        }
        if self.account.contains('/') || self.container.contains('/') {
            return Err(invalid("account and container must not contain '/'"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(invalid("object name too long"));
        }
        Ok(())
    }

    /// `account/container`, used as the container's ledger key.
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.account, self.container)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.name)
    }
}

impl FromStr for ObjectPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(container), Some(name)) => Self::new(account, container, name),
            _ => Err(TypeError::InvalidPath {
                path: s.to_string(),
                reason: "expected account/container/name".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_slashes_in_name() {
        let path: ObjectPath = "alice/photos/2024/beach.jpg".parse().unwrap();
        assert_eq!(path.account, "alice");
        assert_eq!(path.container, "photos");
        assert_eq!(path.name, "2024/beach.jpg");
        assert_eq!(path.to_string(), "alice/photos/2024/beach.jpg");
        assert_eq!(path.container_key(), "alice/photos");
    }

    #[test]
    fn rejects_missing_segments() {
        assert!("alice/photos".parse::<ObjectPath>().is_err());
        assert!("alice//x".parse::<ObjectPath>().is_err());
        assert!(ObjectPath::new("", "c", "n").is_err());
        assert!(ObjectPath::new("a", "c", "").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        let err = ObjectPath::new("a", "c", name).unwrap_err();
        assert!(matches!(err, TypeError::InvalidPath { reason, .. } if reason == "object name too long"));
    }

    #[test]
    fn ordering_groups_by_container() {
        let a = ObjectPath::new("acct", "c1", "z").unwrap();
        let b = ObjectPath::new("acct", "c2", "a").unwrap();
        assert!(a < b);
    }
}
