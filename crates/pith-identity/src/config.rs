use serde::{Deserialize, Serialize};

/// Identity service connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the accounts service, e.g. `https://accounts.example.com`.
    /// Only scheme and authority are used.
    pub url: String,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            retries: 0,
            timeout_secs: 10,
        }
    }
}

impl IdentityConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
