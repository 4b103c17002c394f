use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An authenticated user as reported by the accounts service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uuid: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Vec<String>,
    /// Milliseconds since UNIX epoch.
    #[serde(default)]
    pub auth_token_created: Option<u64>,
    #[serde(default)]
    pub auth_token_expires: Option<u64>,
    /// Present only when usage was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<ResourceUsage>,
}

impl UserInfo {
    pub fn new(uuid: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            username: username.into(),
            name: None,
            email: Vec::new(),
            auth_token_created: None,
            auth_token_expires: None,
            usage: Vec::new(),
        }
    }
}

/// Current value of one resource the user consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "currValue")]
    pub current: u64,
}

/// A service registered with the accounts service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
