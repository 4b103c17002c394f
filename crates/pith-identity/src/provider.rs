use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{IdentityError, IdentityResult};
use crate::types::UserInfo;

/// Source of user identities.
///
/// `usernames` and `uuids` return catalogs that omit unknown entries; the
/// single-item lookups turn an omission into `NoUserName` / `NoUuid`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a token to its user, optionally with resource usage.
    async fn authenticate(&self, token: &str, usage: bool) -> IdentityResult<UserInfo>;

    /// Map user uuids to user names.
    async fn usernames(&self, token: &str, uuids: &[String]) -> IdentityResult<HashMap<String, String>>;

    /// Map user names to uuids.
    async fn uuids(&self, token: &str, names: &[String]) -> IdentityResult<HashMap<String, String>>;

    async fn username(&self, token: &str, uuid: &str) -> IdentityResult<String> {
        require("uuid", uuid)?;
        self.usernames(token, &[uuid.to_string()])
            .await?
            .remove(uuid)
            .ok_or_else(|| IdentityError::NoUserName(uuid.to_string()))
    }

    async fn uuid(&self, token: &str, name: &str) -> IdentityResult<String> {
        require("user name", name)?;
        self.uuids(token, &[name.to_string()])
            .await?
            .remove(name)
            .ok_or_else(|| IdentityError::NoUuid(name.to_string()))
    }
}

pub(crate) fn require(what: &str, value: &str) -> IdentityResult<()> {
    if value.is_empty() {
        Err(IdentityError::InvalidArgument(format!("no {what} given")))
    } else {
        Ok(())
    }
}

/// Extract the token from an accounts cookie value of the form
/// `<user_uniq>|<token>`, percent-encoded or not.
pub fn token_from_cookie(cookie: &str) -> Option<String> {
    let decoded = percent_decode(cookie)?;
    let token = decoded.split('|').nth(1)?;
    (!token.is_empty()).then(|| token.to_string())
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Fixed set of users keyed by token.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    users: HashMap<String, UserInfo>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user: UserInfo) -> Self {
        self.users.insert(token.into(), user);
        self
    }

    fn check(&self, token: &str) -> IdentityResult<&UserInfo> {
        require("token", token)?;
        self.users
            .get(token)
            .ok_or_else(|| IdentityError::Unauthorized("invalid token".into()))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, token: &str, usage: bool) -> IdentityResult<UserInfo> {
        let mut user = self.check(token)?.clone();
        if !usage {
            user.usage.clear();
        }
        Ok(user)
    }

    async fn usernames(&self, token: &str, uuids: &[String]) -> IdentityResult<HashMap<String, String>> {
        self.check(token)?;
        Ok(self
            .users
            .values()
            .filter(|u| uuids.contains(&u.uuid))
            .map(|u| (u.uuid.clone(), u.username.clone()))
            .collect())
    }

    async fn uuids(&self, token: &str, names: &[String]) -> IdentityResult<HashMap<String, String>> {
        self.check(token)?;
        Ok(self
            .users
            .values()
            .filter(|u| names.contains(&u.username))
            .map(|u| (u.username.clone(), u.uuid.clone()))
            .collect())
    }
}
