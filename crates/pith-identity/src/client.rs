use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::IdentityConfig;
use crate::error::{IdentityError, IdentityResult};
use crate::provider::{require, IdentityProvider};
use crate::types::{ServiceInfo, UserInfo};

const AUTHENTICATE: &str = "/im/authenticate";
const USER_CATALOGS: &str = "/user_catalogs";
const SERVICE_USER_CATALOGS: &str = "/service/api/user_catalogs";
const SERVICES: &str = "/im/get_services";
const TOKEN_HEADER: &str = "X-Auth-Token";

/// HTTP client for the accounts service.
#[derive(Clone, Debug)]
pub struct IdentityClient {
    http: reqwest::Client,
    origin: String,
    retries: u32,
}

#[derive(Deserialize)]
struct UuidCatalog {
    uuid_catalog: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct NameCatalog {
    displayname_catalog: Option<HashMap<String, String>>,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> IdentityResult<Self> {
        if config.url.is_empty() {
            return Err(IdentityError::InvalidUrl("no url given".into()));
        }
        let url = Url::parse(&config.url)
            .map_err(|e| IdentityError::InvalidUrl(format!("{}: {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IdentityError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            origin: url.origin().ascii_serialization(),
            retries: config.retries,
        })
    }

    /// `scheme://host[:port]` every request is sent to.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// User names for uuids, using a service token.
    pub async fn service_usernames(
        &self,
        token: &str,
        uuids: &[String],
    ) -> IdentityResult<HashMap<String, String>> {
        self.uuid_catalog(token, uuids, SERVICE_USER_CATALOGS).await
    }

    /// Uuids for user names, using a service token.
    pub async fn service_uuids(
        &self,
        token: &str,
        names: &[String],
    ) -> IdentityResult<HashMap<String, String>> {
        self.name_catalog(token, names, SERVICE_USER_CATALOGS).await
    }

    pub async fn service_username(&self, token: &str, uuid: &str) -> IdentityResult<String> {
        require("uuid", uuid)?;
        self.service_usernames(token, &[uuid.to_string()])
            .await?
            .remove(uuid)
            .ok_or_else(|| IdentityError::NoUserName(uuid.to_string()))
    }

    pub async fn service_uuid(&self, token: &str, name: &str) -> IdentityResult<String> {
        require("user name", name)?;
        self.service_uuids(token, &[name.to_string()])
            .await?
            .remove(name)
            .ok_or_else(|| IdentityError::NoUuid(name.to_string()))
    }

    /// Services registered with the accounts service. Needs no token.
    pub async fn services(&self) -> IdentityResult<Vec<ServiceInfo>> {
        self.call(Method::GET, None, SERVICES, None).await
    }

    async fn uuid_catalog(
        &self,
        token: &str,
        uuids: &[String],
        path: &str,
    ) -> IdentityResult<HashMap<String, String>> {
        let body = json!({ "uuids": uuids });
        let reply: UuidCatalog = self.call(Method::POST, Some(token), path, Some(body)).await?;
        reply.uuid_catalog.ok_or_else(|| {
            error!(path, "reply has no uuid_catalog");
            IdentityError::MalformedResponse("no uuid_catalog found".into())
        })
    }

    async fn name_catalog(
        &self,
        token: &str,
        names: &[String],
        path: &str,
    ) -> IdentityResult<HashMap<String, String>> {
        let body = json!({ "displaynames": names });
        let reply: NameCatalog = self.call(Method::POST, Some(token), path, Some(body)).await?;
        reply.displayname_catalog.ok_or_else(|| {
            error!(path, "reply has no displayname_catalog");
            IdentityError::MalformedResponse("no displayname_catalog found".into())
        })
    }

    /// Send one request, retrying transport failures, and decode the JSON
    /// reply. HTTP error statuses are never retried.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        token: Option<&str>,
        path: &str,
        body: Option<Value>,
    ) -> IdentityResult<T> {
        if let Some(token) = token {
            require("token", token)?;
        }
        let url = format!("{}{}", self.origin, path);

        let mut attempt = 0;
        let response = loop {
            let mut request = self.http.request(method.clone(), &url);
            if let Some(token) = token {
                request = request.header(TOKEN_HEADER, token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            debug!(method = %method, path, attempt, "identity request");
            match request.send().await {
                Ok(response) => break response,
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(path, attempt, error = %e, "identity request failed; retrying");
                }
                Err(e) => {
                    error!(path, error = %e, "identity request failed");
                    return Err(IdentityError::Transport(e.to_string()));
                }
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        debug!(path, status = status.as_u16(), "identity response");
        if !status.is_success() {
            return Err(IdentityError::from_status(status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| IdentityError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn authenticate(&self, token: &str, usage: bool) -> IdentityResult<UserInfo> {
        let path = if usage {
            format!("{AUTHENTICATE}?usage=1")
        } else {
            AUTHENTICATE.to_string()
        };
        self.call(Method::GET, Some(token), &path, None).await
    }

    async fn usernames(&self, token: &str, uuids: &[String]) -> IdentityResult<HashMap<String, String>> {
        self.uuid_catalog(token, uuids, USER_CATALOGS).await
    }

    async fn uuids(&self, token: &str, names: &[String]) -> IdentityResult<HashMap<String, String>> {
        self.name_catalog(token, names, USER_CATALOGS).await
    }
}
