//! Identity service client for the Pith object store.
//!
//! The storage core never interprets credentials; it only trusts the user
//! identifier an [`IdentityProvider`] hands back. [`IdentityClient`] talks
//! to the accounts service over HTTP, [`StaticIdentity`] serves a fixed set
//! of users for tests and embedding.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use client::IdentityClient;
pub use config::IdentityConfig;
pub use error::{IdentityError, IdentityResult};
pub use provider::{token_from_cookie, IdentityProvider, StaticIdentity};
pub use types::{ResourceUsage, ServiceInfo, UserInfo};
