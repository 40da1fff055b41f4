//! Authenticated cloud session scoped to one account and region.
//!
//! How credentials are obtained is outside the runtime; factories only need
//! to know whether a session is usable for the tenant they are asked to serve.

use crate::error::{ResourceError, Result};
use crate::identifiers::{AccountId, Region};
use std::time::SystemTime;

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<SystemTime>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, at: SystemTime) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub account_id: AccountId,
    pub region: Region,
    pub credentials: Credentials,
    pub endpoint_url: Option<String>,
}

impl Session {
    pub fn new(account_id: AccountId, region: Region, credentials: Credentials) -> Self {
        Self {
            account_id,
            region,
            credentials,
            endpoint_url: None,
        }
    }

    /// Sends the session's calls to `endpoint_url` instead of the public endpoint.
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Checks the session can act for `account_id` in `region`.
    ///
    /// Failures are authentication/authorization problems, so they are terminal.
    pub fn authorize(&self, account_id: &AccountId, region: &Region) -> Result<()> {
        if self.credentials.access_key_id.is_empty() || self.credentials.secret_access_key.is_empty() {
            return Err(ResourceError::terminal("session has no usable credentials"));
        }
        if self.credentials.is_expired(SystemTime::now()) {
            return Err(ResourceError::terminal("session credentials have expired"));
        }
        if &self.account_id != account_id {
            return Err(ResourceError::terminal(format!(
                "session belongs to account {} but account {account_id} was requested",
                self.account_id
            )));
        }
        if &self.region != region {
            return Err(ResourceError::terminal(format!(
                "session is scoped to region {} but region {region} was requested",
                self.region
            )));
        }
        Ok(())
    }
}
