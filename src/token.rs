//! Access tokens and the in-process token slot shared with the refresher.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;

use crate::config::{ConfigStore, Field};
use crate::credentials::CredentialKind;
use crate::error::{GuploadError, Result};
use crate::models::TokenResponse;

/// Current time as unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// A bearer token with its absolute expiry (unix seconds).
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: i64,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn seconds_remaining(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// Well-formed and not yet expired.
    pub fn is_usable_at(&self, now: i64) -> bool {
        CredentialKind::AccessToken.is_valid(&self.value) && self.expires_at >= now
    }

    /// Token and expiry stored for `account`, if both are present.
    pub fn from_store(store: &ConfigStore, account: &str) -> Option<Self> {
        let value = store.field(account, Field::AccessToken)?;
        let expires_at = store
            .field(account, Field::AccessTokenExpiry)?
            .parse::<i64>()
            .ok()?;
        Some(Self::new(value, expires_at))
    }

    /// Build a token from a token endpoint response body received at `now`.
    ///
    /// The expiry keeps one second of margin: `now + expires_in - 1`.
    pub fn from_token_body(body: &str, now: i64) -> Result<Self> {
        let response: TokenResponse =
            serde_json::from_str(body).map_err(|_| GuploadError::Refresh(body.to_string()))?;
        match (response.access_token, response.expires_in) {
            (Some(value), Some(expires_in)) if !value.is_empty() => {
                Ok(Self::new(value, now + expires_in - 1))
            }
            _ => Err(GuploadError::Refresh(body.to_string())),
        }
    }

    /// Write token and expiry for `account` in one config rewrite.
    pub fn persist(&self, store: &mut ConfigStore, account: &str) -> Result<()> {
        store.edit(|edit| {
            edit.set_field(account, Field::AccessToken, &self.value);
            edit.set_field(account, Field::AccessTokenExpiry, &self.expires_at.to_string());
        })
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The process-local copy of the current access token.
///
/// The API client reads it for every request and the background refresher
/// replaces it; the config file is never touched through this handle.
#[derive(Clone, Debug)]
pub struct SharedToken {
    inner: Arc<RwLock<AccessToken>>,
}

impl SharedToken {
    pub fn new(token: AccessToken) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub async fn get(&self) -> AccessToken {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, token: AccessToken) {
        *self.inner.write().await = token;
    }
}

/// Everything needed to trade a refresh token for an access token.
#[derive(Clone)]
pub struct RefreshGrant {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
