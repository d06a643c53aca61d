//! OAuth2 credential acquisition and validation for a named account.
//!
//! Each of client id, client secret and refresh token is a small state
//! machine: it starts out [`CredentialState::Empty`], `Invalid` or `Valid`
//! depending on what the config holds, and missing or malformed values are
//! asked for until a well-formed answer arrives. Answers obtained
//! interactively are persisted; values that were already valid are not
//! rewritten.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Endpoints, DRIVE_SCOPE, REDIRECT_URI};
use crate::config::{ConfigStore, Field};
use crate::drive_id::extract_id;
use crate::error::{GuploadError, Result};
use crate::models::TokenResponse;
use crate::prompt::Prompt;
use crate::token::{unix_now, AccessToken, RefreshGrant};

static CLIENT_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+-[0-9A-Za-z_]{32}\.apps\.googleusercontent\.com$")
        .expect("Invalid client id regex")
});

static CLIENT_SECRET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_-]+$").expect("Invalid client secret regex"));

static REFRESH_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+//[0-9A-Za-z_-]+$").expect("Invalid refresh token regex")
});

static ACCESS_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ya29\.[0-9A-Za-z_-]+$").expect("Invalid access token regex"));

static AUTH_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]/[0-9A-Za-z_-]+$").expect("Invalid auth code regex"));

/// The credential values whose shape is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ClientId,
    ClientSecret,
    RefreshToken,
    AccessToken,
    AuthorizationCode,
}

impl CredentialKind {
    pub const fn label(self) -> &'static str {
        match self {
            CredentialKind::ClientId => "client ID",
            CredentialKind::ClientSecret => "client secret",
            CredentialKind::RefreshToken => "refresh token",
            CredentialKind::AccessToken => "access token",
            CredentialKind::AuthorizationCode => "authorization code",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            CredentialKind::ClientId => &*CLIENT_ID_REGEX,
            CredentialKind::ClientSecret => &*CLIENT_SECRET_REGEX,
            CredentialKind::RefreshToken => &*REFRESH_TOKEN_REGEX,
            CredentialKind::AccessToken => &*ACCESS_TOKEN_REGEX,
            CredentialKind::AuthorizationCode => &*AUTH_CODE_REGEX,
        }
    }

    pub fn is_valid(self, value: &str) -> bool {
        self.regex().is_match(value)
    }

    fn field(self) -> Option<Field> {
        match self {
            CredentialKind::ClientId => Some(Field::ClientId),
            CredentialKind::ClientSecret => Some(Field::ClientSecret),
            CredentialKind::RefreshToken => Some(Field::RefreshToken),
            CredentialKind::AccessToken => Some(Field::AccessToken),
            CredentialKind::AuthorizationCode => None,
        }
    }
}

/// Where a credential value stands before any prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Empty,
    Invalid(String),
    Valid(String),
}

impl CredentialState {
    pub fn classify(kind: CredentialKind, value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => CredentialState::Empty,
            Some(v) if kind.is_valid(v) => CredentialState::Valid(v.to_string()),
            Some(v) => CredentialState::Invalid(v.to_string()),
        }
    }
}

/// The account's configured root folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFolder {
    pub id: String,
    pub name: String,
}

/// Credentials of an account once all of them are in place.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub grant: RefreshGrant,
    pub token: AccessToken,
}

/// Acquires and validates the OAuth2 credentials of accounts.
#[derive(Debug, Clone)]
pub struct CredentialManager {
    http: Client,
    endpoints: Endpoints,
}

impl CredentialManager {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            http: Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Make sure every credential of `account` is present and valid, asking
    /// for whatever is missing, and return them with a fresh access token.
    pub async fn ensure_credentials(
        &self,
        store: &mut ConfigStore,
        account: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<AccountCredentials> {
        let client_id = self.ensure_client_id(store, account, prompt)?;
        let client_secret = self.ensure_client_secret(store, account, prompt)?;
        let refresh_token = self
            .ensure_refresh_token(store, account, &client_id, &client_secret, prompt)
            .await?;

        let grant = RefreshGrant {
            client_id,
            client_secret,
            refresh_token,
        };
        let token = self
            .check_access_token(store, account, &grant, false, None)
            .await?;
        Ok(AccountCredentials { grant, token })
    }

    pub fn ensure_client_id(
        &self,
        store: &mut ConfigStore,
        account: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<String> {
        self.ensure_field(store, account, CredentialKind::ClientId, prompt)
    }

    pub fn ensure_client_secret(
        &self,
        store: &mut ConfigStore,
        account: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<String> {
        self.ensure_field(store, account, CredentialKind::ClientSecret, prompt)
    }

    fn ensure_field(
        &self,
        store: &mut ConfigStore,
        account: &str,
        kind: CredentialKind,
        prompt: &mut dyn Prompt,
    ) -> Result<String> {
        let Some(field) = kind.field() else {
            return self.ask_until_valid(kind, prompt);
        };

        match CredentialState::classify(kind, store.field(account, field)) {
            CredentialState::Valid(value) => return Ok(value),
            CredentialState::Invalid(_) => {
                warn!(account, "stored {} is malformed", kind.label());
                prompt.say(&format!("Stored {} is invalid.", kind.label()));
            }
            CredentialState::Empty => {}
        }

        let value = self.ask_until_valid(kind, prompt)?;
        store.set_field(account, field, &value)?;
        Ok(value)
    }

    fn ask_until_valid(&self, kind: CredentialKind, prompt: &mut dyn Prompt) -> Result<String> {
        if !prompt.is_interactive() {
            return Err(GuploadError::NonInteractiveCredential(kind.label()));
        }

        loop {
            let Some(answer) = prompt.ask(&format!("Enter {}: ", kind.label()))? else {
                return Err(GuploadError::NonInteractiveCredential(kind.label()));
            };
            let answer = answer.trim();
            if kind.is_valid(answer) {
                return Ok(answer.to_string());
            }
            prompt.say(&GuploadError::CredentialShape { kind: kind.label() }.to_string());
        }
    }

    /// URL the user visits to grant access and obtain an authorization code.
    pub fn authorization_url(&self, client_id: &str) -> Result<String> {
        Url::parse_with_params(
            &self.endpoints.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", REDIRECT_URI),
                ("scope", DRIVE_SCOPE),
                ("response_type", "code"),
                ("prompt", "consent"),
            ],
        )
        .map(String::from)
        .map_err(|e| GuploadError::InvalidUrlOrId(format!("{}: {}", self.endpoints.auth_url, e)))
    }

    /// Return the stored refresh token, or run the authorization-code flow
    /// to obtain one.
    ///
    /// A fresh token exchange also yields the first access token, which is
    /// stored before the refresh token itself.
    pub async fn ensure_refresh_token(
        &self,
        store: &mut ConfigStore,
        account: &str,
        client_id: &str,
        client_secret: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<String> {
        let kind = CredentialKind::RefreshToken;
        match CredentialState::classify(kind, store.field(account, Field::RefreshToken)) {
            CredentialState::Valid(token) => return Ok(token),
            CredentialState::Invalid(_) => warn!(account, "stored refresh token is malformed"),
            CredentialState::Empty => {}
        }

        if !prompt.is_interactive() {
            return Err(GuploadError::NonInteractiveCredential(kind.label()));
        }

        let url = self.authorization_url(client_id)?;
        prompt.say(&format!(
            "Visit the below URL, follow the instructions and paste the code here:\n{}",
            url
        ));
        let code = self.ask_until_valid(CredentialKind::AuthorizationCode, prompt)?;

        let body = self.exchange_code(client_id, client_secret, &code).await?;
        let response: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| GuploadError::TokenExchange(body.clone()))?;
        let refresh_token = match response.refresh_token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(GuploadError::TokenExchange(body)),
        };

        let grant = RefreshGrant {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.clone(),
        };
        self.check_access_token(store, account, &grant, true, Some(&body))
            .await?;
        store.set_field(account, Field::RefreshToken, &refresh_token)?;
        info!(account, "obtained refresh token");
        Ok(refresh_token)
    }

    async fn exchange_code(&self, client_id: &str, client_secret: &str, code: &str) -> Result<String> {
        let params = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GuploadError::TokenExchange(e.to_string()))?;
        Ok(response.text().await?)
    }

    /// Keep the stored access token of `account` valid.
    ///
    /// Nothing is requested when `force` is false and the stored token is
    /// well-formed and unexpired. Otherwise the token endpoint response
    /// (`prior_response` when given, else a new refresh request) becomes the
    /// new stored token.
    pub async fn check_access_token(
        &self,
        store: &mut ConfigStore,
        account: &str,
        grant: &RefreshGrant,
        force: bool,
        prior_response: Option<&str>,
    ) -> Result<AccessToken> {
        let now = unix_now();
        if !force {
            if let Some(token) = AccessToken::from_store(store, account) {
                if token.is_usable_at(now) {
                    debug!(account, expires_in = token.seconds_remaining(now), "access token still valid");
                    return Ok(token);
                }
            }
        }

        let token = match prior_response {
            Some(body) => AccessToken::from_token_body(body, now)?,
            None => self.refresh_access_token(grant).await?,
        };
        token.persist(store, account)?;
        debug!(account, expires_at = token.expires_at(), "stored new access token");
        Ok(token)
    }

    /// Trade the refresh token for a new access token without touching any
    /// store.
    pub async fn refresh_access_token(&self, grant: &RefreshGrant) -> Result<AccessToken> {
        let params = [
            ("client_id", grant.client_id.as_str()),
            ("client_secret", grant.client_secret.as_str()),
            ("refresh_token", grant.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GuploadError::Refresh(e.to_string()))?;
        let now = unix_now();
        let body = response.text().await?;
        AccessToken::from_token_body(&body, now)
    }

    /// Return the account's root folder, asking for and resolving it on first
    /// use. An empty answer, or no terminal, selects the Drive root.
    pub async fn ensure_root_folder(
        &self,
        store: &mut ConfigStore,
        account: &str,
        api: &ApiClient,
        prompt: &mut dyn Prompt,
    ) -> Result<RootFolder> {
        if let Some(id) = store.field(account, Field::RootFolder) {
            let id = id.to_string();
            let name = match store.field(account, Field::RootFolderName) {
                Some(name) => name.to_string(),
                None => {
                    let name = self.folder_name(api, &id).await?;
                    store.set_field(account, Field::RootFolderName, &name)?;
                    name
                }
            };
            return Ok(RootFolder { id, name });
        }

        let answer = if prompt.is_interactive() {
            prompt
                .ask("Root folder URL or ID (leave empty for the Drive root): ")?
                .unwrap_or_default()
        } else {
            String::new()
        };
        let requested = match answer.trim() {
            "" => "root".to_string(),
            value => extract_id(value)?,
        };

        let folder = api
            .get_file(&requested, "id,name")
            .await
            .map_err(|e| GuploadError::Metadata(e.to_string()))?;
        store.edit(|edit| {
            edit.set_field(account, Field::RootFolder, &folder.id);
            edit.set_field(account, Field::RootFolderName, &folder.name);
        })?;
        info!(account, root = %folder.id, "configured root folder");
        Ok(RootFolder {
            id: folder.id,
            name: folder.name,
        })
    }

    async fn folder_name(&self, api: &ApiClient, id: &str) -> Result<String> {
        api.get_file(id, "name")
            .await
            .map(|folder| folder.name)
            .map_err(|e| GuploadError::Metadata(e.to_string()))
    }
}
