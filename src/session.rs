//! The per-run context: chosen account, its credentials and the API client.

use std::path::PathBuf;

use tracing::info;

use crate::account::AccountRegistry;
use crate::api::ApiClient;
use crate::clone::CloneEngine;
use crate::credentials::{CredentialManager, RootFolder};
use crate::error::Result;
use crate::prompt::Prompt;
use crate::refresher::{RefresherHandle, TokenRefresher};
use crate::session_store::SessionStore;
use crate::share::ShareManager;
use crate::token::SharedToken;
use crate::upload::UploadEngine;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Account named on the command line, if any.
    pub account: Option<String>,
    /// Run the background token refresher.
    pub background: bool,
    /// Where resumable upload sessions are kept.
    pub session_dir: PathBuf,
}

pub struct Session {
    account: String,
    root: RootFolder,
    api: ApiClient,
    sessions: SessionStore,
    refresher: Option<RefresherHandle>,
}

impl Session {
    /// Select the account, make its credentials usable and resolve its root
    /// folder.
    pub async fn start(
        registry: &mut AccountRegistry,
        credentials: &CredentialManager,
        options: SessionOptions,
        prompt: &mut dyn Prompt,
    ) -> Result<Self> {
        let account = registry
            .select_default_account(options.account.as_deref(), prompt, credentials)
            .await?;
        let creds = credentials
            .ensure_credentials(registry.store_mut(), &account, prompt)
            .await?;

        let token = SharedToken::new(creds.token);
        let api = ApiClient::new(credentials.endpoints().clone(), token.clone());
        let root = credentials
            .ensure_root_folder(registry.store_mut(), &account, &api, prompt)
            .await?;

        let refresher = options.background.then(|| {
            TokenRefresher::new(credentials.clone(), creds.grant, token).spawn()
        });
        info!(account = %account, root = %root.id, background = refresher.is_some(), "session ready");

        Ok(Self {
            account,
            root,
            api,
            sessions: SessionStore::new(options.session_dir),
            refresher,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn root_folder(&self) -> &RootFolder {
        &self.root
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn uploader(&self) -> UploadEngine {
        UploadEngine::new(self.api.clone(), self.sessions.clone())
    }

    pub fn cloner(&self) -> CloneEngine {
        CloneEngine::new(self.api.clone())
    }

    pub fn sharer(&self) -> ShareManager {
        ShareManager::new(self.api.clone())
    }

    /// Stop background work.
    pub async fn finish(mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.shutdown().await;
        }
    }
}
