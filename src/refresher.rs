//! Background task keeping the in-process access token fresh.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialManager;
use crate::token::{unix_now, RefreshGrant, SharedToken};

#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Refresh once the token has less than this left.
    pub margin: Duration,
    /// Extra sleep after every iteration.
    pub pace: Duration,
    /// Upper bound for a single refresh request.
    pub attempt_timeout: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            margin: Duration::from_secs(300),
            pace: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

pub struct TokenRefresher {
    credentials: CredentialManager,
    grant: RefreshGrant,
    token: SharedToken,
    config: RefresherConfig,
}

impl TokenRefresher {
    pub fn new(credentials: CredentialManager, grant: RefreshGrant, token: SharedToken) -> Self {
        Self::with_config(credentials, grant, token, RefresherConfig::default())
    }

    pub fn with_config(
        credentials: CredentialManager,
        grant: RefreshGrant,
        token: SharedToken,
        config: RefresherConfig,
    ) -> Self {
        Self {
            credentials,
            grant,
            token,
            config,
        }
    }

    /// Start the refresh loop on the current runtime.
    pub fn spawn(self) -> RefresherHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        RefresherHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        debug!("token refresher started");
        let margin = self.config.margin.as_secs() as i64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let remaining = self.token.get().await.seconds_remaining(unix_now());
            if remaining <= margin {
                self.refresh_once().await;
            } else {
                let wait = Duration::from_secs((remaining - margin) as u64);
                debug!(sleep_secs = wait.as_secs(), "sleeping until next refresh");
                if !sleep_or_cancel(wait, &cancel).await {
                    break;
                }
            }

            if !sleep_or_cancel(self.config.pace, &cancel).await {
                break;
            }
        }
        debug!("token refresher stopped");
    }

    /// One bounded refresh attempt. Failures wait for the next iteration.
    async fn refresh_once(&self) {
        let attempt = tokio::time::timeout(
            self.config.attempt_timeout,
            self.credentials.refresh_access_token(&self.grant),
        )
        .await;

        match attempt {
            Ok(Ok(token)) => {
                info!(expires_at = token.expires_at(), "refreshed access token in background");
                self.token.set(token).await;
            }
            Ok(Err(err)) => warn!(error = %err, "background token refresh failed"),
            Err(_) => warn!(
                timeout_secs = self.config.attempt_timeout.as_secs(),
                "background token refresh timed out"
            ),
        }
    }
}

/// Returns false when cancelled before `duration` elapsed.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Owner of the running refresher; dropping it stops the task.
pub struct RefresherHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "token refresher ended abnormally");
            }
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
