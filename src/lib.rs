//! gupload - upload, clone and share files on Google Drive.
//!
//! This library provides:
//! - Named accounts with OAuth2 credentials kept in a `KEY="VALUE"` config file
//! - Interactive credential setup with shape validation
//! - Resumable uploads that continue after an interrupted run
//! - Server-side copies and sharing permissions
//! - A background task keeping the access token fresh during long runs
//!
//! # Example
//!
//! ```no_run
//! use gupload::{
//!     AccountRegistry, ConfigStore, CredentialManager, Endpoints, Job, CheckMode, Session,
//!     SessionOptions, TerminalPrompt, UploadRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = AccountRegistry::new(ConfigStore::open("gupload.conf")?)?;
//!     let credentials = CredentialManager::new(Endpoints::default());
//!     let mut prompt = TerminalPrompt::new();
//!     let options = SessionOptions {
//!         account: None,
//!         background: true,
//!         session_dir: "sessions".into(),
//!     };
//!     let session = Session::start(&mut registry, &credentials, options, &mut prompt).await?;
//!
//!     let outcome = session
//!         .uploader()
//!         .upload(&UploadRequest {
//!             job: Job::Create,
//!             path: "notes.txt".into(),
//!             folder_id: session.root_folder().id.clone(),
//!             check: CheckMode::None,
//!             skip_duplicates: false,
//!             description: None,
//!         })
//!         .await?;
//!     println!("{}", outcome.file);
//!
//!     session.finish().await;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod api;
pub mod clone;
pub mod config;
pub mod credentials;
pub mod drive_id;
pub mod error;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod refresher;
pub mod session;
pub mod session_store;
pub mod share;
pub mod token;
pub mod upload;

// Re-exports for convenience
pub use account::AccountRegistry;
pub use api::{check_connectivity, ApiClient, Endpoints};
pub use clone::{CloneAction, CloneEngine, CloneOutcome, CloneRequest};
pub use config::{ConfigStore, Field};
pub use credentials::{CredentialManager, RootFolder};
pub use drive_id::extract_id;
pub use error::{GuploadError, Result};
pub use models::RemoteFileDescriptor;
pub use prompt::{Prompt, ScriptedPrompt, TerminalPrompt};
pub use refresher::{RefresherConfig, RefresherHandle, TokenRefresher};
pub use session::{Session, SessionOptions};
pub use session_store::SessionStore;
pub use share::{Role, ShareManager};
pub use token::{AccessToken, RefreshGrant, SharedToken};
pub use upload::{CheckMode, Job, UploadAction, UploadEngine, UploadOutcome, UploadRequest};
