//! Upload of a single local file: create, overwrite, resume or skip.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use md5::{Digest, Md5};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Body, Method, Version};
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, FILE_FIELDS};
use crate::error::{GuploadError, Result};
use crate::models::RemoteFileDescriptor;
use crate::session_store::{SessionKey, SessionStore, RESUME_THRESHOLD};

/// Secondary check deciding whether a same-named remote file is a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckMode {
    #[default]
    None,
    Size,
    Md5,
}

impl CheckMode {
    /// Drive metadata field compared by this mode.
    pub fn field(self) -> Option<&'static str> {
        match self {
            CheckMode::None => None,
            CheckMode::Size => Some("size"),
            CheckMode::Md5 => Some("md5Checksum"),
        }
    }
}

impl FromStr for CheckMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CheckMode::None),
            "size" => Ok(CheckMode::Size),
            "md5" => Ok(CheckMode::Md5),
            other => Err(format!("unknown check mode '{}' (expected size or md5)", other)),
        }
    }
}

/// `Create` always makes a new object; `Update` looks for an existing one
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Create,
    Update,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub job: Job,
    pub path: PathBuf,
    pub folder_id: String,
    pub check: CheckMode,
    pub skip_duplicates: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAction {
    Created,
    Updated,
    Resumed,
    AlreadyUploaded,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file: RemoteFileDescriptor,
    pub action: UploadAction,
    pub bytes_sent: u64,
}

/// Look for a file called `name` under `folder_id` that passes `check`.
///
/// `expected` is the local value of the checked field. Every same-named
/// file is considered and the first match wins. Without a check any
/// same-named file matches.
pub(crate) async fn find_existing(
    api: &ApiClient,
    name: &str,
    folder_id: &str,
    check: CheckMode,
    expected: Option<&str>,
) -> Result<Option<RemoteFileDescriptor>> {
    let files = api.find_files(name, folder_id, check.field()).await?;
    for file in files {
        if file.id.is_empty() {
            return Err(GuploadError::Metadata(format!(
                "existing file '{}' has no id",
                name
            )));
        }
        let matched = match check.field() {
            None => true,
            Some(field) => expected.is_some() && file.check_value(field).as_deref() == expected,
        };
        debug!(name, id = %file.id, matched, "existing file check");
        if matched {
            return Ok(Some(file));
        }
    }
    Ok(None)
}

struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
}

impl LocalFile {
    fn inspect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GuploadError::Transfer(format!("not a file: {}", path.display())))?
            .to_string();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(GuploadError::Transfer(format!("not a file: {}", path.display())));
        }
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
        })
    }
}

/// Hex md5 digest of a local file.
pub async fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

enum SessionState {
    /// Session alive; the next byte the server expects.
    Incomplete { next_offset: u64 },
    /// The upload behind the session already finished.
    Complete(String),
    /// Session unusable (error status, or 0 for a connection failure).
    Dead(u16),
}

/// Where the bytes go: a new object or an in-place update.
struct Target {
    file_id: Option<String>,
    metadata: Value,
}

pub struct UploadEngine {
    api: ApiClient,
    sessions: SessionStore,
}

impl UploadEngine {
    pub fn new(api: ApiClient, sessions: SessionStore) -> Self {
        Self { api, sessions }
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome> {
        let local = LocalFile::inspect(&request.path)?;
        let expected = match request.check {
            CheckMode::None => None,
            CheckMode::Size => Some(local.size.to_string()),
            CheckMode::Md5 => Some(md5_file(&local.path).await?),
        };

        let mut existing_id = None;
        if request.job == Job::Update {
            let existing = find_existing(
                &self.api,
                &local.name,
                &request.folder_id,
                request.check,
                expected.as_deref(),
            )
            .await?;

            if let Some(existing) = existing {
                if request.skip_duplicates {
                    info!(name = %local.name, id = %existing.id, "already exists, skipping");
                    return Ok(UploadOutcome {
                        file: existing,
                        action: UploadAction::Skipped,
                        bytes_sent: 0,
                    });
                }
                existing_id = Some(existing.id);
            }
        }

        let target = build_target(&local, &request.folder_id, existing_id, request.description.as_deref());
        self.transfer(&local, &request.folder_id, target).await
    }

    async fn transfer(&self, local: &LocalFile, folder_id: &str, target: Target) -> Result<UploadOutcome> {
        let key = SessionKey::new(&local.name, folder_id, local.size);
        let finished_action = if target.file_id.is_some() {
            UploadAction::Updated
        } else {
            UploadAction::Created
        };

        if let Some(uri) = self.sessions.load(&key) {
            match self.check_session(&uri, local.size).await {
                SessionState::Incomplete { next_offset } => {
                    info!(name = %local.name, next_offset, "resuming upload");
                    let (file, bytes_sent) = self.send_body(&uri, local, next_offset).await?;
                    self.sessions.remove(&key)?;
                    return Ok(UploadOutcome {
                        file,
                        action: UploadAction::Resumed,
                        bytes_sent,
                    });
                }
                SessionState::Complete(body) => {
                    info!(name = %local.name, "upload session had already completed");
                    self.sessions.remove(&key)?;
                    let file = RemoteFileDescriptor::from_body(&body)
                        .ok_or(GuploadError::Metadata(body))?;
                    return Ok(UploadOutcome {
                        file,
                        action: UploadAction::AlreadyUploaded,
                        bytes_sent: 0,
                    });
                }
                SessionState::Dead(status) => {
                    warn!(name = %local.name, status, "upload session expired, starting over");
                    self.sessions.remove(&key)?;
                }
            }
        }

        let uri = self
            .api
            .start_resumable(
                target.file_id.as_deref(),
                &target.metadata,
                &local.mime_type,
                local.size,
            )
            .await?;
        if local.size > RESUME_THRESHOLD {
            self.sessions.save(&key, &uri)?;
        }

        let (file, bytes_sent) = self.send_body(&uri, local, 0).await?;
        self.sessions.remove(&key)?;
        Ok(UploadOutcome {
            file,
            action: finished_action,
            bytes_sent,
        })
    }

    async fn check_session(&self, uri: &str, size: u64) -> SessionState {
        let response = self
            .api
            .request(Method::PUT, uri)
            .await
            .header(CONTENT_LENGTH, 0)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "upload session check failed");
                return SessionState::Dead(0);
            }
        };

        match response.status().as_u16() {
            308 => {}
            200 | 201 => {
                return SessionState::Complete(response.text().await.unwrap_or_default());
            }
            status => return SessionState::Dead(status),
        }

        let status_query = self
            .api
            .request(Method::PUT, uri)
            .await
            .header(CONTENT_LENGTH, 0)
            .header(CONTENT_RANGE, format!("bytes */{}", size))
            .send()
            .await;
        match status_query {
            Ok(response) if response.status().as_u16() == 308 => {
                let next_offset = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map_or(0, |end| end + 1);
                SessionState::Incomplete { next_offset }
            }
            Ok(response) if response.status().is_success() => {
                SessionState::Complete(response.text().await.unwrap_or_default())
            }
            Ok(response) => SessionState::Dead(response.status().as_u16()),
            Err(_) => SessionState::Dead(0),
        }
    }

    /// Stream the file from `offset` to the session URI.
    async fn send_body(
        &self,
        uri: &str,
        local: &LocalFile,
        offset: u64,
    ) -> Result<(RemoteFileDescriptor, u64)> {
        let mut file = File::open(&local.path).await?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        let sent = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent);
        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            }
        });

        let remaining = local.size.saturating_sub(offset);
        let mut request = self
            .api
            .request(Method::PUT, uri)
            .await
            .query(&[("fields", FILE_FIELDS)])
            .header(CONTENT_TYPE, &local.mime_type)
            .header(CONTENT_LENGTH, remaining);

        if offset > 0 {
            let range = if remaining == 0 {
                format!("bytes */{}", local.size)
            } else {
                format!("bytes {}-{}/{}", offset, local.size - 1, local.size)
            };
            request = request.version(Version::HTTP_11).header(CONTENT_RANGE, range);
        }

        let response = request
            .body(Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| GuploadError::Transfer(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GuploadError::Transfer(format!("{}: {}", status.as_u16(), body)));
        }

        let file = RemoteFileDescriptor::from_body(&body).ok_or(GuploadError::Metadata(body))?;
        Ok((file, sent.load(Ordering::Relaxed)))
    }
}

fn build_target(
    local: &LocalFile,
    folder_id: &str,
    existing_id: Option<String>,
    description: Option<&str>,
) -> Target {
    let mut metadata = json!({
        "name": local.name,
        "mimeType": local.mime_type,
    });
    let parents_key = if existing_id.is_some() { "addParents" } else { "parents" };
    metadata[parents_key] = json!([folder_id]);
    if let Some(description) = description {
        metadata["description"] = json!(description);
    }

    Target {
        file_id: existing_id,
        metadata,
    }
}

/// Last received byte from a `Range: bytes=0-<end>` header.
fn parse_range_end(range: &str) -> Option<u64> {
    range
        .trim()
        .strip_prefix("bytes=")?
        .split_once('-')?
        .1
        .trim()
        .parse()
        .ok()
}
