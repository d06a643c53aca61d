//! Server-side copies of existing Drive files into a folder.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::{ApiClient, FILE_FIELDS};
use crate::error::Result;
use crate::models::RemoteFileDescriptor;
use crate::upload::{find_existing, CheckMode, Job};

#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub job: Job,
    pub source_id: String,
    pub folder_id: String,
    pub check: CheckMode,
    pub skip_duplicates: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneAction {
    Cloned,
    /// Copied over an existing file, which was then removed.
    Updated,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CloneOutcome {
    pub file: RemoteFileDescriptor,
    pub action: CloneAction,
}

pub struct CloneEngine {
    api: ApiClient,
}

impl CloneEngine {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn clone_file(&self, request: &CloneRequest) -> Result<CloneOutcome> {
        let source = self.api.get_file(&request.source_id, FILE_FIELDS).await?;
        let expected = request
            .check
            .field()
            .and_then(|field| source.check_value(field));

        let existing = match request.job {
            Job::Create => None,
            Job::Update => {
                find_existing(
                    &self.api,
                    &source.name,
                    &request.folder_id,
                    request.check,
                    expected.as_deref(),
                )
                .await?
            }
        };

        if let Some(existing) = &existing {
            if request.skip_duplicates {
                info!(name = %source.name, id = %existing.id, "already exists, skipping clone");
                return Ok(CloneOutcome {
                    file: existing.clone(),
                    action: CloneAction::Skipped,
                });
            }
        }

        let body = match &existing {
            Some(existing) => {
                let target = self
                    .api
                    .get_file(&existing.id, "parents,writersCanShare")
                    .await?;
                overwrite_body(&source, &target, request.description.as_deref())
            }
            None => create_body(&source, &request.folder_id, request.description.as_deref()),
        };

        let copy = self.api.copy_file(&request.source_id, &body).await?;
        debug!(source = %request.source_id, copy = %copy.id, "copied file");

        let Some(existing) = existing else {
            return Ok(CloneOutcome {
                file: copy,
                action: CloneAction::Cloned,
            });
        };

        if existing.id != copy.id && existing.id != request.source_id {
            info!(id = %existing.id, "removing replaced file");
            self.api.delete_file(&existing.id).await?;
        }
        Ok(CloneOutcome {
            file: copy,
            action: CloneAction::Updated,
        })
    }
}

fn create_body(source: &RemoteFileDescriptor, folder_id: &str, description: Option<&str>) -> Value {
    let mut body = json!({
        "name": source.name,
        "parents": [folder_id],
    });
    if let Some(description) = description {
        body["description"] = json!(description);
    }
    body
}

/// The copy takes over the replaced file's parents and sharing flag.
fn overwrite_body(
    source: &RemoteFileDescriptor,
    target: &RemoteFileDescriptor,
    description: Option<&str>,
) -> Value {
    let mut body = json!({
        "name": source.name,
        "parents": target.parents,
    });
    if let Some(writers_can_share) = target.writers_can_share {
        body["writersCanShare"] = json!(writers_can_share);
    }
    if let Some(description) = description {
        body["description"] = json!(description);
    }
    body
}
