//! Sharing permissions on uploaded or cloned files.

use std::str::FromStr;

use serde_json::json;
use tracing::info;

use crate::api::ApiClient;
use crate::error::{GuploadError, Result};
use crate::models::PermissionResponse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Reader,
    Commenter,
    Writer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Commenter => "commenter",
            Role::Writer => "writer",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "commenter" => Ok(Role::Commenter),
            "writer" => Ok(Role::Writer),
            other => Err(format!(
                "unknown role '{}' (expected reader, commenter or writer)",
                other
            )),
        }
    }
}

pub struct ShareManager {
    api: ApiClient,
}

impl ShareManager {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Grant `role` on `file_id` to `email`, or to anyone with the link.
    ///
    /// Returns the new permission id.
    pub async fn share(&self, file_id: &str, role: Role, email: Option<&str>) -> Result<String> {
        let body = match email {
            Some(email) => json!({
                "role": role.as_str(),
                "type": "user",
                "emailAddress": email,
            }),
            None => json!({
                "role": role.as_str(),
                "type": "anyone",
            }),
        };

        let text = self.api.create_permission(file_id, &body).await?;
        let permission_id = serde_json::from_str::<PermissionResponse>(&text)
            .ok()
            .and_then(|p| p.id)
            .filter(|id| !id.is_empty())
            .ok_or(GuploadError::Share(text))?;

        info!(file_id, role = role.as_str(), "shared file");
        Ok(permission_id)
    }
}
