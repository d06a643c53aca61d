//! Authenticated Google Drive API requests.

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::{GuploadError, Result};
use crate::models::{ApiErrorResponse, FileListResponse, RemoteFileDescriptor};
use crate::token::SharedToken;

/// Google Drive API scope requested for every account.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Redirect URI for the copy/paste authorization code flow.
pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// How long the reachability check may take.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields requested when describing a file after an operation.
pub const FILE_FIELDS: &str = "id,name,mimeType,size,md5Checksum";

/// OAuth and Drive base URLs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

impl Endpoints {
    /// All endpoints under one base URL, laid out like Google's.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/o/oauth2/auth", base),
            token_url: format!("{}/token", base),
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
        }
    }
}

/// Check that the Drive API host answers at all.
pub async fn check_connectivity(endpoints: &Endpoints) -> Result<()> {
    Client::new()
        .get(&endpoints.api_base)
        .timeout(CONNECTIVITY_TIMEOUT)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| GuploadError::Transfer(format!("no internet connection: {}", e)))
}

/// Client for Drive requests carrying the current bearer token.
///
/// It does not refresh tokens itself; callers keep the shared token valid.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: Endpoints,
    token: SharedToken,
}

impl ApiClient {
    pub fn new(endpoints: Endpoints, token: SharedToken) -> Self {
        // Resumable sessions answer 308 without a Location; never follow it.
        let http = Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoints,
            token,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn token(&self) -> &SharedToken {
        &self.token
    }

    /// Start a request to `url` with the current bearer token attached.
    pub async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self.token.get().await;
        self.http.request(method, url).bearer_auth(token.value())
    }

    /// Files named `name` directly under `parent_id`, with `extra_field`
    /// added to the requested metadata.
    pub async fn find_files(
        &self,
        name: &str,
        parent_id: &str,
        extra_field: Option<&str>,
    ) -> Result<Vec<RemoteFileDescriptor>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'"),
            parent_id
        );
        let fields = match extra_field {
            Some(field) => format!("files(id,name,mimeType,{})", field),
            None => "files(id,name,mimeType)".to_string(),
        };

        let response = self
            .request(Method::GET, &format!("{}/files", self.endpoints.api_base))
            .await
            .query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .map_err(|e| GuploadError::Transfer(e.to_string()))?;

        let body = check_status(response)
            .await
            .map_err(|e| GuploadError::Metadata(e.to_string()))?
            .text()
            .await?;
        let list: FileListResponse =
            serde_json::from_str(&body).map_err(|_| GuploadError::Metadata(body.clone()))?;
        debug!(name, parent_id, matches = list.files.len(), "searched for existing file");
        Ok(list.files)
    }

    /// Metadata of one file.
    pub async fn get_file(&self, file_id: &str, fields: &str) -> Result<RemoteFileDescriptor> {
        let response = self
            .request(
                Method::GET,
                &format!("{}/files/{}", self.endpoints.api_base, file_id),
            )
            .await
            .query(&[("fields", fields), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|_| GuploadError::Metadata(body))
    }

    /// Delete a file by ID. A file that is already gone counts as deleted.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("{}/files/{}", self.endpoints.api_base, file_id),
            )
            .await
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    /// Server-side copy of `file_id` described by `body`.
    pub async fn copy_file(&self, file_id: &str, body: &Value) -> Result<RemoteFileDescriptor> {
        let response = self
            .request(
                Method::POST,
                &format!("{}/files/{}/copy", self.endpoints.api_base, file_id),
            )
            .await
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(body)
            .send()
            .await
            .map_err(|e| GuploadError::Transfer(e.to_string()))?;

        let text = response.text().await?;
        RemoteFileDescriptor::from_body(&text).ok_or(GuploadError::Transfer(text))
    }

    /// Post a permission on `file_id`, returning the raw response body.
    pub async fn create_permission(&self, file_id: &str, body: &Value) -> Result<String> {
        let response = self
            .request(
                Method::POST,
                &format!("{}/files/{}/permissions", self.endpoints.api_base, file_id),
            )
            .await
            .query(&[("supportsAllDrives", "true")])
            .json(body)
            .send()
            .await?;
        Ok(response.text().await?)
    }

    /// Open a resumable upload session and return its URI.
    ///
    /// `file_id` selects an in-place update (PATCH) instead of a new file.
    pub async fn start_resumable(
        &self,
        file_id: Option<&str>,
        metadata: &Value,
        mime_type: &str,
        size: u64,
    ) -> Result<String> {
        let (method, url) = match file_id {
            Some(id) => (
                Method::PATCH,
                format!("{}/files/{}", self.endpoints.upload_base, id),
            ),
            None => (Method::POST, format!("{}/files", self.endpoints.upload_base)),
        };

        let response = self
            .request(method, &url)
            .await
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", size.to_string())
            .json(metadata)
            .send()
            .await
            .map_err(|e| GuploadError::Transfer(e.to_string()))?;

        let response = check_status(response)
            .await
            .map_err(|e| GuploadError::Transfer(e.to_string()))?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GuploadError::Transfer("no upload URL in response".to_string()))
    }
}

/// Pass successful responses through; turn failures into `ApiError`.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(GuploadError::Api {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(GuploadError::Api {
        status: status.as_u16(),
        message: error_body,
    })
}
