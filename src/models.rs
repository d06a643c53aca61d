//! Data models for Google Drive and OAuth responses.

use serde::Deserialize;

/// The subset of remote file metadata consulted by upload and clone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default, rename = "md5Checksum")]
    pub md5: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub writers_can_share: Option<bool>,
}

impl RemoteFileDescriptor {
    /// Parse an API object description; an object without an id is rejected.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|file| !file.id.is_empty())
    }

    /// Value of a metadata field used for duplicate checks.
    pub fn check_value(&self, field: &str) -> Option<String> {
        match field {
            "size" => self.size.map(|s| s.to_string()),
            "md5Checksum" => self.md5.clone(),
            _ => None,
        }
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl std::fmt::Display for RemoteFileDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = self
            .size
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        write!(f, "{} ({}) [{}]", self.name, size_str, self.id)
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<RemoteFileDescriptor>,
}

/// Response from the permissions.create API endpoint.
#[derive(Debug, Deserialize)]
pub struct PermissionResponse {
    #[serde(default)]
    pub id: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// OAuth2 token endpoint response, for either grant type.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "test.txt",
            "mimeType": "text/plain",
            "size": "1024",
            "md5Checksum": "5eb63bbbe01eeed093cb22bb8f5acdc3",
            "parents": ["folder1"],
            "writersCanShare": true
        }"#;

        let file = RemoteFileDescriptor::from_body(json).unwrap();
        assert_eq!(file.id, "abc123");
        assert_eq!(file.size, Some(1024));
        assert_eq!(file.md5.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert_eq!(file.parents, vec!["folder1".to_string()]);
        assert_eq!(file.writers_can_share, Some(true));
        assert_eq!(file.check_value("size").as_deref(), Some("1024"));
    }

    #[test]
    fn test_descriptor_without_id_is_rejected() {
        assert!(RemoteFileDescriptor::from_body(r#"{"name": "x"}"#).is_none());
        assert!(RemoteFileDescriptor::from_body("not json").is_none());
    }

    #[test]
    fn test_token_response_error_shape() {
        let body = r#"{"error": "invalid_grant", "error_description": "Bad Request"}"#;
        let response: TokenResponse = serde_json::from_str(body).unwrap();
        assert!(response.access_token.is_none());
        assert_eq!(response.error.as_deref(), Some("invalid_grant"));
    }

    #[test]
    fn test_descriptor_display() {
        let file = RemoteFileDescriptor {
            id: "abc123".to_string(),
            name: "document.pdf".to_string(),
            size: Some(1048576),
            ..Default::default()
        };

        let display = format!("{}", file);
        assert!(display.contains("abc123"));
        assert!(display.contains("document.pdf"));
        assert!(display.contains("1.00 MB"));
    }
}
