//! Turn folder and file arguments (raw ids or Drive links) into ids.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GuploadError, Result};

/// Id embedded in a path segment: `/folders/<id>` or `/d/<id>`.
static PATH_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:folders|d)/([A-Za-z0-9_-]+)").expect("Invalid path id regex")
});

/// Id passed as a query parameter: `?id=<id>` or `&id=<id>`.
static QUERY_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("Invalid query id regex"));

static RAW_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid raw id regex"));

/// Extract a Drive id from a link, or accept a raw id as is.
///
/// ```
/// use gupload::drive_id::extract_id;
///
/// let id = extract_id("https://drive.google.com/drive/folders/1abc?usp=sharing").unwrap();
/// assert_eq!(id, "1abc");
/// assert_eq!(extract_id("root").unwrap(), "root");
/// ```
pub fn extract_id(input: &str) -> Result<String> {
    let input = input.trim();

    if RAW_ID_REGEX.is_match(input) {
        return Ok(input.to_string());
    }

    if input.contains("://") {
        let found = PATH_ID_REGEX
            .captures(input)
            .or_else(|| QUERY_ID_REGEX.captures(input))
            .and_then(|caps| caps.get(1));
        if let Some(id) = found {
            return Ok(id.as_str().to_string());
        }
    }

    Err(GuploadError::InvalidUrlOrId(input.to_string()))
}
