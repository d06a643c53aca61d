//! Resumable upload URIs persisted between runs.
//!
//! One small file per outstanding upload, named after the upload's
//! `(name, folder, size)` key and holding the session URI.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::debug;

use crate::config::write_private;
use crate::error::Result;

/// Uploads larger than this many bytes are worth resuming.
pub const RESUME_THRESHOLD: u64 = 1_000_000;

const SESSION_DIR_ENV: &str = "GUPLOAD_SESSION_DIR";
const SESSION_DIR_NAME: &str = ".google-drive-upload";

/// Identity of an upload for resume purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub name: String,
    pub folder_id: String,
    pub size: u64,
}

impl SessionKey {
    pub fn new(name: &str, folder_id: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            folder_id: folder_id.to_string(),
            size,
        }
    }

    fn file_name(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{}__{}__{}", self.folder_id, self.size, name)
    }
}

/// Directory of persisted upload sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// `$GUPLOAD_SESSION_DIR`, else `~/.google-drive-upload`.
    pub fn default_dir() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os(SESSION_DIR_ENV).filter(|d| !d.is_empty()) {
            return Some(PathBuf::from(dir));
        }
        BaseDirs::new().map(|dirs| dirs.home_dir().join(SESSION_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, key: &SessionKey) -> Option<String> {
        fs::read_to_string(self.dir.join(key.file_name()))
            .ok()
            .map(|uri| uri.trim().to_string())
            .filter(|uri| !uri.is_empty())
    }

    pub fn save(&self, key: &SessionKey, uri: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(key.file_name());
        self.remove(key)?;
        write_private(&path, format!("{}\n", uri).as_bytes())?;
        debug!(name = %key.name, size = key.size, "saved upload session");
        Ok(())
    }

    /// Forget a session; a missing one is not an error.
    pub fn remove(&self, key: &SessionKey) -> Result<()> {
        match fs::remove_file(self.dir.join(key.file_name())) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
