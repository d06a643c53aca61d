//! Flat `KEY="VALUE"` config file holding every account's credentials.
//!
//! The file is kept read-only for its owner. Each mutation relaxes the
//! permissions, rewrites the whole file through a sibling temporary file and
//! restores read-only mode. A key is stored at most once: setting it drops all
//! earlier lines for that key before the new line is appended.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GuploadError, Result};

/// Key naming the account used when none is selected explicitly.
pub const DEFAULT_ACCOUNT_KEY: &str = "DEFAULT_ACCOUNT";

/// Per-account settings kept in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ClientId,
    ClientSecret,
    RefreshToken,
    RootFolder,
    RootFolderName,
    AccessToken,
    AccessTokenExpiry,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::ClientId,
        Field::ClientSecret,
        Field::RefreshToken,
        Field::RootFolder,
        Field::RootFolderName,
        Field::AccessToken,
        Field::AccessTokenExpiry,
    ];

    /// Key suffix, which is also the unscoped key used by the legacy layout.
    pub const fn suffix(self) -> &'static str {
        match self {
            Field::ClientId => "CLIENT_ID",
            Field::ClientSecret => "CLIENT_SECRET",
            Field::RefreshToken => "REFRESH_TOKEN",
            Field::RootFolder => "ROOT_FOLDER",
            Field::RootFolderName => "ROOT_FOLDER_NAME",
            Field::AccessToken => "ACCESS_TOKEN",
            Field::AccessTokenExpiry => "ACCESS_TOKEN_EXPIRY",
        }
    }

    /// Key of this field for the named account, e.g. `ACCOUNT_work_CLIENT_ID`.
    pub fn scoped_key(self, account: &str) -> String {
        format!("ACCOUNT_{}_{}", account, self.suffix())
    }
}

/// Batched edits applied with a single rewrite of the file.
pub struct ConfigEdit<'a> {
    entries: &'a mut Vec<(String, String)>,
}

impl ConfigEdit<'_> {
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn set_field(&mut self, account: &str, field: Field, value: &str) {
        self.set(&field.scoped_key(account), value);
    }
}

/// Line-oriented key/value store backed by a single file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl ConfigStore {
    /// Load the store at `path`. A missing file is an empty store; the file
    /// is created on the first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(GuploadError::config_io(path, err)),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded config");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Non-empty value of `field` for `account`.
    pub fn field(&self, account: &str, field: Field) -> Option<&str> {
        self.get(&field.scoped_key(account))
            .filter(|value| !value.is_empty())
    }

    /// Non-empty value of `field` in the legacy unscoped layout.
    pub fn legacy_field(&self, field: Field) -> Option<&str> {
        self.get(field.suffix()).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.edit(|edit| edit.set(key, value))
    }

    pub fn set_field(&mut self, account: &str, field: Field, value: &str) -> Result<()> {
        self.set(&field.scoped_key(account), value)
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.edit(|edit| edit.remove(key))
    }

    /// Drop every entry for which `predicate(key, value)` holds.
    pub fn remove_where<F>(&mut self, predicate: F) -> Result<()>
    where
        F: Fn(&str, &str) -> bool,
    {
        self.edit(|edit| edit.entries.retain(|(k, v)| !predicate(k, v)))
    }

    /// Apply several changes and write the file once. The in-memory view
    /// only changes when the write succeeds.
    pub fn edit<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigEdit<'_>),
    {
        let mut entries = self.entries.clone();
        apply(&mut ConfigEdit {
            entries: &mut entries,
        });
        self.persist(&entries)?;
        self.entries = entries;
        Ok(())
    }

    fn persist(&self, entries: &[(String, String)]) -> Result<()> {
        let mut content = String::new();
        for (key, value) in entries {
            let _ = writeln!(content, "{}=\"{}\"", key, value);
        }

        let io_err = |err: std::io::Error| GuploadError::config_io(&self.path, err);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        let temp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        if self.path.exists() {
            set_writable(&self.path, true).map_err(io_err)?;
        }
        let _ = fs::remove_file(&temp_path);
        let written = write_private(&temp_path, content.as_bytes())
            .and_then(|()| fs::rename(&temp_path, &self.path));
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(err));
        }
        set_writable(&self.path, false).map_err(io_err)?;

        debug!(path = %self.path.display(), entries = entries.len(), "wrote config");
        Ok(())
    }
}

/// Create `path` readable by its owner only and write `content` to it.
pub(crate) fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn parse(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(unix)]
fn set_writable(path: &Path, writable: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if writable { 0o600 } else { 0o400 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_writable(path: &Path, writable: bool) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(!writable);
    fs::set_permissions(path, permissions)
}
