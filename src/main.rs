//! gupload CLI - upload, clone and share files on Google Drive.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use directories::BaseDirs;
use glob::glob;

use gupload::{
    check_connectivity, extract_id, logging, AccountRegistry, CheckMode, CloneAction,
    CloneRequest, ConfigStore, CredentialManager, Endpoints, Job, RemoteFileDescriptor, Role,
    Session, SessionOptions, SessionStore, TerminalPrompt, UploadAction, UploadRequest,
};

const DEFAULT_CONFIG_NAME: &str = ".googledrive.conf";

/// Upload files to Google Drive, with resumable transfers and multiple accounts.
#[derive(Parser)]
#[command(name = "gupload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files to upload (supports glob patterns like *.tar, file_{1,2,3}.txt).
    inputs: Vec<String>,

    /// Path to the config file (default: ~/.googledrive.conf).
    #[arg(long, env = "GUPLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Account to use for this run.
    #[arg(long, short = 'a')]
    account: Option<String>,

    /// Create a new account and set up its credentials.
    #[arg(long, value_name = "NAME")]
    create_account: Option<String>,

    /// Delete an account from the config file.
    #[arg(long, value_name = "NAME")]
    delete_account: Option<String>,

    /// List configured accounts.
    #[arg(long)]
    list_accounts: bool,

    /// Destination folder URL or ID (default: the account's root folder).
    #[arg(long, short = 'r', value_name = "URL|ID")]
    root_dir: Option<String>,

    /// Replace a same-named file instead of creating another one.
    #[arg(long, short = 'o')]
    overwrite: bool,

    /// Skip files that already exist in the destination.
    #[arg(long, short = 'd')]
    skip_duplicates: bool,

    /// Also compare size or md5 when looking for an existing file.
    #[arg(long, value_name = "size|md5")]
    check_mode: Option<CheckMode>,

    /// Copy an existing Drive file into the destination (repeatable).
    #[arg(long = "clone", value_name = "URL|ID")]
    clones: Vec<String>,

    /// Share every result, with EMAIL or with anyone holding the link.
    #[arg(long, value_name = "EMAIL", num_args = 0..=1, default_missing_value = "")]
    share: Option<String>,

    /// Role granted by --share.
    #[arg(long, default_value = "reader")]
    share_role: Role,

    /// Description attached to uploaded files.
    #[arg(long)]
    description: Option<String>,

    /// Do not refresh the access token in the background.
    #[arg(long)]
    no_background: bool,

    /// Show debug logs.
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn job(&self) -> Job {
        if self.overwrite || self.skip_duplicates || self.check_mode.is_some() {
            Job::Update
        } else {
            Job::Create
        }
    }

    fn share_target(&self) -> Option<Option<&str>> {
        self.share
            .as_deref()
            .map(|email| Some(email).filter(|e| !e.is_empty()))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path().context("Cannot determine the home directory")?,
    };
    let store = ConfigStore::open(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let mut registry = AccountRegistry::new(store).context("Failed to migrate legacy config")?;

    if cli.list_accounts {
        let accounts = registry.list_accounts();
        if accounts.is_empty() {
            println!("No accounts configured.");
        } else {
            for (index, name) in accounts.iter() {
                println!("{}. {}", index, name);
            }
        }
    }

    if let Some(name) = &cli.delete_account {
        registry
            .delete_account(name)
            .with_context(|| format!("Failed to delete account: {}", name))?;
        println!("Deleted account '{}'.", name);
    }

    let has_transfers = !cli.inputs.is_empty() || !cli.clones.is_empty();
    if !has_transfers && cli.create_account.is_none() {
        if cli.list_accounts || cli.delete_account.is_some() {
            return Ok(ExitCode::SUCCESS);
        }
        anyhow::bail!("Nothing to do: give files to upload or --clone");
    }

    let endpoints = Endpoints::default();
    check_connectivity(&endpoints).await?;

    let credentials = CredentialManager::new(endpoints);
    let mut prompt = TerminalPrompt::new();
    let mut account = cli.account.clone();

    if let Some(requested) = &cli.create_account {
        let name = registry
            .create_account(Some(requested.as_str()), &mut prompt, &credentials)
            .await
            .with_context(|| format!("Failed to create account: {}", requested))?;
        println!("Account '{}' is ready.", name);
        account = Some(name);
    }

    if !has_transfers {
        return Ok(ExitCode::SUCCESS);
    }

    let files = expand_inputs(&cli.inputs)?;
    if files.is_empty() && cli.clones.is_empty() {
        anyhow::bail!("No files to upload");
    }

    let options = SessionOptions {
        account,
        background: !cli.no_background,
        session_dir: SessionStore::default_dir()
            .context("Cannot determine the upload session directory")?,
    };
    let session = Session::start(&mut registry, &credentials, options, &mut prompt)
        .await
        .context("Failed to start session")?;

    let folder_id = match &cli.root_dir {
        Some(dir) => {
            extract_id(dir).with_context(|| format!("Invalid folder URL or ID: {}", dir))?
        }
        None => session.root_folder().id.clone(),
    };
    println!("Account: {} -> folder {}", session.account(), folder_id);

    let failures = run_transfers(&cli, &session, &files, &folder_id).await;
    session.finish().await;

    if failures > 0 {
        eprintln!("{} operation(s) failed.", failures);
        return Ok(ExitCode::FAILURE);
    }
    println!("Done.");
    Ok(ExitCode::SUCCESS)
}

/// Upload then clone everything, one at a time. Returns the failure count.
async fn run_transfers(cli: &Cli, session: &Session, files: &[PathBuf], folder_id: &str) -> usize {
    let uploader = session.uploader();
    let cloner = session.cloner();
    let check = cli.check_mode.unwrap_or_default();
    let mut failures = 0;

    for (idx, path) in files.iter().enumerate() {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        print!("[{}/{}] Uploading {}... ", idx + 1, files.len(), filename);

        let request = UploadRequest {
            job: cli.job(),
            path: path.clone(),
            folder_id: folder_id.to_string(),
            check,
            skip_duplicates: cli.skip_duplicates,
            description: cli.description.clone(),
        };
        match uploader.upload(&request).await {
            Ok(outcome) => {
                println!("{} {}", upload_label(outcome.action), outcome.file);
                if !share_result(cli, session, &outcome.file).await {
                    failures += 1;
                }
            }
            Err(e) => {
                println!("FAILED");
                eprintln!("  Error: {}", e);
                failures += 1;
            }
        }
    }

    for source in &cli.clones {
        print!("Cloning {}... ", source);
        let source_id = match extract_id(source) {
            Ok(id) => id,
            Err(e) => {
                println!("FAILED");
                eprintln!("  Error: {}", e);
                failures += 1;
                continue;
            }
        };

        let request = CloneRequest {
            job: cli.job(),
            source_id,
            folder_id: folder_id.to_string(),
            check,
            skip_duplicates: cli.skip_duplicates,
            description: cli.description.clone(),
        };
        match cloner.clone_file(&request).await {
            Ok(outcome) => {
                let label = match outcome.action {
                    CloneAction::Cloned => "CLONED",
                    CloneAction::Updated => "UPDATED",
                    CloneAction::Skipped => "SKIPPED",
                };
                println!("{} {}", label, outcome.file);
                if !share_result(cli, session, &outcome.file).await {
                    failures += 1;
                }
            }
            Err(e) => {
                println!("FAILED");
                eprintln!("  Error: {}", e);
                failures += 1;
            }
        }
    }

    failures
}

async fn share_result(cli: &Cli, session: &Session, file: &RemoteFileDescriptor) -> bool {
    let Some(email) = cli.share_target() else {
        return true;
    };

    match session.sharer().share(&file.id, cli.share_role, email).await {
        Ok(_) => {
            println!("  Shared as {} with {}", cli.share_role.as_str(), email.unwrap_or("anyone"));
            true
        }
        Err(e) => {
            eprintln!("  Share failed: {}", e);
            false
        }
    }
}

fn upload_label(action: UploadAction) -> &'static str {
    match action {
        UploadAction::Created => "OK",
        UploadAction::Updated => "UPDATED",
        UploadAction::Resumed => "RESUMED",
        UploadAction::AlreadyUploaded => "ALREADY UPLOADED",
        UploadAction::Skipped => "SKIPPED",
    }
}

fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_CONFIG_NAME))
}

/// Resolve upload arguments to a sorted, de-duplicated list of files.
///
/// Each argument is brace-expanded, then globbed; a pattern without glob
/// matches is taken as a literal path.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        for pattern in expand_braces(input) {
            let before = files.len();
            let matches = glob(&pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            files.extend(matches.filter_map(|r| r.ok()).filter(|p| p.is_file()));

            if files.len() == before {
                let path = Path::new(&pattern);
                if path.is_file() {
                    files.push(path.to_path_buf());
                } else {
                    eprintln!("Warning: No files matched pattern: {}", pattern);
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand the first top-level `{a,b}` group, recursing into the results.
///
/// Nested groups such as `{x,y{1,2}}` are honoured; unbalanced braces are
/// left as they are.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = find_group(pattern) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    split_top_level(&pattern[open + 1..close])
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{}{}{}", prefix, alt, suffix)))
        .collect()
}

/// Byte offsets of the first balanced brace group containing a comma.
fn find_group(pattern: &str) -> Option<(usize, usize)> {
    let mut start = 0;
    while let Some(rel) = pattern[start..].find('{') {
        let open = start + rel;
        let mut depth = 0;
        let mut has_comma = false;
        for (i, c) in pattern[open..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        if has_comma {
                            return Some((open, open + i));
                        }
                        break;
                    }
                }
                ',' if depth == 1 => has_comma = true,
                _ => {}
            }
        }
        start = open + 1;
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut last = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&body[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[last..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("log_{a,b}.txt"), vec!["log_a.txt", "log_b.txt"]);
        assert_eq!(expand_braces("*.mkv"), vec!["*.mkv"]);
        assert_eq!(
            expand_braces("{x,y}{1,2}"),
            vec!["x1", "x2", "y1", "y2"]
        );
    }

    #[test]
    fn test_expand_braces_nested_and_unbalanced() {
        assert_eq!(expand_braces("{a,b{1,2}}.c"), vec!["a.c", "b1.c", "b2.c"]);
        assert_eq!(expand_braces("file{.txt"), vec!["file{.txt"]);
        assert_eq!(expand_braces("{single}.txt"), vec!["{single}.txt"]);
    }

    #[test]
    fn test_expand_inputs_dedups_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.txt", "a.txt", "c.log"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let base = dir.path().display();

        let files = expand_inputs(&[
            format!("{}/*.txt", base),
            format!("{}/{{a,c}}.*", base),
            format!("{}/missing.bin", base),
        ])
        .unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.log"]);
    }

    #[test]
    fn test_job_selection() {
        let cli = Cli::parse_from(["gupload", "a.txt"]);
        assert_eq!(cli.job(), Job::Create);
        assert_eq!(cli.share_target(), None);

        let cli = Cli::parse_from(["gupload", "a.txt", "-d", "--check-mode", "md5", "--share"]);
        assert_eq!(cli.job(), Job::Update);
        assert_eq!(cli.check_mode, Some(CheckMode::Md5));
        assert_eq!(cli.share_target(), Some(None));

        let cli = Cli::parse_from(["gupload", "--share=me@example.com", "--share-role", "writer", "a.txt"]);
        assert_eq!(cli.share_target(), Some(Some("me@example.com")));
        assert_eq!(cli.share_role, Role::Writer);
    }
}
