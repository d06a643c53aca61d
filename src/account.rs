//! Named accounts layered on the config store.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, Field, DEFAULT_ACCOUNT_KEY};
use crate::credentials::CredentialManager;
use crate::error::{GuploadError, Result};
use crate::prompt::Prompt;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid account name regex"));

static CLIENT_ID_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ACCOUNT_([A-Za-z0-9_]+)_CLIENT_ID$").expect("Invalid client id key regex")
});

/// Fields that must all be present for an account to count as configured.
const CORE_FIELDS: [Field; 3] = [Field::ClientId, Field::ClientSecret, Field::RefreshToken];

/// Name given to an account migrated from the legacy layout.
const MIGRATED_ACCOUNT_BASE: &str = "default";

pub fn is_valid_account_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

/// Configured accounts, numbered from 1 in the order they appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountList {
    names: Vec<String>,
}

impl AccountList {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Account at a 1-based menu index.
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// `(index, name)` pairs, indices starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i + 1, name.as_str()))
    }
}

/// Enumerates, creates, deletes and selects accounts.
pub struct AccountRegistry {
    store: ConfigStore,
}

impl AccountRegistry {
    /// Wrap `store`, first migrating a legacy single-account layout if one is
    /// present.
    pub fn new(store: ConfigStore) -> Result<Self> {
        let mut registry = Self { store };
        registry.migrate_legacy_config()?;
        Ok(registry)
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn list_accounts(&self) -> AccountList {
        let mut names: Vec<String> = Vec::new();
        for key in self.store.keys() {
            let Some(caps) = CLIENT_ID_KEY_REGEX.captures(key) else {
                continue;
            };
            let name = &caps[1];
            if !names.iter().any(|n| n == name) && self.account_exists(name) {
                names.push(name.to_string());
            }
        }
        AccountList { names }
    }

    /// Valid name and all core credentials present.
    pub fn account_exists(&self, name: &str) -> bool {
        is_valid_account_name(name)
            && CORE_FIELDS
                .iter()
                .all(|field| self.store.field(name, *field).is_some())
    }

    /// The configured default account name, whether valid or not.
    pub fn default_account(&self) -> Option<&str> {
        self.store
            .get(DEFAULT_ACCOUNT_KEY)
            .filter(|name| !name.is_empty())
    }

    /// Create an account: pick its name, then set up and store its
    /// credentials. The account exists once this returns.
    pub async fn create_account(
        &mut self,
        proposed: Option<&str>,
        prompt: &mut dyn Prompt,
        credentials: &CredentialManager,
    ) -> Result<String> {
        let name = self.pick_account_name(proposed, prompt)?;
        credentials
            .ensure_credentials(&mut self.store, &name, prompt)
            .await?;
        info!(account = %name, "created account");
        Ok(name)
    }

    /// Pick a name for a new account without storing anything.
    ///
    /// A rejected `proposed` name is reported and asked for again when a
    /// terminal is available; without one the rejection is returned.
    pub fn pick_account_name(&self, proposed: Option<&str>, prompt: &mut dyn Prompt) -> Result<String> {
        let mut candidate = proposed.map(str::to_string);

        loop {
            let name = match candidate.take() {
                Some(name) => name,
                None => {
                    if !prompt.is_interactive() {
                        return Err(GuploadError::NonInteractive("new account name".to_string()));
                    }
                    prompt
                        .ask("Name for the new account (letters, digits, underscores): ")?
                        .ok_or_else(|| GuploadError::NonInteractive("new account name".to_string()))?
                }
            };

            match self.check_new_name(name.trim()) {
                Ok(()) => {
                    return Ok(name.trim().to_string());
                }
                Err(err) if err.is_reprompt() && prompt.is_interactive() => {
                    prompt.say(&err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if !is_valid_account_name(name) {
            return Err(GuploadError::InvalidName(name.to_string()));
        }
        if self.account_exists(name) {
            return Err(GuploadError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Remove every key of `name`, and the default pointer if it names it.
    pub fn delete_account(&mut self, name: &str) -> Result<()> {
        if !self.account_exists(name) {
            return Err(GuploadError::NotFound(name.to_string()));
        }

        let keys: Vec<String> = Field::ALL.iter().map(|f| f.scoped_key(name)).collect();
        self.store.remove_where(|key, value| {
            keys.iter().any(|k| k == key) || (key == DEFAULT_ACCOUNT_KEY && value == name)
        })?;
        info!(account = name, "deleted account");
        Ok(())
    }

    /// Move a legacy unscoped credential set into a new named account.
    ///
    /// Runs only when client id, client secret and refresh token are all
    /// present without a prefix. The account is called `default`, or
    /// `default1`, `default2`, ... when that name is taken.
    pub fn migrate_legacy_config(&mut self) -> Result<Option<String>> {
        if !CORE_FIELDS
            .iter()
            .all(|field| self.store.legacy_field(*field).is_some())
        {
            return Ok(None);
        }

        let mut name = MIGRATED_ACCOUNT_BASE.to_string();
        let mut suffix = 0;
        while self.name_in_use(&name) {
            suffix += 1;
            name = format!("{}{}", MIGRATED_ACCOUNT_BASE, suffix);
        }

        let legacy: Vec<(Field, Option<String>)> = Field::ALL
            .iter()
            .map(|field| (*field, self.store.legacy_field(*field).map(str::to_string)))
            .collect();

        self.store.edit(|edit| {
            for (field, value) in &legacy {
                if let Some(value) = value {
                    edit.set_field(&name, *field, value);
                }
                edit.remove(field.suffix());
            }
        })?;
        info!(account = %name, "migrated legacy config to named account");
        Ok(Some(name))
    }

    fn name_in_use(&self, name: &str) -> bool {
        Field::ALL
            .iter()
            .any(|field| self.store.get(&field.scoped_key(name)).is_some())
    }

    /// Decide which account this run uses.
    ///
    /// Order of precedence: the explicitly requested account, a valid
    /// configured default, the only account, a menu choice (interactive) or
    /// the first account (non-interactive). With no accounts at all a new one
    /// is created and its credentials set up. The result becomes the default
    /// unless a valid default already existed.
    pub async fn select_default_account(
        &mut self,
        explicit: Option<&str>,
        prompt: &mut dyn Prompt,
        credentials: &CredentialManager,
    ) -> Result<String> {
        let valid_default = match self.default_account().map(str::to_string) {
            Some(name) if self.account_exists(&name) => Some(name),
            Some(name) => {
                warn!(account = %name, "default account is not configured, clearing it");
                self.store.remove(DEFAULT_ACCOUNT_KEY)?;
                None
            }
            None => None,
        };

        let selected = if let Some(name) = explicit {
            if !self.account_exists(name) {
                return Err(GuploadError::NoSuchAccount(name.to_string()));
            }
            name.to_string()
        } else if let Some(name) = &valid_default {
            debug!(account = %name, "using default account");
            return Ok(name.clone());
        } else {
            self.choose_account(prompt, credentials).await?
        };

        if valid_default.is_none() {
            self.store.set(DEFAULT_ACCOUNT_KEY, &selected)?;
            debug!(account = %selected, "saved default account");
        }
        Ok(selected)
    }

    async fn choose_account(
        &mut self,
        prompt: &mut dyn Prompt,
        credentials: &CredentialManager,
    ) -> Result<String> {
        let accounts = self.list_accounts();

        match accounts.len() {
            0 => {
                info!("no accounts configured, creating one");
                self.create_account(None, prompt, credentials).await
            }
            1 => Ok(accounts.names[0].clone()),
            count if prompt.is_interactive() => {
                let menu: Vec<String> = accounts
                    .iter()
                    .map(|(index, name)| format!("{}. {}", index, name))
                    .collect();
                prompt.say(&format!("Select an account:\n{}", menu.join("\n")));
                loop {
                    let answer = prompt
                        .ask(&format!("Account number (1-{}): ", count))?
                        .ok_or_else(|| GuploadError::NonInteractive("account choice".to_string()))?;
                    let choice = answer.trim().parse::<usize>().ok();
                    if let Some(name) = choice.and_then(|i| accounts.get(i)) {
                        return Ok(name.to_string());
                    }
                    prompt.say(&format!("Invalid choice '{}'.", answer.trim()));
                }
            }
            count => {
                let first = accounts.names[0].clone();
                warn!(accounts = count, account = %first, "several accounts and no terminal, using the first one");
                Ok(first)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoints;
    use crate::prompt::ScriptedPrompt;
    use tempfile::TempDir;

    const CLIENT_ID: &str = "123456789012-abcdefghijklmnopqrstuvwxyz012345.apps.googleusercontent.com";

    fn write_config(dir: &TempDir, content: &str) -> ConfigStore {
        let path = dir.path().join("gupload.conf");
        std::fs::write(&path, content).unwrap();
        ConfigStore::open(path).unwrap()
    }

    fn account_lines(name: &str) -> String {
        format!(
            "ACCOUNT_{n}_CLIENT_ID=\"{id}\"\nACCOUNT_{n}_CLIENT_SECRET=\"secret\"\nACCOUNT_{n}_REFRESH_TOKEN=\"1//token\"\n",
            n = name,
            id = CLIENT_ID
        )
    }

    fn unreachable_credentials() -> CredentialManager {
        CredentialManager::new(Endpoints::with_base("http://127.0.0.1:9"))
    }

    #[test]
    fn test_account_names() {
        assert!(is_valid_account_name("work_2"));
        assert!(!is_valid_account_name("my account"));
        assert!(!is_valid_account_name("a-b"));
        assert!(!is_valid_account_name(""));
    }

    #[test]
    fn test_list_skips_incomplete_accounts() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}ACCOUNT_partial_CLIENT_ID=\"x\"\n{}",
            account_lines("work"),
            account_lines("my_home")
        );
        let registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();

        let accounts = registry.list_accounts();
        let listed: Vec<(usize, &str)> = accounts.iter().collect();
        assert_eq!(listed, vec![(1, "work"), (2, "my_home")]);
        assert_eq!(accounts.get(2), Some("my_home"));
        assert_eq!(accounts.get(0), None);
        assert!(!registry.account_exists("partial"));
    }

    #[test]
    fn test_no_accounts_is_empty_list() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(write_config(&dir, "")).unwrap();
        assert!(registry.list_accounts().is_empty());
    }

    #[test]
    fn test_delete_removes_keys_and_default_pointer() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}{}ACCOUNT_work_ROOT_FOLDER=\"f\"\nDEFAULT_ACCOUNT=\"work\"\n",
            account_lines("work"),
            account_lines("work_2")
        );
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();

        registry.delete_account("work").unwrap();
        assert!(!registry.account_exists("work"));
        assert!(registry.account_exists("work_2"));
        assert_eq!(registry.default_account(), None);
        assert_eq!(registry.store().field("work", Field::RootFolder), None);
        assert_eq!(registry.store().field("work_2", Field::ClientSecret), Some("secret"));

        let err = registry.delete_account("work").unwrap_err();
        assert!(matches!(err, GuploadError::NotFound(_)));
    }

    #[test]
    fn test_legacy_migration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}CLIENT_ID=\"{}\"\nCLIENT_SECRET=\"s\"\nREFRESH_TOKEN=\"1//r\"\nROOT_FOLDER=\"root_id\"\nROOT_FOLDER_NAME=\"My Drive\"\n",
            account_lines("default"),
            CLIENT_ID
        );
        let store = write_config(&dir, &content);
        let path = store.path().to_path_buf();

        let mut registry = AccountRegistry::new(store).unwrap();
        assert!(registry.account_exists("default1"));
        assert_eq!(registry.store().field("default1", Field::RootFolder), Some("root_id"));
        assert_eq!(registry.store().field("default1", Field::RootFolderName), Some("My Drive"));
        assert_eq!(registry.store().get("CLIENT_ID"), None);
        assert_eq!(registry.migrate_legacy_config().unwrap(), None);

        let reopened = AccountRegistry::new(ConfigStore::open(&path).unwrap()).unwrap();
        assert_eq!(reopened.list_accounts().len(), 2);
        assert!(!reopened.account_exists("default2"));
    }

    #[test]
    fn test_partial_legacy_config_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let mut registry =
            AccountRegistry::new(write_config(&dir, "CLIENT_ID=\"x\"\nCLIENT_SECRET=\"y\"\n")).unwrap();
        assert_eq!(registry.migrate_legacy_config().unwrap(), None);
        assert_eq!(registry.store().get("CLIENT_ID"), Some("x"));
    }

    #[test]
    fn test_name_rejected_without_terminal() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(write_config(&dir, &account_lines("work"))).unwrap();
        let mut prompt = ScriptedPrompt::non_interactive();

        assert!(matches!(
            registry.pick_account_name(Some("bad name"), &mut prompt),
            Err(GuploadError::InvalidName(_))
        ));
        assert!(matches!(
            registry.pick_account_name(Some("work"), &mut prompt),
            Err(GuploadError::DuplicateName(_))
        ));
        assert!(matches!(
            registry.pick_account_name(None, &mut prompt),
            Err(GuploadError::NonInteractive(_))
        ));
        assert_eq!(registry.pick_account_name(Some("fresh"), &mut prompt).unwrap(), "fresh");
    }

    #[test]
    fn test_name_asked_again_after_rejection() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(write_config(&dir, &account_lines("work"))).unwrap();
        let mut prompt = ScriptedPrompt::new(["bad-name", "work", "good_one"]);

        let name = registry.pick_account_name(Some("also bad"), &mut prompt).unwrap();
        assert_eq!(name, "good_one");
        assert_eq!(prompt.remaining(), 0);
    }

    #[tokio::test]
    async fn test_select_explicit_account() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}{}", account_lines("a"), account_lines("b"));
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();
        let mut prompt = ScriptedPrompt::non_interactive();
        let credentials = unreachable_credentials();

        let err = registry
            .select_default_account(Some("missing"), &mut prompt, &credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, GuploadError::NoSuchAccount(_)));

        let name = registry
            .select_default_account(Some("b"), &mut prompt, &credentials)
            .await
            .unwrap();
        assert_eq!(name, "b");
        assert_eq!(registry.default_account(), Some("b"));
    }

    #[tokio::test]
    async fn test_select_keeps_valid_default() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}{}DEFAULT_ACCOUNT=\"b\"\n", account_lines("a"), account_lines("b"));
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();
        let mut prompt = ScriptedPrompt::non_interactive();
        let credentials = unreachable_credentials();

        let name = registry
            .select_default_account(None, &mut prompt, &credentials)
            .await
            .unwrap();
        assert_eq!(name, "b");

        registry
            .select_default_account(Some("a"), &mut prompt, &credentials)
            .await
            .unwrap();
        assert_eq!(registry.default_account(), Some("b"));
    }

    #[tokio::test]
    async fn test_select_clears_invalid_default_and_uses_single_account() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}DEFAULT_ACCOUNT=\"gone\"\n", account_lines("only"));
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();
        let mut prompt = ScriptedPrompt::non_interactive();

        let name = registry
            .select_default_account(None, &mut prompt, &unreachable_credentials())
            .await
            .unwrap();
        assert_eq!(name, "only");
        assert_eq!(registry.default_account(), Some("only"));
    }

    #[tokio::test]
    async fn test_select_from_menu_asks_again_when_out_of_range() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}{}", account_lines("a"), account_lines("b"));
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();
        let mut prompt = ScriptedPrompt::new(["7", "zero", "2"]);

        let name = registry
            .select_default_account(None, &mut prompt, &unreachable_credentials())
            .await
            .unwrap();
        assert_eq!(name, "b");
        assert_eq!(registry.default_account(), Some("b"));
    }

    #[tokio::test]
    async fn test_select_first_account_without_terminal() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}{}", account_lines("a"), account_lines("b"));
        let mut registry = AccountRegistry::new(write_config(&dir, &content)).unwrap();
        let mut prompt = ScriptedPrompt::non_interactive();

        let name = registry
            .select_default_account(None, &mut prompt, &unreachable_credentials())
            .await
            .unwrap();
        assert_eq!(name, "a");
    }
}
