//! Tests for accounts and OAuth credentials against a mocked token endpoint.

use gupload::config::DEFAULT_ACCOUNT_KEY;
use gupload::token::unix_now;
use gupload::{
    AccountRegistry, ConfigStore, CredentialManager, Endpoints, Field, GuploadError, RefreshGrant,
    ScriptedPrompt,
};
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::TempDir;

const CLIENT_ID: &str = "123456789012-abcdefghijklmnopqrstuvwxyz012345.apps.googleusercontent.com";

fn write_store(dir: &TempDir, content: &str) -> ConfigStore {
    let path = dir.path().join("googledrive.conf");
    std::fs::write(&path, content).unwrap();
    ConfigStore::open(path).unwrap()
}

fn account_lines(name: &str, token: &str, expiry: i64) -> String {
    format!(
        "ACCOUNT_{n}_CLIENT_ID=\"{id}\"\n\
         ACCOUNT_{n}_CLIENT_SECRET=\"secret\"\n\
         ACCOUNT_{n}_REFRESH_TOKEN=\"1//refresh\"\n\
         ACCOUNT_{n}_ACCESS_TOKEN=\"{token}\"\n\
         ACCOUNT_{n}_ACCESS_TOKEN_EXPIRY=\"{expiry}\"\n",
        n = name,
        id = CLIENT_ID,
        token = token,
        expiry = expiry
    )
}

fn grant() -> RefreshGrant {
    RefreshGrant {
        client_id: CLIENT_ID.to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "1//refresh".to_string(),
    }
}

mod access_token {
    use super::*;

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "1//refresh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "ya29.fresh", "expires_in": 3599}).to_string())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, &account_lines("work", "ya29.old", unix_now() - 1));
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));

        let before = unix_now();
        let token = credentials
            .check_access_token(&mut store, "work", &grant(), false, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.value(), "ya29.fresh");
        assert!(token.expires_at() >= before + 3598);
        assert_eq!(store.field("work", Field::AccessToken), Some("ya29.fresh"));

        let reopened = ConfigStore::open(store.path()).unwrap();
        assert_eq!(
            reopened.field("work", Field::AccessTokenExpiry),
            Some(token.expires_at().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_fresh_token_is_kept() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/token").expect(0).create_async().await;

        let dir = TempDir::new().unwrap();
        let expiry = unix_now() + 3600;
        let mut store = write_store(&dir, &account_lines("work", "ya29.current", expiry));
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));

        let token = credentials
            .check_access_token(&mut store, "work", &grant(), false, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.value(), "ya29.current");
        assert_eq!(token.expires_at(), expiry);
    }

    #[tokio::test]
    async fn test_force_refreshes_fresh_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(json!({"access_token": "ya29.forced", "expires_in": 3599}).to_string())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, &account_lines("work", "ya29.current", unix_now() + 3600));
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));

        let token = credentials
            .check_access_token(&mut store, "work", &grant(), true, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.value(), "ya29.forced");
    }

    #[tokio::test]
    async fn test_refresh_error_surfaces_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, &account_lines("work", "ya29.old", unix_now() - 10));
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));

        let err = credentials
            .check_access_token(&mut store, "work", &grant(), false, None)
            .await
            .unwrap_err();

        match err {
            GuploadError::Refresh(body) => assert!(body.contains("invalid_grant")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(store.field("work", Field::AccessToken), Some("ya29.old"));
    }
}

mod authorization {
    use super::*;

    fn code_exchange_body() -> String {
        json!({
            "access_token": "ya29.first",
            "refresh_token": "1//obtained",
            "expires_in": 3599,
            "token_type": "Bearer"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_code_flow_stores_refresh_and_access_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "4/pasted-code".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "urn:ietf:wg:oauth:2.0:oob".into()),
            ]))
            .with_status(200)
            .with_body(code_exchange_body())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, "");
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));
        let mut prompt = ScriptedPrompt::new([CLIENT_ID, "not a secret!", "secret_2", "bad code", "4/pasted-code"]);

        let creds = credentials
            .ensure_credentials(&mut store, "work", &mut prompt)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(prompt.remaining(), 0);
        assert_eq!(creds.grant.refresh_token, "1//obtained");
        assert_eq!(creds.token.value(), "ya29.first");
        assert_eq!(store.field("work", Field::ClientSecret), Some("secret_2"));
        assert_eq!(store.field("work", Field::RefreshToken), Some("1//obtained"));
        assert_eq!(store.field("work", Field::AccessToken), Some("ya29.first"));
        assert!(prompt
            .transcript()
            .iter()
            .any(|line| line.contains("response_type=code")));

        let registry = AccountRegistry::new(store).unwrap();
        assert!(registry.account_exists("work"));
    }

    #[tokio::test]
    async fn test_exchange_without_refresh_token_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, "");
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));
        let mut prompt = ScriptedPrompt::new([CLIENT_ID, "secret", "4/pasted-code"]);

        let err = credentials
            .ensure_credentials(&mut store, "work", &mut prompt)
            .await
            .unwrap_err();

        assert!(matches!(err, GuploadError::TokenExchange(ref body) if body.contains("invalid_grant")));
        assert_eq!(store.field("work", Field::RefreshToken), None);
    }

    #[tokio::test]
    async fn test_missing_credentials_without_terminal() {
        let dir = TempDir::new().unwrap();
        let mut store = write_store(&dir, "");
        let credentials = CredentialManager::new(Endpoints::with_base("http://127.0.0.1:9"));
        let mut prompt = ScriptedPrompt::non_interactive();

        let err = credentials
            .ensure_credentials(&mut store, "work", &mut prompt)
            .await
            .unwrap_err();
        assert!(matches!(err, GuploadError::NonInteractiveCredential(_)));
    }
}

mod registry {
    use super::*;

    #[tokio::test]
    async fn test_select_with_no_accounts_creates_one() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(
                json!({"access_token": "ya29.first", "refresh_token": "1//new", "expires_in": 3599})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut registry = AccountRegistry::new(write_store(&dir, "")).unwrap();
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));
        let mut prompt = ScriptedPrompt::new(["bad name", "personal", CLIENT_ID, "secret", "4/code"]);

        let selected = registry
            .select_default_account(None, &mut prompt, &credentials)
            .await
            .unwrap();

        assert_eq!(selected, "personal");
        assert_eq!(registry.list_accounts().len(), 1);
        assert!(registry.account_exists("personal"));
        assert_eq!(registry.store().get(DEFAULT_ACCOUNT_KEY), Some("personal"));
    }

    #[tokio::test]
    async fn test_explicit_unknown_account_is_rejected() {
        let dir = TempDir::new().unwrap();
        let content = account_lines("work", "ya29.t", unix_now() + 3600);
        let mut registry = AccountRegistry::new(write_store(&dir, &content)).unwrap();
        let credentials = CredentialManager::new(Endpoints::with_base("http://127.0.0.1:9"));

        let err = registry
            .select_default_account(Some("other"), &mut ScriptedPrompt::non_interactive(), &credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, GuploadError::NoSuchAccount(ref name) if name == "other"));
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".into(), "4/code".into()))
            .with_status(200)
            .with_body(
                json!({"access_token": "ya29.first", "refresh_token": "1//new", "expires_in": 3599})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let content = account_lines("work", "ya29.t", unix_now() + 3600);
        let mut registry = AccountRegistry::new(write_store(&dir, &content)).unwrap();
        let credentials = CredentialManager::new(Endpoints::with_base(&server.url()));
        let mut prompt = ScriptedPrompt::new([CLIENT_ID, "secret", "4/code"]);

        let name = registry
            .create_account(Some("fresh"), &mut prompt, &credentials)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(name, "fresh");
        assert!(registry.account_exists("fresh"));
        assert_eq!(registry.list_accounts().len(), 2);
        let reopened = AccountRegistry::new(ConfigStore::open(registry.store().path()).unwrap()).unwrap();
        assert!(reopened.account_exists("fresh"));

        registry.store_mut().set(DEFAULT_ACCOUNT_KEY, "fresh").unwrap();
        registry.delete_account("fresh").unwrap();
        assert!(!registry.account_exists("fresh"));
        assert!(registry.account_exists("work"));
        assert_eq!(registry.store().get(DEFAULT_ACCOUNT_KEY), None);
        assert!(matches!(
            registry.delete_account("fresh"),
            Err(GuploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_with_taken_name_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let content = account_lines("work", "ya29.t", unix_now() + 3600);
        let mut registry = AccountRegistry::new(write_store(&dir, &content)).unwrap();
        let credentials = CredentialManager::new(Endpoints::with_base("http://127.0.0.1:9"));

        let err = registry
            .create_account(Some("work"), &mut ScriptedPrompt::non_interactive(), &credentials)
            .await
            .unwrap_err();

        assert!(matches!(err, GuploadError::DuplicateName(_)));
        assert_eq!(registry.list_accounts().len(), 1);
    }

    #[test]
    fn test_legacy_migration_runs_once() {
        let dir = TempDir::new().unwrap();
        let legacy = format!(
            "CLIENT_ID=\"{}\"\nCLIENT_SECRET=\"secret\"\nREFRESH_TOKEN=\"1//legacy\"\nROOT_FOLDER=\"abc\"\n",
            CLIENT_ID
        );
        let store = write_store(&dir, &legacy);
        let path = store.path().to_path_buf();

        let registry = AccountRegistry::new(store).unwrap();
        assert!(registry.account_exists("default"));
        assert_eq!(registry.store().field("default", Field::RootFolder), Some("abc"));
        assert_eq!(registry.store().get("CLIENT_ID"), None);

        let registry = AccountRegistry::new(ConfigStore::open(&path).unwrap()).unwrap();
        assert_eq!(registry.list_accounts().len(), 1);
        assert!(!registry.account_exists("default1"));
    }
}
