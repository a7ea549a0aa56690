// auth.rs — Cached OAuth token handling for the Gmail API.
//
// The consent flow itself happens outside this tool. We only:
// - load the cached token file,
// - refresh it with the refresh-token grant when it has expired,
// - write the refreshed token back so the next run can reuse it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{PipelineError, Result};

/// Cached token, stored as JSON next to the client secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry in epoch seconds; `None` means unknown and is treated as expired.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl CachedToken {
    pub fn is_valid_at(&self, now_secs: i64) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .is_some_and(|exp| exp - config::gmail::TOKEN_EXPIRY_SKEW_SECS > now_secs)
    }
}

/// Google "installed app" client secrets (the `credentials.json` download).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

pub struct CredentialStore {
    credentials_path: PathBuf,
    token_path: PathBuf,
}

impl CredentialStore {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
        }
    }

    /// Return a usable access token or fail; never prompts.
    pub fn access_token(&self) -> Result<String> {
        if !self.token_path.exists() && !self.credentials_path.exists() {
            return Err(PipelineError::Configuration(format!(
                "credentials file not found at {} (and no cached token at {})",
                self.credentials_path.display(),
                self.token_path.display()
            )));
        }

        let Some(token) = self.load_token()? else {
            return Err(PipelineError::Authentication(format!(
                "no cached token at {}; complete the consent flow for scope {} and save the token there",
                self.token_path.display(),
                config::gmail::SCOPE_READONLY
            )));
        };

        if token.is_valid_at(Utc::now().timestamp()) {
            log::debug!("Using cached access token from {}", self.token_path.display());
            return Ok(token.access_token);
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(PipelineError::Authentication(
                "cached token expired and has no refresh token; re-consent required".to_string(),
            ));
        };

        log::info!("Access token expired, refreshing");
        let secrets = self.load_client_secrets()?;
        let refreshed = refresh(&secrets, &refresh_token)?;
        let updated = CachedToken {
            access_token: refreshed.access_token,
            // Google usually omits the refresh token on refresh; keep the old one.
            refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
            expires_at: refreshed.expires_in.map(|s| Utc::now().timestamp() + s),
            scope: refreshed.scope.or(token.scope),
        };
        self.save_token(&updated)?;
        Ok(updated.access_token)
    }

    fn load_token(&self) -> Result<Option<CachedToken>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let path = self.token_path.display();
        let raw = std::fs::read_to_string(&self.token_path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read token file {path}: {e}"))
        })?;
        let token = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Authentication(format!("token file {path} is not valid: {e}"))
        })?;
        Ok(Some(token))
    }

    fn save_token(&self, token: &CachedToken) -> Result<()> {
        write_json_atomic(&self.token_path, token).map_err(|e| {
            let path = self.token_path.display();
            PipelineError::Authentication(format!("cannot save token to {path}: {e}"))
        })?;
        log::info!("Saved refreshed token to {}", self.token_path.display());
        Ok(())
    }

    fn load_client_secrets(&self) -> Result<ClientSecrets> {
        if !self.credentials_path.exists() {
            return Err(PipelineError::Configuration(format!(
                "credentials file not found at {}",
                self.credentials_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.credentials_path).map_err(|e| {
            let path = self.credentials_path.display();
            PipelineError::Configuration(format!("cannot read {path}: {e}"))
        })?;
        parse_client_secrets(&raw)
    }
}

fn parse_client_secrets(raw: &str) -> Result<ClientSecrets> {
    let file: ClientSecretsFile = serde_json::from_str(raw)
        .map_err(|e| PipelineError::Configuration(format!("invalid credentials file: {e}")))?;
    file.installed.or(file.web).ok_or_else(|| {
        PipelineError::Configuration("credentials file has no 'installed' or 'web' client".to_string())
    })
}

fn refresh(secrets: &ClientSecrets, refresh_token: &str) -> Result<RefreshResponse> {
    let token_uri = secrets.token_uri.as_deref().unwrap_or(config::gmail::DEFAULT_TOKEN_URI);
    let resp = ureq::post(token_uri)
        .timeout(std::time::Duration::from_secs(config::http::REQUEST_TIMEOUT_SECS))
        .send_form(&[
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

    let body = match resp {
        Ok(r) => r.into_string().map_err(|e| {
            PipelineError::Authentication(format!("failed reading token response: {e}"))
        })?,
        Err(ureq::Error::Status(code, r)) => {
            let detail = r.into_string().unwrap_or_default();
            return Err(PipelineError::Authentication(format!(
                "token refresh rejected (HTTP {code}): {detail}; re-consent required"
            )));
        }
        Err(e) => return Err(PipelineError::Authentication(format!("token refresh failed: {e}"))),
    };

    serde_json::from_str(&body)
        .map_err(|e| PipelineError::Authentication(format!("invalid token response: {e}")))
}

fn write_json_atomic<T: Serialize>(dest: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = dest.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity() {
        let mut token = CachedToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: Some(1_000),
            scope: None,
        };
        assert!(token.is_valid_at(100));
        // Inside the skew window counts as expired.
        assert!(!token.is_valid_at(1_000 - config::gmail::TOKEN_EXPIRY_SKEW_SECS));
        token.expires_at = None;
        assert!(!token.is_valid_at(0));
    }

    #[test]
    fn test_parse_client_secrets() {
        let raw = r#"{"installed":{"client_id":"id","client_secret":"s","token_uri":"https://t"}}"#;
        let secrets = parse_client_secrets(raw).unwrap();
        assert_eq!(secrets.client_id, "id");
        assert_eq!(secrets.token_uri.as_deref(), Some("https://t"));

        assert!(matches!(parse_client_secrets("{}"), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_missing_files_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        );
        assert!(matches!(store.access_token(), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_no_token_is_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let creds = dir.path().join("credentials.json");
        std::fs::write(&creds, r#"{"installed":{"client_id":"id","client_secret":"s"}}"#).unwrap();
        let store = CredentialStore::new(&creds, dir.path().join("token.json"));
        assert!(matches!(store.access_token(), Err(PipelineError::Authentication(_))));
    }

    #[test]
    fn test_valid_cached_token_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let token = CachedToken {
            access_token: "live".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Some(Utc::now().timestamp() + 3600),
            scope: Some(config::gmail::SCOPE_READONLY.to_string()),
        };
        write_json_atomic(&token_path, &token).unwrap();

        let store = CredentialStore::new(dir.path().join("credentials.json"), &token_path);
        assert_eq!(store.access_token().unwrap(), "live");
    }

    #[test]
    fn test_expired_token_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        std::fs::write(&token_path, r#"{"access_token":"old","expires_at":1}"#).unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"), &token_path);
        assert!(matches!(store.access_token(), Err(PipelineError::Authentication(_))));
    }

    fn saved_token(dir: &Path) -> CachedToken {
        serde_json::from_str(&std::fs::read_to_string(dir.join("token.json")).unwrap()).unwrap()
    }

    fn expired_setup(dir: &Path, token_uri: &str) -> CredentialStore {
        let creds = dir.join("credentials.json");
        let secrets = serde_json::json!({
            "installed": {"client_id": "cid", "client_secret": "csecret", "token_uri": token_uri}
        });
        std::fs::write(&creds, secrets.to_string()).unwrap();

        let token_path = dir.join("token.json");
        let token = CachedToken {
            access_token: "stale".to_string(),
            refresh_token: Some("keep-me".to_string()),
            expires_at: Some(1),
            scope: Some(config::gmail::SCOPE_READONLY.to_string()),
        };
        write_json_atomic(&token_path, &token).unwrap();
        CredentialStore::new(creds, token_path)
    }

    #[test]
    fn test_expired_token_is_refreshed_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) =
            crate::mail::testing::serve_once(200, r#"{"access_token":"fresh","expires_in":3600}"#);
        let store = expired_setup(dir.path(), &format!("{url}/token"));

        assert_eq!(store.access_token().unwrap(), "fresh");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /token"));
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=keep-me"));
        assert!(request.contains("client_id=cid"));

        let saved = saved_token(dir.path());
        assert_eq!(saved.access_token, "fresh");
        // The response omitted a refresh token, so the old one is kept.
        assert_eq!(saved.refresh_token.as_deref(), Some("keep-me"));
        assert!(saved.is_valid_at(Utc::now().timestamp()));
        assert_eq!(saved.scope.as_deref(), Some(config::gmail::SCOPE_READONLY));
    }

    #[test]
    fn test_new_refresh_token_replaces_old() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = crate::mail::testing::serve_once(
            200,
            r#"{"access_token":"fresh","expires_in":60,"refresh_token":"rotated"}"#,
        );
        let store = expired_setup(dir.path(), &url);

        store.access_token().unwrap();
        server.join().unwrap();

        let saved = saved_token(dir.path());
        assert_eq!(saved.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_rejected_refresh_is_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = crate::mail::testing::serve_once(400, r#"{"error":"invalid_grant"}"#);
        let store = expired_setup(dir.path(), &url);

        let err = store.access_token().err().unwrap();
        server.join().unwrap();
        assert!(matches!(err, PipelineError::Authentication(msg) if msg.contains("invalid_grant")));

        // The stale token stays on disk untouched.
        let saved = saved_token(dir.path());
        assert_eq!(saved.access_token, "stale");
    }
}
