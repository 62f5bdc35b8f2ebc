//! OAuth 2.0 for the Google backend.
//!
//! The consent flow is the "installed application" one: `/login` hands out
//! the consent URL, Google redirects back to `/redirect?code=..`, and the
//! exchanged token is stored next to the credentials file. Every request
//! reads the token from disk and refreshes it when it has expired.
//!
//! All calls block; run them off the async reactor.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use reqwest::blocking::Client;
use rowsheet_common::RowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const STATE_TOKEN: &str = "state-token";

/// Tokens this close to expiry are refreshed early.
const EXPIRY_DELTA_SECS: i64 = 10;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot read {}: {source}", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credentials: {0}")]
    BadCredentials(String),
    #[error("no token at {}: {source}", path.display())]
    NoToken {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed token file: {0}")]
    BadToken(#[from] serde_json::Error),
    #[error("cannot write {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token endpoint: {0}")]
    Exchange(String),
}

impl From<AuthError> for RowError {
    fn from(err: AuthError) -> Self {
        RowError::auth(err.to_string())
    }
}

/// One client section of `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: CredentialsFile =
            serde_json::from_str(json).map_err(|e| AuthError::BadCredentials(e.to_string()))?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::BadCredentials("expected an `installed` or `web` client".to_string())
        })
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris.first().map(String::as_str).unwrap_or("")
    }

    /// Consent page URL asking for offline access to spreadsheets.
    pub fn auth_url(&self) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("access_type", "offline"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", SHEETS_SCOPE),
                ("state", STATE_TOKEN),
            ],
        )
        .map_err(|e| AuthError::BadCredentials(format!("auth_uri: {e}")))?;
        Ok(url.into())
    }
}

/// The token file, in the layout Go's `oauth2.Token` uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// A zero or missing expiry never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .filter(|e| e.timestamp() > 0)
            .is_some_and(|e| e <= now + TimeDelta::seconds(EXPIRY_DELTA_SECS))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + TimeDelta::seconds(secs)),
        }
    }
}

/// Reads credentials, stores and refreshes the token.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    credentials_path: PathBuf,
    token_path: PathBuf,
}

impl TokenProvider {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn client(&self) -> Result<OAuthClient, AuthError> {
        let json =
            fs::read_to_string(&self.credentials_path).map_err(|source| AuthError::Credentials {
                path: self.credentials_path.clone(),
                source,
            })?;
        OAuthClient::from_json(&json)
    }

    pub fn auth_url(&self) -> Result<String, AuthError> {
        self.client()?.auth_url()
    }

    /// Trade an authorization code for a token and store it.
    pub fn exchange(&self, code: &str) -> Result<StoredToken, AuthError> {
        let client = self.client()?;
        let token = request_token(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", client.redirect_uri()),
            ],
        )?
        .into_token(None);
        self.save(&token)?;
        Ok(token)
    }

    /// A usable access token, refreshed first when the stored one expired.
    /// The file is rewritten only when the refresh produced a new token.
    pub fn access_token(&self) -> Result<String, AuthError> {
        let stored = self.load()?;
        if !stored.is_expired(Utc::now()) {
            return Ok(stored.access_token);
        }
        let Some(refresh) = stored.refresh_token.clone() else {
            return Err(AuthError::Exchange(
                "token expired and has no refresh token".to_string(),
            ));
        };
        let client = self.client()?;
        let fresh = request_token(
            &client.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
            ],
        )?
        .into_token(Some(refresh));
        if fresh.access_token != stored.access_token {
            self.save(&fresh)?;
        }
        tracing::debug!(path = %self.token_path.display(), "refreshed access token");
        Ok(fresh.access_token)
    }

    pub fn load(&self) -> Result<StoredToken, AuthError> {
        let json = fs::read_to_string(&self.token_path).map_err(|source| AuthError::NoToken {
            path: self.token_path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let json = serde_json::to_string(token)?;
        let store_err = |source| AuthError::Store {
            path: self.token_path.clone(),
            source,
        };
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.token_path).map_err(store_err)?;
        file.write_all(json.as_bytes()).map_err(store_err)?;
        Ok(())
    }

    /// Forget the stored token. There must be one.
    pub fn logout(&self) -> Result<(), AuthError> {
        fs::remove_file(&self.token_path).map_err(|source| AuthError::NoToken {
            path: self.token_path.clone(),
            source,
        })
    }
}

fn request_token(token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
    let response = Client::new()
        .post(token_uri)
        .form(form)
        .send()
        .map_err(|e| AuthError::Exchange(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| AuthError::Exchange(e.to_string()))?;
    if !status.is_success() {
        let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) => match err.error_description {
                Some(description) => format!("{}: {description}", err.error),
                None => err.error,
            },
            Err(_) => format!("status {status}"),
        };
        return Err(AuthError::Exchange(message));
    }
    serde_json::from_str(&body).map_err(|e| AuthError::Exchange(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIALS: &str = r#"{"installed":{
        "client_id":"abc.apps.googleusercontent.com",
        "client_secret":"s3cret",
        "auth_uri":"https://accounts.google.com/o/oauth2/auth",
        "token_uri":"https://oauth2.googleapis.com/token",
        "redirect_uris":["http://localhost:8080/redirect"]}}"#;

    #[test]
    fn consent_url_carries_scope_state_and_offline_access() {
        let url = OAuthClient::from_json(CREDENTIALS).unwrap().auth_url().unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(params.contains(&("scope".into(), SHEETS_SCOPE.into())));
        assert!(params.contains(&("state".into(), "state-token".into())));
        assert!(params.contains(&("access_type".into(), "offline".into())));
        assert!(params.contains(&("redirect_uri".into(), "http://localhost:8080/redirect".into())));
    }

    #[test]
    fn web_section_is_accepted_and_empty_file_is_not() {
        let web = CREDENTIALS.replace("installed", "web");
        assert!(OAuthClient::from_json(&web).is_ok());
        assert!(matches!(
            OAuthClient::from_json("{}"),
            Err(AuthError::BadCredentials(_))
        ));
    }

    #[test]
    fn token_file_roundtrip_and_logout() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TokenProvider::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        );
        assert!(matches!(provider.access_token(), Err(AuthError::NoToken { .. })));

        let token = StoredToken {
            access_token: "ya29.a0".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("1//0g".into()),
            expiry: Some(Utc::now() + TimeDelta::hours(1)),
        };
        provider.save(&token).unwrap();
        assert_eq!(provider.load().unwrap(), token);
        assert_eq!(provider.access_token().unwrap(), "ya29.a0");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(provider.token_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        provider.logout().unwrap();
        assert!(matches!(provider.logout(), Err(AuthError::NoToken { .. })));
    }

    #[test]
    fn expiry_rules() {
        let now = Utc::now();
        let token = |expiry| StoredToken {
            access_token: "t".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry,
        };
        assert!(!token(None).is_expired(now));
        assert!(!token(Some(now + TimeDelta::minutes(5))).is_expired(now));
        assert!(token(Some(now + TimeDelta::seconds(5))).is_expired(now));
        assert!(token(Some(now - TimeDelta::hours(1))).is_expired(now));
        let zero: DateTime<Utc> = "0001-01-01T00:00:00Z".parse().unwrap();
        assert!(!token(Some(zero)).is_expired(now));
    }

    #[test]
    fn go_style_token_file_parses() {
        let json = r#"{"access_token":"a","token_type":"Bearer","refresh_token":"r","expiry":"2024-03-01T10:00:00.123456+01:00"}"#;
        let token: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.expiry.unwrap().to_rfc3339(), "2024-03-01T09:00:00.123456+00:00");
    }
}
