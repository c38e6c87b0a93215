//! Gmail OAuth2 tokens for a task
//!
//! Tokens live in `<tokens_directory>/gmail-tokens.json`. A run reuses the
//! cached access token while it is fresh, refreshes it when it is not, and
//! only falls back to the interactive installed-app flow (browser consent
//! redirected to a loopback port) when there is nothing usable on disk.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use crate::config::GmailCredentials;

/// Seconds before expiry at which a cached token is treated as stale
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Token state for one OAuth client and tokens directory
pub struct GmailAuth {
    credentials: GmailCredentials,
    token_path: PathBuf,
}

/// Contents of the token file
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix seconds
    expires_at: Option<i64>,
}

impl StoredToken {
    fn from_response(response: TokenResponse, now: i64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(|secs| now + secs as i64),
        }
    }

    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at > now + EXPIRY_MARGIN_SECS)
    }
}

/// Token endpoint reply
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    const GMAIL_READONLY_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.readonly";
    const TOKEN_FILE: &'static str = "gmail-tokens.json";

    /// Loopback ports tried for the consent redirect
    const CALLBACK_PORTS: std::ops::RangeInclusive<u16> = 8080..=8090;

    pub fn new(credentials: GmailCredentials, tokens_directory: &Path) -> Self {
        Self {
            credentials,
            token_path: tokens_directory.join(Self::TOKEN_FILE),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Access token for API calls
    ///
    /// Order: fresh cached token, refreshed token, interactive consent. Every
    /// newly obtained token is written back to the token file.
    pub fn get_access_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();

        if let Some(stored) = self.load_token() {
            if stored.is_fresh(now) {
                return Ok(stored.access_token);
            }

            if let Some(refresh_token) = &stored.refresh_token {
                match self.refresh(refresh_token) {
                    Ok(token) => return self.store(token),
                    Err(e) => warn!("Token refresh failed, asking for consent again: {:#}", e),
                }
            }
        }

        let token = self.request_consent()?;
        self.store(token)
    }

    /// Interactive consent; prompts go to stderr because stdout carries rows
    fn request_consent(&self) -> Result<StoredToken> {
        let (listener, port) = self.bind_callback()?;
        let redirect_uri = format!("http://localhost:{}", port);

        let consent_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(Self::GMAIL_READONLY_SCOPE),
        );

        eprintln!("Gmail access has not been granted yet for {}.", self.token_path.display());
        eprintln!("Approve read-only access in the browser, or open: {}", consent_url);
        if let Err(e) = open::that(&consent_url) {
            warn!("Could not open a browser: {}", e);
        }

        let code = self.await_code(listener)?;

        info!("Exchanging authorization code");
        let mut response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        Ok(StoredToken::from_response(token, Utc::now().timestamp()))
    }

    fn bind_callback(&self) -> Result<(TcpListener, u16)> {
        Self::CALLBACK_PORTS
            .clone()
            .find_map(|port| {
                TcpListener::bind(("127.0.0.1", port))
                    .ok()
                    .map(|listener| (listener, port))
            })
            .with_context(|| {
                format!(
                    "No free callback port in {}-{}",
                    Self::CALLBACK_PORTS.start(),
                    Self::CALLBACK_PORTS.end()
                )
            })
    }

    /// Accept the redirect and pull `code` (or `error`) out of its request line
    fn await_code(&self, listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept callback")?;

        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .context("Failed to read callback request")?;

        let code = callback_param(&request_line, "code");
        let (status, text) = match code {
            Some(_) => ("200 OK", "Gmail access granted. You can close this tab."),
            None => ("400 Bad Request", "Gmail access was not granted."),
        };
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}",
            status, text
        );
        stream.write_all(reply.as_bytes()).ok();

        if let Some(error) = callback_param(&request_line, "error") {
            anyhow::bail!("OAuth error: {}", error);
        }
        code.context("Callback carried no authorization code")
    }

    fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        let mut stored = StoredToken::from_response(token, Utc::now().timestamp());
        // Google omits the refresh token on refresh replies
        if stored.refresh_token.is_none() {
            stored.refresh_token = Some(refresh_token.to_string());
        }
        Ok(stored)
    }

    /// A missing or unreadable token file counts as no token
    fn load_token(&self) -> Option<StoredToken> {
        let content = fs::read_to_string(&self.token_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring token file {}: {}", self.token_path.display(), e);
                None
            }
        }
    }

    fn store(&self, token: StoredToken) -> Result<String> {
        config::save_json_file(&self.token_path, &token)?;
        Ok(token.access_token)
    }

    /// Delete the token file so the next call asks for consent
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).with_context(|| {
                format!("Failed to remove token file: {}", self.token_path.display())
            })?;
        }
        Ok(())
    }
}

/// Query parameter from a request line such as `GET /?code=abc&scope=x HTTP/1.1`
fn callback_param(request_line: &str, name: &str) -> Option<String> {
    let path = request_line.split_whitespace().nth(1)?;
    let query = path.split_once('?')?.1;
    query.split('&').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(dir: &Path) -> GmailAuth {
        GmailAuth::new(
            GmailCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            dir,
        )
    }

    #[test]
    fn test_callback_param() {
        let line = "GET /?code=4/abc&scope=https://www.googleapis.com/auth/gmail.readonly HTTP/1.1\r\n";
        assert_eq!(callback_param(line, "code"), Some("4/abc".to_string()));
        assert_eq!(callback_param(line, "error"), None);

        let line = "GET /?error=access_denied HTTP/1.1\r\n";
        assert_eq!(callback_param(line, "error"), Some("access_denied".to_string()));
        assert_eq!(callback_param("GET / HTTP/1.1", "code"), None);
    }

    #[test]
    fn test_token_freshness() {
        let now = 1_700_000_000;
        let token = |expires_at| StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at,
        };

        assert!(token(Some(now + 3600)).is_fresh(now));
        assert!(!token(Some(now + 60)).is_fresh(now));
        assert!(!token(None).is_fresh(now));
    }

    #[test]
    fn test_from_response_sets_expiry() {
        let response = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_in: Some(3599),
        };
        let stored = StoredToken::from_response(response, 100);
        assert_eq!(stored.expires_at, Some(3699));
        assert_eq!(stored.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_cached_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let auth = auth(dir.path());
        let stored = StoredToken {
            access_token: "cached".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now().timestamp() + 3600),
        };
        config::save_json_file(auth.token_path(), &stored).unwrap();

        assert_eq!(auth.get_access_token().unwrap(), "cached");
    }

    #[test]
    fn test_logout_removes_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let auth = auth(dir.path());
        std::fs::write(auth.token_path(), "{}").unwrap();

        auth.logout().unwrap();
        assert!(!auth.token_path().exists());
        // Idempotent
        auth.logout().unwrap();
    }
}
