//! Google OAuth2 authentication
//!
//! Implements the installed-app authorization code flow for any
//! [`ServiceType`]. Uses a local HTTP server to receive the OAuth callback.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use crate::config::GoogleCredentials;

/// Google APIs this crate can authorize for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Drive,
    Gmail,
    Sheets,
    Calendar,
    CalendarWrite,
}

impl ServiceType {
    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceType::Drive => "drive",
            ServiceType::Gmail => "gmail",
            ServiceType::Sheets => "sheets",
            ServiceType::Calendar | ServiceType::CalendarWrite => "calendar",
        }
    }

    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            ServiceType::Drive => &["https://www.googleapis.com/auth/drive.metadata.readonly"],
            ServiceType::Gmail => &["https://www.googleapis.com/auth/gmail.readonly"],
            ServiceType::Sheets => &[
                "https://spreadsheets.google.com/feeds",
                "https://www.googleapis.com/auth/drive",
            ],
            ServiceType::Calendar => &["https://www.googleapis.com/auth/calendar.readonly"],
            ServiceType::CalendarWrite => &["https://www.googleapis.com/auth/calendar"],
        }
    }

    pub fn default_api_version(&self) -> &'static str {
        match self {
            ServiceType::Gmail => "v1",
            _ => "v3",
        }
    }
}

/// An authorized user of a Google Cloud project
#[derive(Debug, Clone)]
pub struct AuthedSession {
    pub access_token: String,
    pub user_email: String,
    pub user_name: Option<String>,
    pub project_name: String,
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    /// Scopes the token was granted for
    #[serde(default)]
    scopes: Vec<String>,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
    name: Option<String>,
}

/// OAuth2 configuration and token management for one project and service
pub struct GoogleApiAuthorizer {
    service_type: ServiceType,
    project_name: String,
    scopes: Vec<String>,
    credentials: GoogleCredentials,
    token_path: PathBuf,
}

impl GoogleApiAuthorizer {
    /// Google OAuth2 endpoints
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    const USERINFO_URL: &'static str = "https://www.googleapis.com/oauth2/v2/userinfo";

    /// Always requested so the account email can be looked up
    const PROFILE_SCOPES: [&'static str; 2] = [
        "https://www.googleapis.com/auth/userinfo.profile",
        "https://www.googleapis.com/auth/userinfo.email",
    ];

    /// Port range to try for local OAuth callback server
    const PORT_RANGE_START: u16 = 8080;
    const PORT_RANGE_END: u16 = 8090;

    /// Create an authorizer using the service's default scopes.
    ///
    /// Tokens are stored per project (`<config dir>/<project>/token.json`).
    pub fn new(
        service_type: ServiceType,
        credentials: GoogleCredentials,
        project_name: Option<&str>,
    ) -> Result<Self> {
        let project_name = project_name
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("unknown")
            .to_string();
        let token_path = config::project_config_path(&project_name, "token.json")
            .context("Could not determine config directory")?;
        let scopes = Self::with_profile_scopes(service_type.default_scopes().iter().copied());

        info!(
            "Authorizer for project {}: service {}, scopes {:?}, token file {}",
            project_name,
            service_type.service_name(),
            scopes,
            token_path.display()
        );

        Ok(Self {
            service_type,
            project_name,
            scopes,
            credentials,
            token_path,
        })
    }

    /// Replace the service's default scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scopes = Self::with_profile_scopes(scopes);
        self
    }

    pub fn with_token_path(mut self, token_path: impl Into<PathBuf>) -> Self {
        self.token_path = token_path.into();
        self
    }

    fn with_profile_scopes<I, S>(scopes: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result: Vec<String> = Vec::new();
        let profile = Self::PROFILE_SCOPES.iter().map(|s| s.to_string());
        for scope in scopes.into_iter().map(|s| s.as_ref().to_string()).chain(profile) {
            if !result.contains(&scope) {
                result.push(scope);
            }
        }
        result
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Obtain a token and look up who it belongs to
    pub fn authorize(&self) -> Result<AuthedSession> {
        let access_token = self.get_access_token()?;

        let mut response = ureq::get(Self::USERINFO_URL)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send user info request")?;
        let user: UserInfo = response
            .body_mut()
            .read_json()
            .context("Failed to parse user info response")?;

        info!("Authorized as {} for project {}", user.email, self.project_name);
        Ok(AuthedSession {
            access_token,
            user_email: user.email,
            user_name: user.name,
            project_name: self.project_name.clone(),
        })
    }

    /// Get a valid access token, refreshing or re-authenticating as needed
    pub fn get_access_token(&self) -> Result<String> {
        // Try to load existing token
        if let Ok(token) = self.load_token()
            && self.covers_scopes(&token)
        {
            // Check if token is still valid (with 5 minute buffer)
            if is_fresh(&token) {
                return Ok(token.access_token);
            }

            // Try to refresh the token
            if let Some(refresh_token) = token.refresh_token
                && let Ok(new_token) = self.refresh_access_token(&refresh_token)
            {
                self.save_token_response(&new_token)?;
                return Ok(new_token.access_token);
            }
        }

        // Need to authenticate from scratch
        let token = self.authorization_code_auth()?;
        self.save_token_response(&token)?;
        Ok(token.access_token)
    }

    fn covers_scopes(&self, token: &StoredToken) -> bool {
        let covered = self.scopes.iter().all(|s| token.scopes.contains(s));
        if !covered {
            warn!("Stored token does not cover the requested scopes, authorizing again");
        }
        covered
    }

    /// Perform authorization code flow authentication
    fn authorization_code_auth(&self) -> Result<TokenResponse> {
        // Step 1: Start local server to receive callback
        let (listener, port) = self.start_local_server()?;
        let redirect_uri = format!("http://localhost:{}", port);

        // Step 2: Build authorization URL
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
        );

        println!("\n=== Google Authentication Required ({}) ===", self.project_name);
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open, visit: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            warn!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        // Step 3: Wait for callback with authorization code
        println!("Waiting for authorization...");
        let code = self.wait_for_callback(listener)?;

        // Step 4: Exchange code for tokens
        info!("Exchanging authorization code for tokens");
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

        println!("Authentication successful!\n");
        Ok(token)
    }

    /// Start a local TCP server on an available port
    fn start_local_server(&self) -> Result<(TcpListener, u16)> {
        for port in Self::PORT_RANGE_START..=Self::PORT_RANGE_END {
            if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{}", port)) {
                return Ok((listener, port));
            }
        }
        anyhow::bail!(
            "Could not bind to any port in range {}-{}",
            Self::PORT_RANGE_START,
            Self::PORT_RANGE_END
        )
    }

    /// Wait for OAuth callback and extract authorization code
    fn wait_for_callback(&self, listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .context("Failed to read request")?;

        // Format: GET /?code=AUTH_CODE&scope=... HTTP/1.1
        let code = query_param(&request_line, "code");
        let error = query_param(&request_line, "error");

        let (status, body) = if code.is_some() {
            ("200 OK", "Authentication successful! You can close this window.")
        } else {
            ("400 Bad Request", "Authentication failed. Please try again.")
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        stream.write_all(response.as_bytes()).ok();

        if let Some(err) = error {
            anyhow::bail!("OAuth error: {}", err);
        }

        code.context("No authorization code received")
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let mut token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }

    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(token)
    }

    fn save_token_response(&self, token: &TokenResponse) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
            scopes: self.scopes.clone(),
        };
        config::save_json_file(&self.token_path, &stored)
    }

    /// Check if the user is already authenticated
    pub fn is_authenticated(&self) -> bool {
        match self.load_token() {
            Ok(token) if self.covers_scopes(&token) => {
                if is_fresh(&token) {
                    return true;
                }
                token
                    .refresh_token
                    .is_some_and(|refresh_token| self.refresh_access_token(&refresh_token).is_ok())
            }
            _ => false,
        }
    }

    /// Clear stored tokens (logout)
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)?;
        }
        Ok(())
    }
}

fn is_fresh(token: &StoredToken) -> bool {
    token
        .expires_at
        .is_some_and(|expires_at| expires_at > chrono::Utc::now().timestamp() + 300)
}

/// Value of a query parameter in an HTTP request line
fn query_param(request_line: &str, name: &str) -> Option<String> {
    let path = request_line.split_whitespace().nth(1)?;
    let query = path.split_once('?')?.1;
    query.split('&').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key != name {
            return None;
        }
        Some(
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> GoogleCredentials {
        GoogleCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn authorizer(token_path: &Path) -> GoogleApiAuthorizer {
        GoogleApiAuthorizer::new(ServiceType::Gmail, credentials(), Some("proj"))
            .unwrap()
            .with_token_path(token_path)
    }

    #[test]
    fn test_service_types() {
        assert_eq!(ServiceType::Gmail.service_name(), "gmail");
        assert_eq!(ServiceType::Gmail.default_api_version(), "v1");
        assert_eq!(ServiceType::CalendarWrite.service_name(), "calendar");
        assert_eq!(ServiceType::Sheets.default_scopes().len(), 2);
        assert_eq!(ServiceType::Drive.default_api_version(), "v3");
    }

    #[test]
    fn test_profile_scopes_are_added_once() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authorizer(&dir.path().join("token.json")).with_scopes([
            "https://www.googleapis.com/auth/gmail.readonly",
            "https://www.googleapis.com/auth/userinfo.email",
        ]);

        assert_eq!(
            auth.scopes(),
            &[
                "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ]
        );
    }

    #[test]
    fn test_blank_project_name_defaults() {
        let auth = GoogleApiAuthorizer::new(ServiceType::Calendar, credentials(), Some(" ")).unwrap();
        assert_eq!(auth.project_name(), "unknown");
    }

    #[test]
    fn test_fresh_stored_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let auth = authorizer(&token_path);

        let stored = StoredToken {
            access_token: "cached-token".to_string(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
            scopes: auth.scopes().to_vec(),
        };
        config::save_json_file(&token_path, &stored).unwrap();

        assert!(auth.is_authenticated());
        assert_eq!(auth.get_access_token().unwrap(), "cached-token");

        auth.logout().unwrap();
        assert!(!token_path.exists());
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_token_with_fewer_scopes_is_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let auth = authorizer(&token_path);

        let stored = StoredToken {
            access_token: "cached-token".to_string(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
            scopes: vec!["https://www.googleapis.com/auth/userinfo.email".to_string()],
        };
        config::save_json_file(&token_path, &stored).unwrap();

        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_query_param() {
        let line = "GET /?state=x&code=4%2F0Abc&scope=email HTTP/1.1\r\n";
        assert_eq!(query_param(line, "code"), Some("4/0Abc".to_string()));
        assert_eq!(query_param(line, "error"), None);
        assert_eq!(query_param("GET / HTTP/1.1", "code"), None);
    }
}
