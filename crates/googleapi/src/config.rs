//! Configuration for Google API access and the Gmail cache
//!
//! OAuth client credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials
//! 2. JSON file in the config directory (Google Cloud Console format)
//! 3. Runtime environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{CachingStrategy, CachingStrategyType};
use crate::error::ConfigError;

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// OAuth client credentials of a Google Cloud project
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format (installed app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GoogleCredentials {
    /// Load credentials using the priority order described in the module docs
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Credentials embedded at build time.
    /// Build with: GOOGLE_CLIENT_ID=xxx GOOGLE_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from a JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .context("GOOGLE_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .context("GOOGLE_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Default credentials file path (~/.config/googleapiwrapper/credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Where and how the Gmail wrapper caches API responses
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub strategy: CachingStrategyType,
    pub output_basedir: PathBuf,
    pub project_name: String,
    pub user_email: String,
}

impl CacheConfig {
    /// Validate the settings. Nothing is created on disk here.
    pub fn new(
        strategy: CachingStrategyType,
        output_basedir: impl Into<PathBuf>,
        project_name: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            strategy,
            output_basedir: output_basedir.into(),
            project_name: project_name.into(),
            user_email: user_email.into(),
        };
        validate_cache_settings(&config.output_basedir, &config.project_name, &config.user_email)?;
        Ok(config)
    }

    /// Directory holding this account's cache
    pub fn account_dir(&self) -> PathBuf {
        self.output_basedir
            .join(convert_email_address_to_dirname(&self.user_email))
    }

    pub fn build_strategy(&self) -> Result<Box<dyn CachingStrategy>> {
        self.strategy
            .build(&self.output_basedir, &self.project_name, &self.user_email)
    }
}

pub(crate) fn validate_cache_settings(
    output_basedir: &Path,
    project_name: &str,
    user_email: &str,
) -> Result<(), ConfigError> {
    if output_basedir.as_os_str().is_empty() {
        return Err(ConfigError::MissingOutputBasedir);
    }
    if project_name.trim().is_empty() || user_email.trim().is_empty() {
        return Err(ConfigError::MissingAccountIdentity {
            project: project_name.to_string(),
            email: user_email.to_string(),
        });
    }
    Ok(())
}

/// Filesystem-safe directory name for an email address
pub fn convert_email_address_to_dirname(user_email: &str) -> String {
    user_email.replace(['@', '.'], "_")
}
