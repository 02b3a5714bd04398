use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_root: PathBuf,
    /// Empty when unset; only `serve` needs it.
    pub jwt_secret: String,
    pub language: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Reads `AGORA_*` variables. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Result<Self> {
        let port = var("AGORA_PORT", "3000")
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let max_upload_bytes = var("AGORA_MAX_UPLOAD_BYTES", "10485760")
            .parse()
            .context("AGORA_MAX_UPLOAD_BYTES must be a byte count")?;

        let language = var("AGORA_LANGUAGE", "ja");
        if language.is_empty() || !language.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            bail!("AGORA_LANGUAGE must be a language code such as `ja` or `en-us`, got {language:?}");
        }

        Ok(Self {
            host: var("AGORA_HOST", "0.0.0.0"),
            port,
            db_path: var("AGORA_DB_PATH", "agora.db").into(),
            media_root: var("AGORA_MEDIA_ROOT", "./media").into(),
            jwt_secret: var("AGORA_JWT_SECRET", ""),
            language,
            max_upload_bytes,
        })
    }

    /// Refuses to serve with a missing or placeholder session secret.
    pub fn check_secret(&self) -> Result<()> {
        if self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; set it in your .env file and restart");
        }
        Ok(())
    }
}

fn var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}
