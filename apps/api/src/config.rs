use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::extract::DEFAULT_MAX_UPLOAD_BYTES;
use crate::fetch::guard::BlockList;
use crate::fetch::FetchPolicy;
use crate::llm_client::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::pipeline::{DEFAULT_MAX_CV_TEXT_CHARS, DEFAULT_MAX_JOB_TEXT_CHARS};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or any value is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub model_endpoint: String,
    pub model_name: String,
    pub model_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_fetch_bytes: usize,
    pub fetch_timeout: Duration,
    pub max_redirects: usize,
    pub parse_timeout: Duration,
    pub max_job_text_chars: usize,
    pub max_cv_text_chars: usize,
    pub blocked_networks: BlockList,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let blocked_networks = match std::env::var("BLOCKED_NETWORKS") {
            Ok(list) if !list.trim().is_empty() => BlockList::parse_list(&list)
                .context("BLOCKED_NETWORKS must be a comma-separated list of CIDR ranges")?,
            _ => BlockList::default(),
        };

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            model_endpoint: env_or("MODEL_ENDPOINT", DEFAULT_ENDPOINT.to_string())?,
            model_name: env_or("MODEL_NAME", DEFAULT_MODEL.to_string())?,
            model_timeout: Duration::from_secs(env_or("MODEL_TIMEOUT_SECS", 60)?),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_fetch_bytes: env_or("MAX_FETCH_BYTES", 2 * 1024 * 1024)?,
            fetch_timeout: Duration::from_secs(env_or("FETCH_TIMEOUT_SECS", 10)?),
            max_redirects: env_or("MAX_REDIRECTS", 3)?,
            parse_timeout: Duration::from_secs(env_or("PARSE_TIMEOUT_SECS", 15)?),
            max_job_text_chars: env_or("MAX_JOB_TEXT_CHARS", DEFAULT_MAX_JOB_TEXT_CHARS)?,
            max_cv_text_chars: env_or("MAX_CV_TEXT_CHARS", DEFAULT_MAX_CV_TEXT_CHARS)?,
            blocked_networks,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_bytes: self.max_fetch_bytes,
            timeout: self.fetch_timeout,
            max_redirects: self.max_redirects,
            blocklist: self.blocked_networks.clone(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Reads and parses an optional variable, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
