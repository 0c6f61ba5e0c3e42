//! Credential and seed-message resolution.
//!
//! The secrets file is a small TOML document kept out of the main config:
//!
//! ```toml
//! [completion]
//! api_key = "sk-..."
//!
//! [session]
//! seed_message = "You are a literary assistant..."
//! ```
//!
//! Lookup order for the API key: secrets file, then the environment variable
//! named by `completion.api_key_env`. For the seed: secrets file, then
//! `session.seed_message` in the main config. A missing credential (when the
//! provider needs one) or a missing seed is a [`ConfigError::Missing`], raised
//! before any session starts.

use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Debug, Deserialize, Default)]
struct SecretsFile {
    #[serde(default)]
    completion: CompletionSecrets,
    #[serde(default)]
    session: SessionSecrets,
}

#[derive(Debug, Deserialize, Default)]
struct CompletionSecrets {
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionSecrets {
    seed_message: Option<String>,
}

/// Everything a session needs before its first turn.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// `None` only when the provider needs no credential.
    pub api_key: Option<String>,
    pub seed_message: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("seed_message", &self.seed_message)
            .finish()
    }
}

pub fn resolve(config: &Config) -> Result<ResolvedSecrets, ConfigError> {
    resolve_with(config, |name| std::env::var(name).ok())
}

/// [`resolve`] with an injectable environment lookup.
pub fn resolve_with<F>(config: &Config, env: F) -> Result<ResolvedSecrets, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match &config.secrets.path {
        Some(path) => read_secrets(path)?,
        None => SecretsFile::default(),
    };

    let api_key = non_blank(file.completion.api_key)
        .or_else(|| non_blank(env(&config.completion.api_key_env)));
    if config.completion.is_enabled() && api_key.is_none() {
        return Err(ConfigError::Missing(format!(
            "completion credential: set {} or completion.api_key in the secrets file",
            config.completion.api_key_env
        )));
    }

    let seed_message = non_blank(file.session.seed_message)
        .or_else(|| non_blank(config.session.seed_message.clone()))
        .ok_or_else(|| {
            ConfigError::Missing(
                "seed message: set session.seed_message in the config or secrets file".to_string(),
            )
        })?;

    Ok(ResolvedSecrets {
        api_key,
        seed_message,
    })
}

fn read_secrets(path: &Path) -> Result<SecretsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Missing(format!("secrets file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| ConfigError::Invalid(format!("secrets file {}: {}", path.display(), e)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
