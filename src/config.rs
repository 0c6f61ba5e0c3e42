use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,
    /// Parent directory for scratch extraction directories. System temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
            max_extracted_bytes: default_max_extracted_bytes(),
            scratch_dir: None,
        }
    }
}

fn default_max_archive_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_max_extracted_bytes() -> u64 {
    500 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Candidate encodings, tried in order.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
    #[serde(default = "default_metadata_dirs")]
    pub metadata_dirs: Vec<String>,
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
            metadata_dirs: default_metadata_dirs(),
            hidden_prefix: default_hidden_prefix(),
            suffix: default_suffix(),
        }
    }
}

fn default_encodings() -> Vec<String> {
    vec![
        "utf-8".to_string(),
        "shift_jis".to_string(),
        "iso-2022-jp".to_string(),
    ]
}
fn default_metadata_dirs() -> Vec<String> {
    vec!["__MACOSX".to_string()]
}
fn default_hidden_prefix() -> String {
    "._".to_string()
}
fn default_suffix() -> String {
    ".txt".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable consulted when the secrets file has no key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub seed_message: Option<String>,
    #[serde(default)]
    pub attach_corpus: bool,
    #[serde(default = "default_max_corpus_chars")]
    pub max_corpus_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed_message: None,
            attach_corpus: false,
            max_corpus_chars: default_max_corpus_chars(),
        }
    }
}

fn default_max_corpus_chars() -> usize {
    20_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config if the file exists, otherwise fall back to defaults.
///
/// Only for commands that never reach the completion service.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.archive.max_archive_bytes == 0 {
        anyhow::bail!("archive.max_archive_bytes must be > 0");
    }
    if config.archive.max_extracted_bytes == 0 {
        anyhow::bail!("archive.max_extracted_bytes must be > 0");
    }

    if config.corpus.encodings.is_empty() {
        anyhow::bail!("corpus.encodings must list at least one encoding");
    }
    for label in &config.corpus.encodings {
        if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
            anyhow::bail!("Unknown encoding in corpus.encodings: '{}'", label);
        }
    }
    if config.corpus.suffix.is_empty() {
        anyhow::bail!("corpus.suffix must not be empty");
    }

    if config.completion.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }
    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
