use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dispatch::GenerationParams;
use crate::error::ConfigError;
use crate::prompt::{DEFAULT_PROMPT, DEFAULT_TITLE, default_models};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_JSON_PATH: &str = "docs/ai_consultation_results.json";
pub const DEFAULT_MARKDOWN_PATH: &str = "docs/ai_consultation_summary.md";

/// Config file looked up in the working directory when `CONSULT_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "consult.toml";

pub const CONFIG_ENV: &str = "CONSULT_CONFIG";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";
pub const MODELS_ENV: &str = "CONSULT_MODELS";
pub const JSON_PATH_ENV: &str = "CONSULT_JSON_PATH";
pub const MARKDOWN_PATH_ENV: &str = "CONSULT_MARKDOWN_PATH";

const MAX_TEMPERATURE: f64 = 2.0;

/// Optional TOML overrides. Every key is optional; unknown keys are rejected
/// so typos surface instead of silently falling back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub models: Option<Vec<String>>,
    pub prompt: Option<String>,
    /// Read as the prompt text. Relative paths resolve against the config file's directory.
    pub prompt_file: Option<PathBuf>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub json_path: Option<PathBuf>,
    pub markdown_path: Option<PathBuf>,
    pub title: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse a config file, inlining `prompt_file` into `prompt`.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse(&text, path)?;

        if let Some(prompt_file) = file.prompt_file.take() {
            if file.prompt.is_some() {
                return Err(ConfigError::Invalid(
                    "set either `prompt` or `prompt_file`, not both".to_string(),
                ));
            }
            let resolved = match path.parent() {
                Some(dir) if prompt_file.is_relative() => dir.join(&prompt_file),
                _ => prompt_file,
            };
            let prompt = std::fs::read_to_string(&resolved).map_err(|source| {
                ConfigError::Read {
                    path: resolved.clone(),
                    source,
                }
            })?;
            file.prompt = Some(prompt);
        }

        Ok(file)
    }
}

pub struct Config {
    /// Bearer credential for the gateway. `None` is allowed: the gateway
    /// rejects the request and each model records an auth failure.
    pub api_key: Option<String>,
    pub base_url: String,
    pub models: Vec<String>,
    pub prompt: String,
    pub params: GenerationParams,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
    pub title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: default_models(),
            prompt: DEFAULT_PROMPT.to_string(),
            params: GenerationParams::default(),
            json_path: PathBuf::from(DEFAULT_JSON_PATH),
            markdown_path: PathBuf::from(DEFAULT_MARKDOWN_PATH),
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("prompt_chars", &self.prompt.chars().count())
            .field("params", &self.params)
            .field("json_path", &self.json_path)
            .field("markdown_path", &self.markdown_path)
            .field("title", &self.title)
            .finish()
    }
}

impl Config {
    /// Load from the process environment and the optional config file.
    /// Call `dotenvy` before this so `.env` values are visible.
    pub fn load() -> Result<Self, ConfigError> {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let file = config_file_path(|key| env::var(key).ok(), &cwd)
            .map(|path| FileConfig::read(&path))
            .transpose()?;

        let config = Self::from_sources(file, |key| env::var(key).ok())?;
        if config.api_key.is_none() {
            tracing::warn!("{API_KEY_ENV} not set; every consultation will fail authentication");
        }
        Ok(config)
    }

    /// Layer defaults, then `file`, then `env`. Blank environment values count as unset.
    pub fn from_sources<F>(file: Option<FileConfig>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(file) = file {
            if let Some(base_url) = file.base_url {
                config.base_url = base_url;
            }
            if let Some(models) = file.models {
                config.models = models;
            }
            if let Some(prompt) = file.prompt {
                config.prompt = prompt;
            }
            if let Some(max_tokens) = file.max_tokens {
                config.params.max_tokens = max_tokens;
            }
            if let Some(temperature) = file.temperature {
                config.params.temperature = temperature;
            }
            if let Some(path) = file.json_path {
                config.json_path = path;
            }
            if let Some(path) = file.markdown_path {
                config.markdown_path = path;
            }
            if let Some(title) = file.title {
                config.title = title;
            }
        }

        config.api_key = lookup(API_KEY_ENV);
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        if let Some(models) = lookup(MODELS_ENV) {
            config.models = parse_model_list(&models);
        }
        if let Some(path) = lookup(JSON_PATH_ENV) {
            config.json_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(MARKDOWN_PATH_ENV) {
            config.markdown_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = self.params.temperature;
        if !t.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within 0.0..={MAX_TEMPERATURE}, got {t}"
            )));
        }
        if self.params.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Which config file to read: `CONSULT_CONFIG` when set (it must then exist),
/// else `consult.toml` in `cwd` if present, else none.
pub fn config_file_path<F>(env: F, cwd: &Path) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env(CONFIG_ENV).filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    let default = cwd.join(DEFAULT_CONFIG_FILE);
    default.is_file().then_some(default)
}

/// Split a comma-separated model list, trimming whitespace and dropping blanks.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
