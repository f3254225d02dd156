//! Configuration: per-field pattern files, window sizing and service settings.
//!
//! Pattern files are loaded once from the `patterns/` directory (one JSON file
//! per field, named after the field key) and are read-only afterwards.

use crate::error::PatternConfigError;
use crate::schema::{Field, NOT_FOUND};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Regex configuration for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub patterns: Vec<String>,
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
    #[serde(default)]
    pub find_all: bool,
    /// Optional post-processing: "uppercase" | "lowercase" | "title_case" |
    /// "collapse_whitespace" | "strip_trailing_punctuation"
    #[serde(default)]
    pub formatter: Option<String>,
}

fn default_fallback_text() -> String {
    NOT_FOUND.to_string()
}

/// Size bounds for context windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    pub min_sentences: usize,
    pub max_sentences: usize,
    pub max_chars_dense: usize,
    /// Roughly one page of prose.
    pub max_chars_sparse: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            min_sentences: 2,
            max_sentences: 5,
            max_chars_dense: 1_000,
            max_chars_sparse: 6_000,
        }
    }
}

/// All pattern configurations, keyed by field.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    configs: HashMap<Field, PatternConfig>,
}

impl PatternStore {
    /// Load every `<field_key>.json` file in `dir`.
    ///
    /// A missing directory yields an empty store, unknown keys are ignored and
    /// unreadable files are logged and skipped.
    pub fn load_from_dir(dir: &Path) -> Self {
        let mut configs = HashMap::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Patterns directory {:?} unavailable ({}); no patterns loaded", dir, e);
                return Self { configs };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            let Some(field) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(Field::from_key)
            else {
                continue;
            };

            match read_pattern_file(&path) {
                Ok(config) => {
                    info!(
                        "Loaded {} patterns for '{}' from {:?}",
                        config.patterns.len(),
                        field,
                        path
                    );
                    configs.insert(field, config);
                }
                Err(e) => error!("Skipping pattern file for '{}': {}", field, e),
            }
        }

        Self { configs }
    }

    pub fn from_configs(configs: impl IntoIterator<Item = (Field, PatternConfig)>) -> Self {
        Self {
            configs: configs.into_iter().collect(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&PatternConfig> {
        self.configs.get(&field)
    }

    /// Text substituted when a field has no answer at all.
    pub fn fallback_text(&self, field: Field) -> &str {
        self.get(field)
            .map(|c| c.fallback_text.trim())
            .filter(|t| !t.is_empty())
            .unwrap_or(NOT_FOUND)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn read_pattern_file(path: &Path) -> Result<PatternConfig, PatternConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| PatternConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| PatternConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Process settings read from the environment (after `.env` is applied).
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub patterns_dir: PathBuf,
    pub mistral_api_key: Option<String>,
    pub mistral_model: String,
    pub llm_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let llm_timeout_secs = env_parse("LLM_TIMEOUT_SECS").unwrap_or(30);
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            patterns_dir: std::env::var("PATTERNS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("patterns")),
            mistral_api_key: std::env::var("MISTRAL_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            mistral_model: std::env::var("MISTRAL_MODEL")
                .unwrap_or_else(|_| "mistral-small-latest".to_string()),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(16 * 1024 * 1024),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}
