//! Studio configuration loaded from defaults, an optional TOML file, and the environment.
//!
//! | Source | Example |
//! |--------|---------|
//! | `VOICEFY_CONFIG` | path to a TOML file (default `config/voicefy.toml`, skipped when absent) |
//! | `VOICEFY__<FIELD>` | `VOICEFY__STORAGE_PATH=./data`, `VOICEFY__HISTORY_CAPACITY=10` |
//! | `GEMINI_API_KEY` / `API_KEY` | credential for the speech API, overrides `api_key` |

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_SPEECH_MODEL_HQ: &str = "gemini-2.5-pro-preview-tts";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_CONFIG_PATH: &str = "config/voicefy.toml";
const LIBRARY_DIR: &str = "voicefy_library";

/// Runtime configuration for the studio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    /// Base URL of the generative API, without trailing slash.
    pub api_url: String,
    /// Opaque credential. `None`, empty, or the literal `undefined` all mean "not configured".
    #[serde(default)]
    pub api_key: Option<String>,
    /// Speech model used when the quality flag is off (turbo).
    pub speech_model: String,
    /// Speech model used when the quality flag is on.
    pub speech_model_hq: String,
    /// Model used for text refinement and translation.
    pub text_model: String,
    /// HTTP request timeout for remote calls.
    pub request_timeout_secs: u64,
    /// Root directory for local state; the library lives under `<storage_path>/voicefy_library`.
    pub storage_path: String,
    /// Bound on the in-memory history.
    pub history_capacity: usize,
    /// Analyser FFT size (power of two).
    pub fft_size: usize,
    /// Directory downloads are written into.
    pub download_dir: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            speech_model_hq: DEFAULT_SPEECH_MODEL_HQ.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout_secs: 120,
            storage_path: "./data".to_string(),
            history_capacity: 10,
            fft_size: 256,
            download_dir: ".".to_string(),
        }
    }
}

impl StudioConfig {
    /// Load config. Precedence: env `VOICEFY__*` > file at `VOICEFY_CONFIG` (or `config/voicefy.toml`) > defaults.
    /// The credential is then taken from `GEMINI_API_KEY` or `API_KEY` when either is set.
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("VOICEFY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from(Path::new(&config_path))?;
        if let Some(key) = env_opt_string("GEMINI_API_KEY").or_else(|| env_opt_string("API_KEY")) {
            cfg.api_key = Some(key);
        }
        Ok(cfg)
    }

    /// Layer defaults, the file at `path` (if it exists) and `VOICEFY__*` variables.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("api_url", d.api_url)?
            .set_default("speech_model", d.speech_model)?
            .set_default("speech_model_hq", d.speech_model_hq)?
            .set_default("text_model", d.text_model)?
            .set_default("request_timeout_secs", d.request_timeout_secs as i64)?
            .set_default("storage_path", d.storage_path)?
            .set_default("history_capacity", d.history_capacity as i64)?
            .set_default("fft_size", d.fft_size as i64)?
            .set_default("download_dir", d.download_dir)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("VOICEFY").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// The credential if one is usable.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| is_usable_credential(k))
    }

    /// True when a usable credential is configured.
    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    pub fn library_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join(LIBRARY_DIR)
    }
}

/// Empty strings and the literal `undefined` (what an unset build-time variable stringifies to) are not credentials.
pub fn is_usable_credential(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != "undefined"
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
