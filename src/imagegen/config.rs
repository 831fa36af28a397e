use super::circuit_breaker::CircuitBreakerConfig;
use super::interface::ProviderId;
use super::resilience::DEFAULT_REQUEST_TIMEOUT_MS;
use super::source::DEFAULT_MAX_UPLOAD_BYTES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Provider Config ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenProviderConfig {
    pub id: ProviderId,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl ImageGenProviderConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        crate::config::resolve_api_key(&self.api_key, &self.api_key_env)
    }

    pub fn defaults_for(id: ProviderId) -> Self {
        match id {
            ProviderId::Gemini => Self {
                id,
                api_key: None,
                api_key_env: Some("GEMINI_API_KEY".to_string()),
                base_url: None,
                model: Some("gemini-2.0-flash-exp-image-generation".to_string()),
            },
            ProviderId::Stability => Self {
                id,
                api_key: None,
                api_key_env: Some("STABILITY_API_KEY".to_string()),
                base_url: None,
                model: Some("sd3.5-flash".to_string()),
            },
            ProviderId::Monster => Self {
                id,
                api_key: None,
                api_key_env: Some("MONSTER_API_KEY".to_string()),
                base_url: None,
                model: Some("txt2img".to_string()),
            },
        }
    }
}

// ── System Config ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenSystemConfig {
    #[serde(default)]
    pub default_provider: ProviderId,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Delay between job status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Where staged upload files go. OS temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub providers: Vec<ImageGenProviderConfig>,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl ImageGenSystemConfig {
    /// Config for `id`, falling back to built-in defaults when the file
    /// doesn't list it.
    pub fn provider(&self, id: ProviderId) -> ImageGenProviderConfig {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap_or_else(|| ImageGenProviderConfig::defaults_for(id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ImageGenSystemConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderId::Gemini,
            request_timeout_ms: default_request_timeout_ms(),
            circuit_breaker: CircuitBreakerConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            temp_dir: None,
            providers: ProviderId::ALL
                .iter()
                .map(|id| ImageGenProviderConfig::defaults_for(*id))
                .collect(),
        }
    }
}

/// Load config from a JSON file. Falls back to defaults if file is missing or invalid.
pub fn load_config(path: &Path) -> ImageGenSystemConfig {
    crate::config::load_json_config(path, "ImageGen")
}

/// Save config to a JSON file.
pub fn save_config(path: &Path, config: &ImageGenSystemConfig) -> Result<(), String> {
    crate::config::save_json_config(path, config, "ImageGen")
}
