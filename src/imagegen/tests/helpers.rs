use crate::imagegen::circuit_breaker::CircuitBreakerConfig;
use crate::imagegen::config::ImageGenProviderConfig;
use crate::imagegen::gemini::GeminiImageGenProvider;
use crate::imagegen::interface::{
    GenerationRequest, ImageGenError, ImageGenProvider, ImageResult, ProviderId,
};
use crate::imagegen::monster::MonsterImageGenProvider;
use crate::imagegen::resilience::{ProviderGuard, TimeoutGuard};
use crate::imagegen::stability::StabilityImageGenProvider;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_KEY: &str = "test-key";
pub const GEMINI_MODEL: &str = "test-model";
pub const GEMINI_PATH: &str = "/v1beta/models/test-model:generateContent";
pub const STABILITY_PATH: &str = "/v2beta/stable-image/generate/sd3";

// ── Image byte generators ────────────────────────────────────

/// PNG magic header padded to 16 bytes.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(16, 0xAA);
    bytes
}

pub fn png_b64() -> String {
    general_purpose::STANDARD.encode(png_bytes())
}

// ── Provider setup helpers ──────────────────────────────────

pub fn provider_config(id: ProviderId, base_url: String, api_key: Option<&str>) -> ImageGenProviderConfig {
    ImageGenProviderConfig {
        id,
        api_key: api_key.map(String::from),
        api_key_env: Some("AIART_TEST_UNSET_API_KEY".to_string()),
        base_url: Some(base_url),
        model: None,
    }
}

pub fn guard_with_timeout(id: ProviderId, timeout: Duration) -> ProviderGuard {
    ProviderGuard::new(id, &CircuitBreakerConfig::default(), TimeoutGuard::new(timeout))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn gemini(server_uri: &str) -> GeminiImageGenProvider {
    gemini_with(server_uri, Some(TEST_KEY), Duration::from_secs(5))
}

pub fn gemini_with(server_uri: &str, key: Option<&str>, timeout: Duration) -> GeminiImageGenProvider {
    let mut config = provider_config(ProviderId::Gemini, format!("{}/v1beta/models", server_uri), key);
    config.model = Some(GEMINI_MODEL.to_string());
    GeminiImageGenProvider::new(&config, client(), guard_with_timeout(ProviderId::Gemini, timeout))
}

pub fn stability(server_uri: &str, temp_dir: &Path) -> StabilityImageGenProvider {
    stability_with(server_uri, Some(TEST_KEY), temp_dir, 10 * 1024 * 1024)
}

pub fn stability_with(
    server_uri: &str,
    key: Option<&str>,
    temp_dir: &Path,
    max_upload_bytes: u64,
) -> StabilityImageGenProvider {
    let config = provider_config(
        ProviderId::Stability,
        format!("{}{}", server_uri, STABILITY_PATH),
        key,
    );
    StabilityImageGenProvider::new(
        &config,
        client(),
        guard_with_timeout(ProviderId::Stability, Duration::from_secs(5)),
        temp_dir.to_path_buf(),
        max_upload_bytes,
    )
}

pub fn monster(server_uri: &str, poll_interval: Duration, timeout: Duration) -> MonsterImageGenProvider {
    let config = provider_config(ProviderId::Monster, format!("{}/apis", server_uri), Some(TEST_KEY));
    MonsterImageGenProvider::new(
        &config,
        client(),
        guard_with_timeout(ProviderId::Monster, timeout),
        poll_interval,
    )
}

/// Bodies of all requests the mock server saw, in arrival order.
pub async fn request_bodies(server: &wiremock::MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .collect()
}

pub async fn request_count(server: &wiremock::MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

// ── Scripted provider ───────────────────────────────────────

type Script = Box<dyn Fn(usize) -> Result<Vec<ImageResult>, ImageGenError> + Send + Sync>;

/// In-process provider whose per-sample outcome is scripted by call index.
pub struct ScriptedProvider {
    id: ProviderId,
    script: Script,
    pub prompts: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(
        id: ProviderId,
        script: impl Fn(usize) -> Result<Vec<ImageResult>, ImageGenError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always returns one image whose bytes carry the call index.
    pub fn always_ok(id: ProviderId) -> Self {
        Self::new(id, |i| Ok(vec![tagged_image(i)]))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub fn tagged_image(index: usize) -> ImageResult {
    ImageResult::new("image/png", vec![index as u8])
}

#[async_trait]
impl ImageGenProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn generate_sample(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        let index = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };
        self.requests.lock().unwrap().push(request.clone());
        (self.script)(index)
    }
}
