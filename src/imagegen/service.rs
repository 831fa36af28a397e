use super::config::ImageGenSystemConfig;
use super::gemini::GeminiImageGenProvider;
use super::interface::{
    AspectRatio, GenerationRequest, ImageGenError, ImageGenProvider, ImageResult, ProviderId,
    DEFAULT_STRENGTH,
};
use super::monster::MonsterImageGenProvider;
use super::resilience::{ProviderGuard, TimeoutGuard};
use super::selector::{PreferenceStore, ProviderSelector};
use super::stability::StabilityImageGenProvider;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

pub const EDIT_PROMPT_PREFIX: &str = "Inpainting/Outpainting request: ";

#[derive(Clone, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub label: String,
    pub active: bool,
}

/// One adapter per provider. Lookup is an exhaustive match, so adding a
/// provider means adding a field here and nothing else in the service.
#[derive(Clone)]
pub struct ProviderSet {
    pub gemini: Arc<dyn ImageGenProvider>,
    pub stability: Arc<dyn ImageGenProvider>,
    pub monster: Arc<dyn ImageGenProvider>,
}

impl ProviderSet {
    pub fn get(&self, id: ProviderId) -> Arc<dyn ImageGenProvider> {
        match id {
            ProviderId::Gemini => self.gemini.clone(),
            ProviderId::Stability => self.stability.clone(),
            ProviderId::Monster => self.monster.clone(),
        }
    }

    /// Build the real HTTP adapters, each with its own breaker and timeout.
    pub fn from_config(config: &ImageGenSystemConfig) -> Self {
        let client = Client::new();
        let guard = |id: ProviderId| {
            ProviderGuard::new(
                id,
                &config.circuit_breaker,
                TimeoutGuard::new(config.request_timeout()),
            )
        };

        Self {
            gemini: Arc::new(GeminiImageGenProvider::new(
                &config.provider(ProviderId::Gemini),
                client.clone(),
                guard(ProviderId::Gemini),
            )),
            stability: Arc::new(StabilityImageGenProvider::new(
                &config.provider(ProviderId::Stability),
                client.clone(),
                guard(ProviderId::Stability),
                config.temp_dir(),
                config.max_upload_bytes,
            )),
            monster: Arc::new(MonsterImageGenProvider::new(
                &config.provider(ProviderId::Monster),
                client,
                guard(ProviderId::Monster),
                config.poll_interval(),
            )),
        }
    }
}

/// Uniform entry point for the UI. Resolves the active provider once per
/// call and hands the adapter's result or error back untouched.
#[derive(Clone)]
pub struct ImageGenService {
    selector: Arc<ProviderSelector>,
    providers: ProviderSet,
}

impl ImageGenService {
    pub fn new(selector: Arc<ProviderSelector>, providers: ProviderSet) -> Self {
        Self { selector, providers }
    }

    pub fn init_from_config(config: &ImageGenSystemConfig, store: Arc<dyn PreferenceStore>) -> Self {
        let selector = Arc::new(ProviderSelector::with_fallback(store, config.default_provider));
        let service = Self::new(selector, ProviderSet::from_config(config));
        tracing::info!(
            target: "imagegen",
            active = %service.selector.get_active_provider(),
            timeout_ms = config.request_timeout_ms,
            "Image generation service ready"
        );
        service
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    pub fn list_providers(&self) -> Vec<ProviderInfo> {
        let active = self.selector.get_active_provider();
        ProviderId::ALL
            .iter()
            .map(|id| ProviderInfo {
                id: *id,
                label: id.label().to_string(),
                active: *id == active,
            })
            .collect()
    }

    async fn run(&self, request: GenerationRequest) -> Result<Vec<ImageResult>, ImageGenError> {
        let provider_id = self.selector.get_active_provider();
        let provider = self.providers.get(provider_id);

        tracing::info!(
            target: "imagegen",
            provider = %provider_id,
            samples = request.sample_count,
            image_to_image = request.is_image_to_image(),
            "Generating images"
        );

        let images = provider.generate(&request).await?;
        tracing::info!(target: "imagegen", provider = %provider_id, returned = images.len(), "Generation finished");
        Ok(images)
    }

    pub async fn text_to_image(
        &self,
        prompt: &str,
        sample_count: u32,
        aspect_ratio: AspectRatio,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        self.run(GenerationRequest::text_to_image(prompt, sample_count, aspect_ratio))
            .await
    }

    /// `strength` defaults to 0.75.
    pub async fn image_to_image(
        &self,
        prompt: &str,
        source_image: &str,
        sample_count: u32,
        aspect_ratio: AspectRatio,
        strength: Option<f32>,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        self.run(GenerationRequest::image_to_image(
            prompt,
            source_image,
            sample_count,
            aspect_ratio,
            strength.unwrap_or(DEFAULT_STRENGTH),
        ))
        .await
    }

    /// Inpainting/outpainting. Same backend path as image-to-image with the
    /// editing intent spelled out in the prompt.
    pub async fn edit_image(
        &self,
        prompt: &str,
        source_image: &str,
        sample_count: u32,
        aspect_ratio: AspectRatio,
        strength: Option<f32>,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        let editing_prompt = format!("{}{}", EDIT_PROMPT_PREFIX, prompt);
        self.image_to_image(&editing_prompt, source_image, sample_count, aspect_ratio, strength)
            .await
    }
}
