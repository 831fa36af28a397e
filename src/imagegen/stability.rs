//! Stability AI SD3 provider.
//!
//! Uses the multipart `stable-image/generate/sd3` endpoint. Image-to-image
//! uploads the source as a file part; aspect ratio is only sent for pure
//! text-to-image because the backend derives it from the input otherwise.

use crate::imagegen::config::ImageGenProviderConfig;
use crate::imagegen::interface::{
    GenerationRequest, ImageGenError, ImageGenProvider, ImageResult, ProviderId,
};
use crate::imagegen::resilience::ProviderGuard;
use crate::imagegen::source;
use crate::utils::http::{is_auth_failure, mentions_rate_limit, retry_after_secs, transport_error};
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_BASE_URL: &str = "https://api.stability.ai/v2beta/stable-image/generate/sd3";
const DEFAULT_MODEL: &str = "sd3.5-flash";

pub struct StabilityImageGenProvider {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temp_dir: PathBuf,
    max_upload_bytes: u64,
    client: Client,
    guard: ProviderGuard,
}

#[derive(Deserialize)]
struct StabilityResponse {
    image: Option<String>,
}

impl StabilityImageGenProvider {
    pub fn new(
        config: &ImageGenProviderConfig,
        client: Client,
        guard: ProviderGuard,
        temp_dir: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            api_key: config.resolve_api_key(),
            endpoint: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temp_dir,
            max_upload_bytes,
            client,
            guard,
        }
    }

    pub fn guard(&self) -> &ProviderGuard {
        &self.guard
    }

    fn ensure_api_key(&self) -> Result<&str, ImageGenError> {
        self.api_key.as_deref().ok_or_else(|| {
            ImageGenError::config(
                "Stability API key not configured. Set STABILITY_API_KEY or update the image generation config.",
            )
        })
    }

    async fn build_form(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<multipart::Form, ImageGenError> {
        let form = multipart::Form::new()
            .text("prompt", prompt.to_string())
            .text("model", self.model.clone())
            .text("output_format", "png");

        let Some(reference) = request.source_image.as_deref() else {
            return Ok(form.text("aspect_ratio", request.aspect_ratio.ratio_token()));
        };

        let staged = source::materialize(reference, &self.temp_dir, self.max_upload_bytes).await?;
        let read = tokio::fs::read(&staged.path).await;
        staged.cleanup().await;
        let bytes = read.map_err(|e| {
            tracing::warn!(target: "imagegen", provider = "stability", "Failed to read input image: {}", e);
            ImageGenError::invalid_request("Input image not found. Please choose another image.")
        })?;

        let image_part = multipart::Part::bytes(bytes)
            .file_name("input.png")
            .mime_str("image/png")
            .map_err(|e| ImageGenError::unknown(format!("MIME error: {}", e)))?;

        Ok(form
            .text("mode", "image-to-image")
            .text("strength", request.strength.to_string())
            .part("image", image_part))
    }

    async fn call_model(&self, api_key: &str, form: multipart::Form) -> Result<Vec<ImageResult>, ImageGenError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Stability, e))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(ProviderId::Stability, e))?;

        if !status.is_success() {
            tracing::error!(target: "imagegen", provider = "stability", status = status.as_u16(), "Stability API error: {}", body);
            return Err(sanitize_error(status, &body).with_retry_after(retry_after));
        }

        let parsed: StabilityResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(target: "imagegen", provider = "stability", "Invalid JSON: {}", e);
            ImageGenError::unknown("Image generation failed. Please try again.")
        })?;

        match parsed.image.filter(|s| !s.is_empty()) {
            Some(b64) => Ok(vec![ImageResult::from_base64("image/png", &b64)?]),
            None => Err(ImageGenError::unknown("Image generation failed. Please try again.")),
        }
    }
}

pub(crate) fn sanitize_error(status: StatusCode, body: &str) -> ImageGenError {
    if is_auth_failure(status) {
        return ImageGenError::unauthorized("Stability API key is invalid or unauthorized.");
    }
    if status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(body) {
        return ImageGenError::rate_limited("Stability AI is temporarily busy. Please try again in a moment.");
    }
    if status == StatusCode::BAD_REQUEST {
        return ImageGenError::invalid_request(
            "Invalid image generation request. Please review your prompt and input image.",
        );
    }
    ImageGenError::unknown("Image generation failed. Please try again.")
}

#[async_trait]
impl ImageGenProvider for StabilityImageGenProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Stability
    }

    async fn generate_sample(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        let api_key = self.ensure_api_key()?;
        let form = self.build_form(prompt, request).await?;

        tracing::info!(
            target: "imagegen",
            provider = "stability",
            model = %self.model,
            image_to_image = request.is_image_to_image(),
            "Requesting image"
        );
        self.guard.run(self.call_model(api_key, form)).await
    }
}
