use crate::imagegen::config::ImageGenProviderConfig;
use crate::imagegen::interface::{
    GenerationRequest, ImageGenError, ImageGenProvider, ImageResult, ProviderId,
};
use crate::imagegen::resilience::ProviderGuard;
use crate::imagegen::source;
use crate::utils::http::{is_auth_failure, mentions_rate_limit, retry_after_secs, transport_error};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

/// Gemini `generateContent` with image output: one synchronous JSON round
/// trip, images come back inline as base64 parts.
pub struct GeminiImageGenProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
    guard: ProviderGuard,
}

impl GeminiImageGenProvider {
    pub fn new(config: &ImageGenProviderConfig, client: Client, guard: ProviderGuard) -> Self {
        let model = config
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            api_key: config.resolve_api_key(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
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
                "Gemini API key not configured. Set GEMINI_API_KEY or update the image generation config.",
            )
        })
    }

    async fn call_model(&self, api_key: &str, body: &Value) -> Result<Vec<ImageResult>, ImageGenError> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let res = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Gemini, e))?;

        let status = res.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(res.headers());
            let text = res.text().await.unwrap_or_default();
            tracing::error!(target: "imagegen", provider = "gemini", status = status.as_u16(), "Gemini API error: {}", text);
            return Err(classify_error(status, &text).with_retry_after(retry_after));
        }

        let json: Value = res
            .json()
            .await
            .map_err(|e| transport_error(ProviderId::Gemini, e))?;

        // Structure: { "candidates": [ { "content": { "parts": [ { "inlineData": { ... } } ] } } ] }
        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        extract_inline_images(&parts)
    }
}

/// Collect every inline image part. Both `inlineData`/`mimeType` and
/// `inline_data`/`mime_type` spellings occur in the wild.
pub(crate) fn extract_inline_images(parts: &[Value]) -> Result<Vec<ImageResult>, ImageGenError> {
    let mut images = Vec::new();
    for part in parts {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let Some(data) = inline.get("data").and_then(|v| v.as_str()) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(|v| v.as_str())
            .unwrap_or("image/png");
        images.push(ImageResult::from_base64(mime_type, data)?);
    }
    Ok(images)
}

/// Map a failed `generateContent` response onto the shared taxonomy.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> ImageGenError {
    if is_auth_failure(status) {
        return ImageGenError::unauthorized("Gemini API key is invalid or unauthorized.");
    }
    if status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(body) {
        return ImageGenError::rate_limited("Gemini is temporarily busy. Please try again in a moment.");
    }
    let lower = body.to_lowercase();
    if status == StatusCode::BAD_REQUEST
        || lower.contains("invalid_argument")
        || lower.contains("invalid argument")
        || lower.contains("malformed")
    {
        return ImageGenError::invalid_request(
            "Invalid image generation request. Please review your prompt and input image.",
        );
    }
    ImageGenError::unknown("Image generation failed. Please try again.")
}

#[async_trait]
impl ImageGenProvider for GeminiImageGenProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn generate_sample(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        let api_key = self.ensure_api_key()?;

        let mut parts = vec![json!({
            "text": format!(
                "{}\n\n{}\nReturn an image as output.",
                prompt,
                request.aspect_ratio.composition_hint()
            )
        })];

        if let Some(reference) = request.source_image.as_deref() {
            let image = source::read_inline(reference).await?;
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.base64,
                }
            }));
        }

        let body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": parts
                }
            ],
            "generationConfig": {
                "temperature": 0.8
            }
        });

        tracing::info!(target: "imagegen", provider = "gemini", model = %self.model, "Requesting image");
        self.guard.run(self.call_model(api_key, &body)).await
    }
}
