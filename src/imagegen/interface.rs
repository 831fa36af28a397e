use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_STRENGTH: f32 = 0.75;

// ── Error Types ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing or placeholder credentials. Raised before any network call.
    ConfigError,
    Unauthorized,
    RateLimited,
    InvalidRequest,
    Timeout,
    CircuitOpen,
    Unknown,
}

/// The only error shape adapters hand back to callers. The message is
/// user-presentable; backend-specific details go to the log instead.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ImageGenError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after_secs: Option<u64>,
}

impl ImageGenError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn circuit_open(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::new(ErrorKind::CircuitOpen, message).with_retry_after(Some(retry_after_secs))
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }
}

// ── Providers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Gemini `generateContent`: synchronous JSON with inline base64 images.
    Gemini,
    /// Stability AI SD3: synchronous multipart upload.
    Stability,
    /// MonsterAPI: asynchronous submit/poll job API.
    Monster,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Gemini, ProviderId::Stability, ProviderId::Monster];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Stability => "stability",
            ProviderId::Monster => "monster",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "Gemini (Nano Banana)",
            ProviderId::Stability => "Stability AI",
            ProviderId::Monster => "MonsterAPI",
        }
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        ProviderId::Gemini
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "stability" => Ok(ProviderId::Stability),
            "monster" => Ok(ProviderId::Monster),
            other => Err(format!("Unknown image provider: {}", other)),
        }
    }
}

// ── Generation Parameters ──────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
}

impl AspectRatio {
    /// Ratio token understood by backends with a native aspect parameter.
    pub fn ratio_token(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }

    /// Composition hint for backends that only take a prompt.
    pub fn composition_hint(&self) -> &'static str {
        match self {
            AspectRatio::Square => "Generate the output in a square composition (1:1).",
            AspectRatio::Landscape => "Generate the output in a landscape composition (16:9).",
            AspectRatio::Portrait => "Generate the output in a portrait composition (9:16).",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Square => "square",
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub sample_count: u32,
    pub aspect_ratio: AspectRatio,
    /// File path, `file://` URI, `data:` URI or http(s) URL.
    pub source_image: Option<String>,
    pub strength: f32,
}

impl GenerationRequest {
    pub fn text_to_image(prompt: impl Into<String>, sample_count: u32, aspect_ratio: AspectRatio) -> Self {
        Self {
            prompt: prompt.into(),
            sample_count: sample_count.max(1),
            aspect_ratio,
            source_image: None,
            strength: DEFAULT_STRENGTH,
        }
    }

    pub fn image_to_image(
        prompt: impl Into<String>,
        source_image: impl Into<String>,
        sample_count: u32,
        aspect_ratio: AspectRatio,
        strength: f32,
    ) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            DEFAULT_STRENGTH
        };
        Self {
            prompt: prompt.into(),
            sample_count: sample_count.max(1),
            aspect_ratio,
            source_image: Some(source_image.into()),
            strength,
        }
    }

    pub fn is_image_to_image(&self) -> bool {
        self.source_image.is_some()
    }

    /// Prompt sent for the `index`-th sample (zero-based).
    pub fn sample_prompt(&self, index: u32) -> String {
        let variation = index + 1;
        if self.is_image_to_image() {
            format!(
                "{}\nTransform strength: {}. Variation {}.",
                self.prompt, self.strength, variation
            )
        } else {
            format!("{}\nVariation {}.", self.prompt, variation)
        }
    }
}

// ── Provider Response ──────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    pub mime_type: String, // "image/png", "image/jpeg"
    pub data: Vec<u8>,     // Raw image bytes
}

impl ImageResult {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Decode a base64 payload as returned inline by the JSON backends.
    pub fn from_base64(mime_type: impl Into<String>, payload: &str) -> Result<Self, ImageGenError> {
        let data = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| {
                tracing::warn!(target: "imagegen", "Base64 decode failed: {}", e);
                ImageGenError::unknown("Image generation failed. The backend returned corrupt image data.")
            })?;
        Ok(Self::new(mime_type, data))
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.data)
        )
    }
}

// ── Provider Trait ──────────────────────────────────────

#[async_trait]
pub trait ImageGenProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// One backend round trip for one sample. An empty vec means the backend
    /// answered without an image.
    async fn generate_sample(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResult>, ImageGenError>;

    /// Run the sample loop: `sample_count` sequential calls, each with its own
    /// variation marker. Empty samples are skipped; the first error aborts the
    /// remaining samples and is returned as-is.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ImageResult>, ImageGenError> {
        let total = request.sample_count.max(1);
        let mut images = Vec::with_capacity(total as usize);

        for index in 0..total {
            let prompt = request.sample_prompt(index);
            let generated = self.generate_sample(&prompt, request).await?;
            match generated.into_iter().next() {
                Some(image) => images.push(image),
                None => tracing::debug!(
                    target: "imagegen",
                    provider = %self.id(),
                    sample = index + 1,
                    "Backend returned no image, skipping sample"
                ),
            }
        }

        Ok(images)
    }
}
