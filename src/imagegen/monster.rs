//! MonsterAPI provider.
//!
//! Job-style API: `add-task` accepts a job and hands back a `process_id`,
//! then `task-status` is polled until the job reports `COMPLETED`. The whole
//! submit + poll sequence runs under one timeout guard, and polls are spaced
//! by a fixed interval.

use crate::imagegen::config::ImageGenProviderConfig;
use crate::imagegen::interface::{
    GenerationRequest, ImageGenError, ImageGenProvider, ImageResult, ProviderId,
};
use crate::imagegen::resilience::ProviderGuard;
use crate::imagegen::source;
use crate::utils::http::{is_auth_failure, mentions_rate_limit, retry_after_secs, transport_error};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.monsterapi.ai/apis";
const DEFAULT_MODEL: &str = "txt2img";
const ACCEPTED_MESSAGE: &str = "Request accepted successfully";
const STATUS_COMPLETED: &str = "COMPLETED";
const STATUS_FAILED: &str = "FAILED";

const STEPS: u32 = 50;
const SEED: i64 = 2414;
const GUIDANCE_SCALE: f32 = 7.5;

pub struct MonsterImageGenProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    poll_interval: Duration,
    client: Client,
    guard: ProviderGuard,
}

#[derive(Serialize)]
struct AddTaskRequest<'a> {
    model: &'a str,
    data: TaskData<'a>,
}

#[derive(Serialize)]
struct TaskData<'a> {
    prompt: &'a str,
    negprompt: &'a str,
    samples: u32,
    steps: u32,
    aspect_ratio: &'a str,
    guidance_scale: f32,
    seed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f32>,
}

#[derive(Deserialize)]
struct AddTaskResponse {
    #[serde(default)]
    message: String,
    process_id: Option<String>,
}

#[derive(Deserialize)]
struct TaskStatusResponse {
    response_data: Option<TaskStatusData>,
}

#[derive(Deserialize)]
struct TaskStatusData {
    #[serde(default)]
    status: String,
    result: Option<TaskResult>,
}

#[derive(Deserialize)]
struct TaskResult {
    #[serde(default)]
    output: Vec<String>,
}

impl MonsterImageGenProvider {
    pub fn new(
        config: &ImageGenProviderConfig,
        client: Client,
        guard: ProviderGuard,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api_key: config.resolve_api_key(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            poll_interval,
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
                "MonsterAPI key not configured. Set MONSTER_API_KEY or update the image generation config.",
            )
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        api_key: &str,
        url: &str,
        body: &T,
    ) -> Result<Response, ImageGenError> {
        let res = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Monster, e))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let retry_after = retry_after_secs(res.headers());
        let text = res.text().await.unwrap_or_default();
        tracing::error!(target: "imagegen", provider = "monster", status = status.as_u16(), "MonsterAPI error: {}", text);
        Err(classify_error(status, &text).with_retry_after(retry_after))
    }

    async fn submit(&self, api_key: &str, body: &AddTaskRequest<'_>) -> Result<String, ImageGenError> {
        let res = self.post_json(api_key, &self.endpoint("add-task"), body).await?;
        let accepted: AddTaskResponse = res
            .json()
            .await
            .map_err(|e| transport_error(ProviderId::Monster, e))?;

        match accepted.process_id {
            Some(id) if accepted.message == ACCEPTED_MESSAGE && !id.is_empty() => Ok(id),
            _ => {
                tracing::warn!(target: "imagegen", provider = "monster", "Job rejected: {}", accepted.message);
                Err(ImageGenError::unknown("Request was not accepted. Please try again."))
            }
        }
    }

    /// Poll until the job completes or fails. Always runs inside the
    /// provider guard, whose deadline covers submit, polling and download.
    async fn wait_for_output(&self, api_key: &str, process_id: &str) -> Result<Vec<String>, ImageGenError> {
        let url = self.endpoint("task-status");
        let body = serde_json::json!({ "process_id": process_id });
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let res = self.post_json(api_key, &url, &body).await?;
            let status: TaskStatusResponse = res
                .json()
                .await
                .map_err(|e| transport_error(ProviderId::Monster, e))?;
            let data = status.response_data;
            let state = data.as_ref().map(|d| d.status.clone()).unwrap_or_default();

            if state == STATUS_COMPLETED {
                tracing::info!(target: "imagegen", provider = "monster", process_id, polls, "Job completed");
                return Ok(data
                    .and_then(|d| d.result)
                    .map(|r| r.output)
                    .unwrap_or_default());
            }
            if state == STATUS_FAILED {
                tracing::warn!(target: "imagegen", provider = "monster", process_id, "Job failed");
                return Err(ImageGenError::unknown("Image generation failed. Please try again."));
            }

            tracing::debug!(target: "imagegen", provider = "monster", process_id, state = %state, polls, "Job pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn download(&self, url: &str) -> Result<ImageResult, ImageGenError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Monster, e))?;

        if !res.status().is_success() {
            tracing::error!(target: "imagegen", provider = "monster", status = res.status().as_u16(), "Output download failed: {}", url);
            return Err(ImageGenError::unknown("Image generation failed. Please try again."));
        }

        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = res
            .bytes()
            .await
            .map_err(|e| transport_error(ProviderId::Monster, e))?;

        Ok(ImageResult::new(mime_type, bytes.to_vec()))
    }

    async fn run_job(&self, api_key: &str, body: &AddTaskRequest<'_>) -> Result<Vec<ImageResult>, ImageGenError> {
        let process_id = self.submit(api_key, body).await?;
        let outputs = self.wait_for_output(api_key, &process_id).await?;

        let mut images = Vec::with_capacity(outputs.len());
        for url in &outputs {
            images.push(self.download(url).await?);
        }
        Ok(images)
    }
}

pub(crate) fn classify_error(status: StatusCode, body: &str) -> ImageGenError {
    if is_auth_failure(status) {
        return ImageGenError::unauthorized("MonsterAPI credentials are invalid or unauthorized.");
    }
    if status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(body) {
        return ImageGenError::rate_limited("MonsterAPI is temporarily busy. Please try again in a moment.");
    }
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        return ImageGenError::invalid_request(
            "Invalid image generation request. Please review your prompt and input image.",
        );
    }
    ImageGenError::unknown("Image generation failed. Please try again.")
}

#[async_trait]
impl ImageGenProvider for MonsterImageGenProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Monster
    }

    async fn generate_sample(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResult>, ImageGenError> {
        let api_key = self.ensure_api_key()?;

        // The job backend fetches the init image itself, so it needs a URL.
        let init_image_url = match request.source_image.as_deref() {
            Some(reference) if source::is_remote_url(reference) || source::parse_data_uri(reference).is_some() => {
                Some(reference)
            }
            Some(_) => {
                return Err(ImageGenError::invalid_request(
                    "MonsterAPI needs a publicly reachable image URL for image-to-image.",
                ))
            }
            None => None,
        };

        let body = AddTaskRequest {
            model: &self.model,
            data: TaskData {
                prompt,
                negprompt: "",
                samples: 1,
                steps: STEPS,
                aspect_ratio: request.aspect_ratio.label(),
                guidance_scale: GUIDANCE_SCALE,
                seed: SEED,
                init_image_url,
                strength: init_image_url.map(|_| request.strength),
            },
        };

        tracing::info!(target: "imagegen", provider = "monster", model = %self.model, "Submitting job");
        self.guard.run(self.run_job(api_key, &body)).await
    }
}
