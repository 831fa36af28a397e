use crate::imagegen::interface::{ImageGenError, ProviderId};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// Seconds from a `Retry-After` header, when the backend sends the
/// delta-seconds form.
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Quota / throttling wording used by the backends' error bodies.
pub fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("rate-limit")
        || lower.contains("ratelimit")
        || lower.contains("resource_exhausted")
        || lower.contains("too many requests")
}

pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Translate a reqwest transport failure. Raw error text is logged, never
/// returned.
pub fn transport_error(provider: ProviderId, e: reqwest::Error) -> ImageGenError {
    tracing::warn!(target: "imagegen", provider = %provider, "Transport error: {}", e);
    if e.is_timeout() {
        ImageGenError::timeout(format!("{} image generation timed out.", provider.label()))
    } else if e.is_decode() {
        ImageGenError::unknown("Image generation failed. The backend returned an unreadable response.")
    } else {
        ImageGenError::unknown(format!(
            "Could not reach {}. Check your connection and try again.",
            provider.label()
        ))
    }
}
