//! Source image handling for image-to-image requests.
//!
//! The caller hands over whatever reference the picker produced: a plain
//! path, a `file://` URI, or a `data:image/...;base64,` URI from a previous
//! generation.

use super::interface::ImageGenError;
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64: String,
}

/// Split `data:<mime>;base64,<payload>` into its parts. Only image MIME
/// types are accepted.
pub fn parse_data_uri(reference: &str) -> Option<(&str, &str)> {
    let rest = reference.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    if !mime.starts_with("image/") || mime.len() <= "image/".len() || payload.is_empty() {
        return None;
    }
    Some((mime, payload))
}

pub fn is_remote_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

pub fn local_path(reference: &str) -> PathBuf {
    PathBuf::from(reference.strip_prefix("file://").unwrap_or(reference))
}

/// JPEG unless the path ends in `.png`.
pub fn mime_from_path(path: &Path) -> &'static str {
    let is_png = path
        .to_string_lossy()
        .to_ascii_lowercase()
        .ends_with(".png");
    if is_png {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn not_found() -> ImageGenError {
    ImageGenError::invalid_request("Input image not found. Please choose another image.")
}

fn too_large(max_bytes: u64) -> ImageGenError {
    ImageGenError::invalid_request(format!(
        "Input image is too large. Please use an image smaller than {}MB.",
        max_bytes / (1024 * 1024)
    ))
}

/// Load the source image as base64 for embedding in a JSON body.
pub async fn read_inline(reference: &str) -> Result<InlineImage, ImageGenError> {
    if let Some((mime, payload)) = parse_data_uri(reference) {
        return Ok(InlineImage {
            mime_type: mime.to_string(),
            base64: payload.to_string(),
        });
    }

    let path = local_path(reference);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!(target: "imagegen", "Failed to read source image {}: {}", path.display(), e);
        not_found()
    })?;

    Ok(InlineImage {
        mime_type: mime_from_path(&path).to_string(),
        base64: general_purpose::STANDARD.encode(bytes),
    })
}

/// A source image resolved to a file on disk, ready for upload.
#[derive(Debug)]
pub struct MaterializedImage {
    pub path: PathBuf,
    pub size: u64,
    temporary: bool,
}

impl MaterializedImage {
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Remove the file if it was written by [`materialize`].
    pub async fn cleanup(self) {
        if self.temporary {
            if let Err(e) = tokio::fs::remove_file(&self.path).await {
                tracing::debug!(target: "imagegen", "Failed to remove temp image {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Resolve `reference` to a local file, decoding data URIs into `temp_dir`,
/// and enforce `max_bytes`.
pub async fn materialize(
    reference: &str,
    temp_dir: &Path,
    max_bytes: u64,
) -> Result<MaterializedImage, ImageGenError> {
    let image = match parse_data_uri(reference) {
        Some((mime, payload)) => {
            let bytes = general_purpose::STANDARD.decode(payload.trim()).map_err(|e| {
                tracing::warn!(target: "imagegen", "Source data URI is not valid base64: {}", e);
                ImageGenError::invalid_request("Input image could not be read. Please choose another image.")
            })?;
            if bytes.len() as u64 > max_bytes {
                return Err(too_large(max_bytes));
            }

            let extension = if mime.contains("png") { "png" } else { "jpg" };
            let filename = format!(
                "input-{}_{}.{}",
                chrono::Utc::now().format("%Y%m%d_%H%M%S"),
                uuid::Uuid::new_v4(),
                extension
            );
            tokio::fs::create_dir_all(temp_dir).await.map_err(|e| {
                ImageGenError::unknown(format!("Failed to prepare temp directory: {}", e))
            })?;
            let path = temp_dir.join(filename);
            tokio::fs::write(&path, &bytes).await.map_err(|e| {
                ImageGenError::unknown(format!("Failed to stage input image: {}", e))
            })?;

            MaterializedImage {
                path,
                size: bytes.len() as u64,
                temporary: true,
            }
        }
        None => {
            let path = local_path(reference);
            let meta = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
            if !meta.is_file() {
                return Err(not_found());
            }
            MaterializedImage {
                path,
                size: meta.len(),
                temporary: false,
            }
        }
    };

    if image.size > max_bytes {
        image.cleanup().await;
        return Err(too_large(max_bytes));
    }

    Ok(image)
}
