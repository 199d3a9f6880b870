use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::models::UserId;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Blob storage for meal and profile images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;

    async fn presign_download_url(&self, key: &str, ttl_seconds: u64) -> anyhow::Result<String>;
}

/// File extension for an accepted image content type.
pub fn image_extension(content_type: &str) -> CoreResult<&'static str> {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        "image/heic" => Ok("heic"),
        "image/gif" => Ok("gif"),
        _ => Err(CoreError::validation(format!(
            "Unsupported image type '{content_type}'"
        ))),
    }
}

/// Content type for a stored key, from its extension.
#[must_use]
pub fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next().unwrap_or_default() {
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

pub fn validate_image(bytes: &[u8], content_type: &str) -> CoreResult<&'static str> {
    if bytes.is_empty() {
        return Err(CoreError::validation("Image is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(CoreError::validation("Image exceeds 5 MB"));
    }
    image_extension(content_type)
}

fn key_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `users/{user}/{kind}/{timestamp}_{hash}.{ext}`, stable for the same bytes and instant.
#[must_use]
pub fn object_key(user: &UserId, kind: &str, bytes: &[u8], ext: &str, at: DateTime<Utc>) -> String {
    let digest = Sha256::digest(bytes);
    let hash: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "users/{}/{}/{}_{hash}.{ext}",
        key_segment(user.as_str()),
        key_segment(kind),
        at.timestamp_millis()
    )
}

/// Keys that are already absolute URLs are served as-is.
#[must_use]
pub fn is_external_url(key: &str) -> bool {
    key.starts_with("http://") || key.starts_with("https://")
}
