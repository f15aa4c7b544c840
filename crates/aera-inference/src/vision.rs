//! Image description through multimodal chat models.

use async_trait::async_trait;
use base64::Engine;

use aera_core::{Error, Result};

/// Prompt used when the caller does not supply one.
pub const DEFAULT_DESCRIBE_PROMPT: &str =
    "Describe this image in detail. Include any text visible in the image.";

/// Image types the providers accept inline.
const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/gif",
];

/// Describes image bytes in prose.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn describe_image(
        &self,
        image_data: &[u8],
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String>;

    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;
}

/// Base64 payload for an inline image, after checking the type and size.
pub(crate) fn encode_image(image_data: &[u8], mime_type: &str) -> Result<String> {
    if image_data.is_empty() {
        return Err(Error::InvalidInput("Image data is empty".to_string()));
    }
    let mime = mime_type.trim().to_ascii_lowercase();
    if !SUPPORTED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(Error::InvalidInput(format!(
            "Unsupported image type: {}",
            mime_type
        )));
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(image_data))
}

/// `data:` URL form used by OpenAI-compatible chat APIs.
pub(crate) fn image_data_url(image_data: &[u8], mime_type: &str) -> Result<String> {
    let payload = encode_image(image_data, mime_type)?;
    Ok(format!("data:{};base64,{}", mime_type.trim(), payload))
}
