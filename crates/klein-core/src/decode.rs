//! Turn result images into displayable data URIs.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use tracing::error;

use crate::protocol::{ImageContent, ResultImage};

/// MIME type assumed when the service omits `content_type`.
pub const DEFAULT_MIME: &str = "image/jpeg";

/// Raw payloads are fed to the encoder in slices of this size.
pub const ENCODE_CHUNK_SIZE: usize = 0x8000;

/// Convert a result image into a `data:` URI, or `None` if the content
/// has a shape we cannot display.
pub fn to_display_src(image: &ResultImage) -> Option<String> {
    let mime = image.content_type.as_deref().unwrap_or(DEFAULT_MIME);
    match image.content.as_ref()? {
        ImageContent::Text(content) if content.starts_with("data:") => Some(content.clone()),
        ImageContent::Text(content) => Some(format!("data:{mime};base64,{content}")),
        ImageContent::Bytes(bytes) => match encode_chunked(bytes) {
            Ok(encoded) => Some(format!("data:{mime};base64,{encoded}")),
            Err(e) => {
                error!(error = %e, "Failed to encode image bytes");
                None
            }
        },
        ImageContent::Other(value) => {
            error!(content = %value, "Unsupported image content type");
            None
        }
    }
}

/// Base64-encode `bytes` in fixed-size slices. The streaming encoder carries
/// partial groups across slices, so the output matches a one-shot encode.
pub fn encode_chunked(bytes: &[u8]) -> std::io::Result<String> {
    let mut encoder = EncoderStringWriter::new(&STANDARD);
    for chunk in bytes.chunks(ENCODE_CHUNK_SIZE) {
        encoder.write_all(chunk)?;
    }
    Ok(encoder.into_inner())
}
