//! Realtime generation wire protocol.
//!
//! Requests go out as msgpack binary frames over the realtime WebSocket and
//! results come back the same way, with image content as raw `bin` bytes.
//! JSON text frames are understood too. The service also interleaves its own
//! control frames, tagged with a `type` of `x-fal-message` or `x-fal-error`.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const SERVICE_MESSAGE: &str = "x-fal-message";
const SERVICE_ERROR: &str = "x-fal-error";

/// Output geometry requested from the service.
pub const IMAGE_SIZE: &str = "square";
/// Diffusion steps per frame; kept low for realtime latency.
pub const NUM_INFERENCE_STEPS: u32 = 3;
/// Fixed seed so consecutive frames stay visually stable.
pub const SEED: u64 = 35;
/// How strongly the previous output feeds into the next frame.
pub const OUTPUT_FEEDBACK_STRENGTH: f32 = 1.0;

/// Outbound generation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub image_url: String,
    pub prompt: String,
    pub image_size: String,
    pub num_inference_steps: u32,
    pub seed: u64,
    pub output_feedback_strength: f32,
}

impl GenerationRequest {
    pub fn new(image_url: String, prompt: String) -> Self {
        Self {
            image_url,
            prompt,
            image_size: IMAGE_SIZE.to_string(),
            num_inference_steps: NUM_INFERENCE_STEPS,
            seed: SEED,
            output_feedback_strength: OUTPUT_FEEDBACK_STRENGTH,
        }
    }

    /// Binary frame payload.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, FrameError> {
        rmp_serde::to_vec_named(self).map_err(FrameError::from)
    }
}

/// Inbound generation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ResultImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl GenerationResult {
    /// True when the payload carries an error indicator rather than images.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(is_truthy) || self.status.as_deref() == Some("error")
    }

    /// The image to display: the last one produced, if any.
    pub fn latest_image(&self) -> Option<&ResultImage> {
        self.images.as_deref().and_then(|images| images.last())
    }
}

/// A single produced image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ImageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ResultImage {
    pub fn has_content(&self) -> bool {
        match &self.content {
            None => false,
            Some(ImageContent::Text(text)) => !text.is_empty(),
            Some(ImageContent::Bytes(bytes)) => !bytes.is_empty(),
            Some(ImageContent::Other(value)) => is_truthy(value),
        }
    }
}

/// Image payload as delivered by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageContent {
    /// Base64 payload or a complete data URI.
    Text(#[serde(deserialize_with = "text_only")] String),
    /// Raw encoded image bytes: msgpack `bin`, or a JSON array of octets.
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Anything else; not displayable.
    Other(serde_json::Value),
}

/// Accepts only real strings, so a `bin` payload that happens to be valid
/// UTF-8 still lands in [`ImageContent::Bytes`].
fn text_only<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct TextVisitor;

    impl Visitor<'_> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }
    }

    deserializer.deserialize_string(TextVisitor)
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Result(GenerationResult),
    /// Informational service frame, carries nothing to render.
    ServiceMessage(serde_json::Value),
    /// Service-level failure reported in-band.
    ServiceError { error: String, reason: Option<String> },
}

#[derive(Deserialize)]
struct FrameKind {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct ServiceErrorFrame {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<ServiceErrorFrame> for InboundFrame {
    fn from(frame: ServiceErrorFrame) -> Self {
        let error = match frame.error {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        };
        Self::ServiceError {
            error,
            reason: frame.reason,
        }
    }
}

impl InboundFrame {
    /// Decode a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some(SERVICE_MESSAGE) => Ok(Self::ServiceMessage(value)),
            Some(SERVICE_ERROR) => Ok(serde_json::from_value::<ServiceErrorFrame>(value)?.into()),
            _ => Ok(Self::Result(serde_json::from_value(value)?)),
        }
    }

    /// Decode a msgpack binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let kind: FrameKind = rmp_serde::from_slice(bytes)?;
        match kind.kind.as_deref() {
            Some(SERVICE_MESSAGE) => Ok(Self::ServiceMessage(
                rmp_serde::from_slice(bytes).unwrap_or_default(),
            )),
            Some(SERVICE_ERROR) => Ok(rmp_serde::from_slice::<ServiceErrorFrame>(bytes)?.into()),
            _ => Ok(Self::Result(rmp_serde::from_slice(bytes)?)),
        }
    }
}

/// JavaScript-style truthiness, which is what the service's error flags use.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = GenerationRequest::new("data:image/jpeg;base64,AAAA".into(), "ink".into());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "image_url": "data:image/jpeg;base64,AAAA",
                "prompt": "ink",
                "image_size": "square",
                "num_inference_steps": 3,
                "seed": 35,
                "output_feedback_strength": 1.0,
            })
        );
    }

    #[test]
    fn test_result_error_flags() {
        let r: GenerationResult = serde_json::from_value(json!({"error": true})).unwrap();
        assert!(r.is_error());

        let r: GenerationResult = serde_json::from_value(json!({"status": "error"})).unwrap();
        assert!(r.is_error());

        let r: GenerationResult =
            serde_json::from_value(json!({"error": null, "images": []})).unwrap();
        assert!(!r.is_error());
        assert!(r.latest_image().is_none());
    }

    #[test]
    fn test_latest_image_is_last() {
        let r: GenerationResult = serde_json::from_value(json!({
            "images": [
                {"content": "first"},
                {"content": "second", "content_type": "image/png"}
            ]
        }))
        .unwrap();
        let img = r.latest_image().unwrap();
        assert_eq!(img.content, Some(ImageContent::Text("second".into())));
        assert_eq!(img.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_content_shapes() {
        let img: ResultImage = serde_json::from_value(json!({"content": [1, 2, 3]})).unwrap();
        assert_eq!(img.content, Some(ImageContent::Bytes(vec![1, 2, 3])));

        let img: ResultImage = serde_json::from_value(json!({"content": {"url": "x"}})).unwrap();
        assert!(matches!(img.content, Some(ImageContent::Other(_))));

        let img: ResultImage = serde_json::from_value(json!({"content": ""})).unwrap();
        assert!(!img.has_content());

        let img: ResultImage = serde_json::from_value(json!({})).unwrap();
        assert!(!img.has_content());
    }

    #[test]
    fn test_parse_service_frames() {
        let frame = InboundFrame::parse(r#"{"type":"x-fal-message","message":"ok"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::ServiceMessage(_)));

        let frame =
            InboundFrame::parse(r#"{"type":"x-fal-error","error":"TIMEOUT","reason":"idle"}"#)
                .unwrap();
        match frame {
            InboundFrame::ServiceError { error, reason } => {
                assert_eq!(error, "TIMEOUT");
                assert_eq!(reason.as_deref(), Some("idle"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let frame = InboundFrame::parse(r#"{"images":[{"content":"abc"}]}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Result(_)));

        assert!(InboundFrame::parse("not json").is_err());
    }

    #[derive(Serialize)]
    struct BinImage {
        content: serde_bytes::ByteBuf,
        content_type: &'static str,
    }

    #[derive(Serialize)]
    struct BinResult {
        images: Vec<BinImage>,
    }

    #[test]
    fn test_decode_msgpack_bin_image() {
        let frame = BinResult {
            images: vec![BinImage {
                content: serde_bytes::ByteBuf::from(vec![0xff, 0xd8, 0xff]),
                content_type: "image/jpeg",
            }],
        };
        let bytes = rmp_serde::to_vec_named(&frame).unwrap();

        match InboundFrame::decode(&bytes).unwrap() {
            InboundFrame::Result(result) => {
                let img = result.latest_image().unwrap();
                assert_eq!(img.content, Some(ImageContent::Bytes(vec![0xff, 0xd8, 0xff])));
                assert_eq!(img.content_type.as_deref(), Some("image/jpeg"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_utf8_bin_stays_bytes() {
        let frame = BinResult {
            images: vec![BinImage {
                content: serde_bytes::ByteBuf::from(b"abc".to_vec()),
                content_type: "image/png",
            }],
        };
        let bytes = rmp_serde::to_vec_named(&frame).unwrap();

        let InboundFrame::Result(result) = InboundFrame::decode(&bytes).unwrap() else {
            panic!("expected result");
        };
        assert_eq!(
            result.latest_image().unwrap().content,
            Some(ImageContent::Bytes(b"abc".to_vec()))
        );
    }

    #[test]
    fn test_decode_msgpack_service_frames() {
        let bytes = rmp_serde::to_vec_named(&json!({"type": "x-fal-error", "error": "TIMEOUT"})).unwrap();
        match InboundFrame::decode(&bytes).unwrap() {
            InboundFrame::ServiceError { error, reason } => {
                assert_eq!(error, "TIMEOUT");
                assert!(reason.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let bytes = rmp_serde::to_vec_named(&json!({"type": "x-fal-message", "message": "ok"})).unwrap();
        assert!(matches!(InboundFrame::decode(&bytes).unwrap(), InboundFrame::ServiceMessage(_)));

        assert!(InboundFrame::decode(&[0xc1]).is_err());
    }

    #[test]
    fn test_request_msgpack_round_trip() {
        let req = GenerationRequest::new("data:image/jpeg;base64,AAAA".into(), "ink".into());
        let decoded: GenerationRequest = rmp_serde::from_slice(&req.to_msgpack().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }
}
