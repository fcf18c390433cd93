//! Core types, config, errors, wire protocol and prompt composition for Klein Realtime.

pub mod config;
pub mod decode;
pub mod error;
pub mod presets;
pub mod prompt;
pub mod protocol;
pub mod types;

pub use decode::to_display_src;
pub use presets::PresetCatalog;
pub use prompt::compose_prompt;
pub use protocol::{
    FrameError, GenerationRequest, GenerationResult, ImageContent, InboundFrame, ResultImage,
};
pub use types::{Palette, Rgb, Status, Theme, ViewMode};
