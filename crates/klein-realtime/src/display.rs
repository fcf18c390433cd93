//! Observable UI model published by the session controller.

use klein_core::{Status, Theme, ViewMode};
use serde::Serialize;

/// Everything a front end needs to paint the session.
///
/// The output source is shared by the split and merge output surfaces, so a
/// single `output_src` drives both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    pub status: Status,
    /// Spinner shown while a request is in flight.
    pub generating: bool,
    /// Display-ready `data:` URI of the latest rendered image.
    pub output_src: Option<String>,
    pub output_visible: bool,
    /// "Draw something" placeholder over an empty output pane.
    pub placeholder_visible: bool,
    /// Merge mode only: sketch overlay shown on top of the output.
    pub show_sketch: bool,
    pub view_mode: ViewMode,
    pub theme: Theme,
    pub preset: String,
    /// Number of results rendered since start.
    pub renders: u64,
    /// Number of frames the controller tried to send since start.
    pub attempts: u64,
}

impl DisplayState {
    pub fn new(preset: impl Into<String>, theme: Theme, view_mode: ViewMode) -> Self {
        Self {
            status: Status::DrawSomething,
            generating: false,
            output_src: None,
            output_visible: false,
            placeholder_visible: true,
            show_sketch: false,
            view_mode,
            theme,
            preset: preset.into(),
            renders: 0,
            attempts: 0,
        }
    }

    /// A send has been attempted and has since been answered, rejected or
    /// abandoned. An eager connect alone does not count.
    pub fn is_settled(&self) -> bool {
        self.attempts > 0
            && !self.generating
            && !matches!(self.status, Status::DrawSomething | Status::Generating)
    }
}
