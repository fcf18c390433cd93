use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status line shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    DrawSomething,
    Listening,
    Generating,
    Ready,
    SendError,
    ConnectionError,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DrawSomething => "draw something",
            Self::Listening => "listening...",
            Self::Generating => "generating...",
            Self::Ready => "ready",
            Self::SendError => "send error",
            Self::ConnectionError => "connection error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Color theme of the drawing surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn is_light(&self) -> bool {
        matches!(self, Self::Light)
    }

    pub fn palette(&self) -> Palette {
        match self {
            Self::Light => Palette {
                canvas_bg: Rgb::from_hex(0xf5f5f5),
                stroke: Rgb::from_hex(0x111111),
            },
            Self::Dark => Palette {
                canvas_bg: Rgb::from_hex(0x111111),
                stroke: Rgb::from_hex(0xffffff),
            },
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

/// How the sketch and the rendered output are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Sketch and output side by side.
    #[default]
    Split,
    /// Output overlays the sketch; the sketch shows through while drawing.
    Merge,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "split" => Ok(Self::Split),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown view mode '{other}' (expected split or merge)")),
        }
    }
}

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8])
    }

    pub fn to_css(&self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// Colors used to paint the drawing surface for a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub canvas_bg: Rgb,
    pub stroke: Rgb,
}
