//! Drawing surface and frame capture.
//!
//! The surface is a plain RGBA raster that pointer input paints into. Capture
//! normalizes it into the fixed-size JPEG frame the realtime model expects.

pub mod capture;
pub mod surface;

pub use capture::{CaptureError, CapturedFrame, FrameCapture, Placement};
pub use surface::DrawingSurface;
