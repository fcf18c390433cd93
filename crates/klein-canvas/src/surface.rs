//! Drawing surface: the raster that pointer strokes paint into.

use image::{DynamicImage, Rgba, RgbaImage};
use klein_core::types::{Palette, Rgb, Theme};

/// Pen width in pixels.
pub const PEN_WIDTH: f32 = 3.0;

/// A live sketch canvas painted with the current theme's palette.
#[derive(Debug, Clone)]
pub struct DrawingSurface {
    image: RgbaImage,
    palette: Palette,
    /// Last pen position while a stroke is in progress.
    pen: Option<(f32, f32)>,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32, theme: Theme) -> Self {
        let palette = theme.palette();
        Self {
            image: RgbaImage::from_pixel(width, height, opaque(palette.canvas_bg)),
            palette,
            pen: None,
        }
    }

    /// Wrap an existing sketch (e.g. loaded from disk) as the surface content.
    pub fn from_image(image: DynamicImage, theme: Theme) -> Self {
        Self {
            image: image.into_rgba8(),
            palette: theme.palette(),
            pen: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Reallocate to a new pane size; content is lost.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::from_pixel(width, height, opaque(self.palette.canvas_bg));
    }

    /// Repaint everything with the background color.
    pub fn clear(&mut self) {
        let bg = opaque(self.palette.canvas_bg);
        for pixel in self.image.pixels_mut() {
            *pixel = bg;
        }
    }

    /// Switch palette; the surface is cleared.
    pub fn set_theme(&mut self, theme: Theme) {
        self.palette = theme.palette();
        self.clear();
    }

    pub fn is_drawing(&self) -> bool {
        self.pen.is_some()
    }

    /// Start a stroke at `(x, y)` without painting.
    pub fn pen_down(&mut self, x: f32, y: f32) {
        self.pen = Some((x, y));
    }

    /// Continue the stroke to `(x, y)`. Returns false if no stroke is active.
    pub fn pen_move(&mut self, x: f32, y: f32) -> bool {
        let Some(last) = self.pen else {
            return false;
        };
        self.stroke_segment(last, (x, y));
        self.pen = Some((x, y));
        true
    }

    /// End the stroke. Returns false if no stroke was active.
    pub fn pen_up(&mut self) -> bool {
        self.pen.take().is_some()
    }

    /// Paint a round-capped segment with the stroke color. Only the part
    /// within a pen width of the surface is stepped through.
    pub fn stroke_segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let bounds = Bounds {
            x_min: -PEN_WIDTH,
            y_min: -PEN_WIDTH,
            x_max: self.image.width() as f32 + PEN_WIDTH,
            y_max: self.image.height() as f32 + PEN_WIDTH,
        };
        let Some((from, to)) = bounds.clip(from, to) else {
            return;
        };
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let steps = (dx.hypot(dy) * 2.0).ceil().max(1.0) as u32;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.stamp(from.0 + dx * t, from.1 + dy * t);
        }
    }

    fn stamp(&mut self, cx: f32, cy: f32) {
        let radius = PEN_WIDTH / 2.0;
        let color = opaque(self.palette.stroke);
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let x0 = (cx - radius).floor() as i64;
        let y0 = (cy - radius).floor() as i64;
        let x1 = (cx + radius).ceil() as i64;
        let y1 = (cy + radius).ceil() as i64;
        for y in y0.max(0)..=y1.min(h - 1) {
            for x in x0.max(0)..=x1.min(w - 1) {
                let (px, py) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                if px * px + py * py <= radius * radius {
                    self.image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

struct Bounds {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
}

impl Bounds {
    /// Liang-Barsky clip. `None` when the segment misses the box or has a
    /// non-finite endpoint.
    fn clip(&self, from: (f32, f32), to: (f32, f32)) -> Option<((f32, f32), (f32, f32))> {
        if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let (mut t0, mut t1) = (0.0f32, 1.0f32);
        let edges = [
            (-dx, from.0 - self.x_min),
            (dx, self.x_max - from.0),
            (-dy, from.1 - self.y_min),
            (dy, self.y_max - from.1),
        ];
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
        Some((
            (from.0 + dx * t0, from.1 + dy * t0),
            (from.0 + dx * t1, from.1 + dy * t1),
        ))
    }
}

fn opaque(color: Rgb) -> Rgba<u8> {
    let [r, g, b] = color.0;
    Rgba([r, g, b, 255])
}
