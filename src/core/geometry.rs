use serde::{Deserialize, Serialize};

/// Axis-aligned box in page-normalized coordinates (0.0..=1.0 on both axes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_pixels(
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        page_w: u32,
        page_h: u32,
    ) -> Self {
        let pw = page_w.max(1) as f32;
        let ph = page_h.max(1) as f32;
        Self {
            x0: (left / pw).clamp(0.0, 1.0),
            y0: (top / ph).clamp(0.0, 1.0),
            x1: ((left + width) / pw).clamp(0.0, 1.0),
            y1: ((top + height) / ph).clamp(0.0, 1.0),
        }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}
