use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in source-image pixel coordinates.
///
/// `x`/`y` is the top-left corner; the right and bottom edges are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Overlapping part of both rectangles; an empty rect when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        // far edges can exceed i32 for saturated boxes
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 as i64 || y2 <= y1 as i64 {
            return Rect::default();
        }
        Rect::new(x1, y1, (x2 - x1 as i64) as i32, (y2 - y1 as i64) as i32)
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn clamp_to_frame(&self, frame_width: u32, frame_height: u32) -> Rect {
        self.intersect(&Rect::new(0, 0, frame_width as i32, frame_height as i32))
    }

    pub fn iou(&self, other: &Rect) -> f64 {
        let inter = self.intersect(other).area();
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }

    /// Square region centred on this rect with side `max(width, height)`,
    /// clipped to the frame.
    ///
    /// Falls back to the clipped original rect when clipping leaves the
    /// square one pixel wide or less.
    pub fn square_roi(&self, frame_width: u32, frame_height: u32) -> Rect {
        if self.is_empty() {
            return *self;
        }
        let side = self.width.max(self.height);
        let cx = self.x + self.width / 2;
        let cy = self.y + self.height / 2;

        let square = Rect::new(cx - side / 2, cy - side / 2, side, side)
            .clamp_to_frame(frame_width, frame_height);
        if square.width <= 1 || square.height <= 1 {
            return self.clamp_to_frame(frame_width, frame_height);
        }
        square
    }
}
