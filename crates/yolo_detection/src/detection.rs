use opencv::core::Rect;

/// An axis-aligned box in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Truncates the corners to integers and clamps them into a
    /// `width` x `height` grid.
    pub fn clamp(&self, width: i32, height: i32) -> PixelRegion {
        let clamp_x = |x: f32| (x as i64).clamp(0, width.max(0) as i64) as i32;
        let clamp_y = |y: f32| (y as i64).clamp(0, height.max(0) as i64) as i32;

        PixelRegion {
            x0: clamp_x(self.xmin),
            y0: clamp_y(self.ymin),
            x1: clamp_x(self.xmax),
            y1: clamp_y(self.ymax),
        }
    }

    pub fn to_rect(&self) -> Rect {
        Rect {
            x: self.xmin as i32,
            y: self.ymin as i32,
            width: self.width() as i32,
            height: self.height() as i32,
        }
    }
}

/// A half-open pixel range `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelRegion {
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn pixels(&self) -> impl Iterator<Item = (i32, i32)> {
        let Self { x0, y0, x1, y1 } = *self;
        (y0..y1).flat_map(move |row| (x0..x1).map(move |col| (row, col)))
    }
}

/// One detector output.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    /// Index into the label set.
    pub class_id: usize,
}
