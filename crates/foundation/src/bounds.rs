/// Axis-aligned layout rectangle in CSS pixels (y grows downwards).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height * 0.5
    }

    /// Pixel size rounded for GPU surfaces, never zero.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }

    /// Width / height, falling back to 1.0 for degenerate rectangles.
    pub fn aspect(&self) -> f64 {
        if self.height <= 0.0 {
            1.0
        } else {
            (self.width / self.height).max(1e-6)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn center_is_midpoint_of_top_and_bottom() {
        let r = Rect::new(0.0, 100.0, 300.0, 420.0);
        assert_eq!(r.center_y(), 310.0);
        assert_eq!(r.bottom(), 520.0);
    }

    #[test]
    fn degenerate_rect_has_unit_aspect_and_pixel_size() {
        let r = Rect::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(r.aspect(), 1.0);
        assert_eq!(r.pixel_size(), (1, 1));
    }
}
