use egui::{Pos2, Rect, Vec2, pos2, vec2};

/// Smallest display scale; keeps huge images from collapsing to nothing.
pub const MIN_SCALE: f32 = 0.05;

/// Where an image sits on screen after being fitted into the available space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageFit {
    /// Screen rect covered by the image.
    pub rect: Rect,
    /// Screen points per image pixel.
    pub scale: f32,
}

impl ImageFit {
    /// Fits `image_size` inside `available`, preserving aspect ratio and
    /// centring the result.
    pub fn contain(available: Rect, image_size: [usize; 2], max_scale: f32) -> Self {
        let [w, h] = image_size;
        if w == 0 || h == 0 {
            return Self {
                rect: Rect::from_center_size(available.center(), Vec2::ZERO),
                scale: 1.0,
            };
        }
        let (w, h) = (w as f32, h as f32);
        let scale = (available.width() / w)
            .min(available.height() / h)
            .clamp(MIN_SCALE, max_scale.max(MIN_SCALE));
        Self {
            rect: Rect::from_center_size(available.center(), vec2(w * scale, h * scale)),
            scale,
        }
    }

    /// Screen position to image pixel coordinates. Not clamped: positions off
    /// the image map outside `0..size`.
    pub fn screen_to_image(&self, pos: Pos2) -> Pos2 {
        pos2(
            (pos.x - self.rect.min.x) / self.scale,
            (pos.y - self.rect.min.y) / self.scale,
        )
    }

    pub fn image_to_screen(&self, pos: Pos2) -> Pos2 {
        pos2(
            self.rect.min.x + pos.x * self.scale,
            self.rect.min.y + pos.y * self.scale,
        )
    }

    pub fn points_to_pixels(&self, len: f32) -> f32 {
        len / self.scale
    }

    pub fn contains(&self, pos: Pos2) -> bool {
        self.rect.contains(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Pos2, b: Pos2) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn wide_image_is_letterboxed() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), vec2(400.0, 400.0));
        let fit = ImageFit::contain(avail, [800, 400], 4.0);
        assert!((fit.scale - 0.5).abs() < 1e-6, "scale {}", fit.scale);
        assert_eq!(fit.rect, Rect::from_min_size(pos2(0.0, 100.0), vec2(400.0, 200.0)));
    }

    #[test]
    fn small_image_is_capped_at_max_scale() {
        let avail = Rect::from_min_size(pos2(10.0, 10.0), vec2(1000.0, 1000.0));
        let fit = ImageFit::contain(avail, [10, 10], 4.0);
        assert!((fit.scale - 4.0).abs() < 1e-6, "scale {}", fit.scale);
        assert_eq!(fit.rect.center(), avail.center());
    }

    #[test]
    fn empty_image_gives_unit_scale() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), vec2(100.0, 50.0));
        let fit = ImageFit::contain(avail, [0, 20], 4.0);
        assert!((fit.scale - 1.0).abs() < 1e-6, "scale {}", fit.scale);
        assert_eq!(fit.rect.size(), Vec2::ZERO);
    }

    #[test]
    fn mapping_round_trips() {
        let avail = Rect::from_min_size(pos2(30.0, 50.0), vec2(640.0, 360.0));
        let fit = ImageFit::contain(avail, [1920, 1080], 4.0);
        for p in [pos2(30.0, 50.0), pos2(100.5, 200.25), pos2(669.0, 409.0)] {
            assert!(approx(fit.image_to_screen(fit.screen_to_image(p)), p), "{p:?}");
        }
        // Top-left and bottom-right of the fitted rect hit the pixel buffer corners.
        assert!(approx(fit.screen_to_image(fit.rect.min), pos2(0.0, 0.0)), "min corner");
        assert!(approx(fit.screen_to_image(fit.rect.max), pos2(1920.0, 1080.0)), "max corner");
    }

    #[test]
    fn off_image_positions_are_not_clamped() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), vec2(100.0, 100.0));
        let fit = ImageFit::contain(avail, [50, 50], 2.0);
        let p = fit.screen_to_image(pos2(-10.0, 120.0));
        assert!(p.x < 0.0 && p.y > 50.0, "{p:?}");
        assert!(!fit.contains(pos2(-10.0, 120.0)), "outside");
        assert!(fit.contains(pos2(50.0, 50.0)), "inside");
    }

    #[test]
    fn brush_length_converts_with_scale() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), vec2(200.0, 200.0));
        let fit = ImageFit::contain(avail, [800, 800], 4.0);
        assert!((fit.points_to_pixels(10.0) - 40.0).abs() < 1e-4, "pixels");
    }
}
