//! The transparent stroke layer painted over the source image.
//!
//! Coverage is an 8-bit buffer the size of the source image: 0 is untouched,
//! 255 is fully masked. It only changes while a stroke is active, and is
//! encoded to PNG each time a stroke ends.

use std::collections::VecDeque;

use egui::{ColorImage, Pos2, pos2};
use image::GrayImage;

use crate::encoding::encode_png_gray;
use crate::error::Result;

/// Snapshots kept for undo.
pub const UNDO_DEPTH: usize = 20;

/// Brush settings. `size` is the diameter in screen points, so the brush keeps
/// its on-screen size whatever the image is scaled to.
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Brush {
    pub size: f32,
}

impl Default for Brush {
    fn default() -> Self {
        Self { size: 32.0 }
    }
}

impl Brush {
    pub const SIZE_RANGE: std::ops::RangeInclusive<f32> = 2.0..=200.0;
}

/// Pixel region of the coverage buffer, `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRegion {
    pub min: [u32; 2],
    pub max: [u32; 2],
}

impl DirtyRegion {
    pub fn union(self, other: Self) -> Self {
        Self {
            min: [self.min[0].min(other.min[0]), self.min[1].min(other.min[1])],
            max: [self.max[0].max(other.max[0]), self.max[1].max(other.max[1])],
        }
    }

    pub fn origin(&self) -> [usize; 2] {
        [self.min[0] as usize, self.min[1] as usize]
    }

    pub fn size(&self) -> [usize; 2] {
        [
            (self.max[0] - self.min[0]) as usize,
            (self.max[1] - self.min[1]) as usize,
        ]
    }
}

#[derive(Clone)]
struct Snapshot {
    coverage: GrayImage,
    covered: usize,
}

pub struct MaskLayer {
    coverage: GrayImage,
    /// Number of pixels with non-zero coverage.
    covered: usize,
    /// Last point of the active stroke; `None` when no button is held.
    last_point: Option<Pos2>,
    /// State from before the active stroke, pushed to `history` on its first change.
    stroke_start: Option<Snapshot>,
    stroke_changed: bool,
    history: VecDeque<Snapshot>,
    encoded: Option<Vec<u8>>,
    dirty: Option<DirtyRegion>,
}

impl MaskLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            coverage: GrayImage::new(width, height),
            covered: 0,
            last_point: None,
            stroke_start: None,
            stroke_changed: false,
            history: VecDeque::with_capacity(UNDO_DEPTH),
            encoded: None,
            dirty: None,
        }
    }

    pub fn size(&self) -> [usize; 2] {
        [self.coverage.width() as usize, self.coverage.height() as usize]
    }

    pub fn coverage(&self) -> &GrayImage {
        &self.coverage
    }

    pub fn full_region(&self) -> DirtyRegion {
        DirtyRegion {
            min: [0, 0],
            max: [self.coverage.width(), self.coverage.height()],
        }
    }

    /// Region changed since the last call, for partial texture uploads.
    pub fn take_dirty(&mut self) -> Option<DirtyRegion> {
        self.dirty.take()
    }

    pub fn is_painting(&self) -> bool {
        self.last_point.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.covered == 0
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// PNG of the mask as of the last released stroke.
    pub fn png_bytes(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }

    /// Starts a stroke at `p` (image pixels) and stamps a dot there.
    pub fn begin_stroke(&mut self, p: Pos2, radius: f32) {
        self.stroke_start = Some(self.snapshot());
        self.stroke_changed = false;
        self.last_point = Some(p);
        self.paint(p, p, radius);
    }

    /// Continues the active stroke to `p`. Returns `false` and leaves the
    /// buffer alone when no stroke is active.
    pub fn extend_stroke(&mut self, p: Pos2, radius: f32) -> bool {
        let Some(last) = self.last_point else {
            return false;
        };
        self.paint(last, p, radius);
        self.last_point = Some(p);
        true
    }

    /// Ends the active stroke and re-encodes the mask if the stroke changed it.
    /// Returns whether a stroke was actually active.
    pub fn end_stroke(&mut self) -> Result<bool> {
        if self.last_point.take().is_none() {
            return Ok(false);
        }
        self.stroke_start = None;
        if std::mem::take(&mut self.stroke_changed) {
            let png = encode_png_gray(&self.coverage)?;
            log::debug!("Mask stroke released, {} bytes encoded", png.len());
            self.encoded = Some(png);
        } else {
            log::debug!("Mask stroke released without touching the image");
        }
        Ok(true)
    }

    pub fn clear(&mut self) {
        if !self.is_empty() {
            let snapshot = self.snapshot();
            self.push_history(snapshot);
        }
        let (w, h) = self.coverage.dimensions();
        self.coverage = GrayImage::new(w, h);
        self.covered = 0;
        self.last_point = None;
        self.stroke_start = None;
        self.stroke_changed = false;
        self.encoded = None;
        self.mark_dirty(self.full_region());
    }

    /// Restores the coverage from before the last stroke (or clear).
    pub fn undo(&mut self) -> Result<bool> {
        let Some(previous) = self.history.pop_back() else {
            return Ok(false);
        };
        self.coverage = previous.coverage;
        self.covered = previous.covered;
        self.last_point = None;
        self.stroke_start = None;
        self.stroke_changed = false;
        self.encoded = if self.is_empty() {
            None
        } else {
            Some(encode_png_gray(&self.coverage)?)
        };
        self.mark_dirty(self.full_region());
        Ok(true)
    }

    /// Renders the layer for display: `rgb` tinted, alpha scaled by coverage.
    pub fn to_color_image(&self, rgb: [u8; 3], opacity: f32) -> ColorImage {
        self.region_color_image(self.full_region(), rgb, opacity)
    }

    /// Like [`Self::to_color_image`], restricted to `region`.
    pub fn region_color_image(&self, region: DirtyRegion, rgb: [u8; 3], opacity: f32) -> ColorImage {
        let opacity = opacity.clamp(0.0, 1.0);
        let [w, h] = region.size();
        let mut rgba = Vec::with_capacity(w * h * 4);
        for y in region.min[1]..region.max[1] {
            for x in region.min[0]..region.max[0] {
                let c = self.coverage.get_pixel(x, y).0[0];
                let alpha = (f32::from(c) * opacity).round() as u8;
                rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
            }
        }
        ColorImage::from_rgba_unmultiplied([w, h], &rgba)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            coverage: self.coverage.clone(),
            covered: self.covered,
        }
    }

    fn push_history(&mut self, snapshot: Snapshot) {
        if self.history.len() == UNDO_DEPTH {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }

    fn mark_dirty(&mut self, region: DirtyRegion) {
        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.union(region),
            None => region,
        });
    }

    fn paint(&mut self, a: Pos2, b: Pos2, radius: f32) {
        let Some(region) = self.stamp_segment(a, b, radius) else {
            return;
        };
        if let Some(start) = self.stroke_start.take() {
            self.push_history(start);
        }
        self.stroke_changed = true;
        self.mark_dirty(region);
    }

    /// Rasterises the capsule from `a` to `b`: round caps and joins fall out of
    /// measuring each pixel's distance to the segment. Returns the bounds of
    /// the pixels that changed.
    fn stamp_segment(&mut self, a: Pos2, b: Pos2, radius: f32) -> Option<DirtyRegion> {
        let radius = radius.max(0.5);
        let (w, h) = self.coverage.dimensions();
        let reach = radius + 1.0;
        let min_x = (a.x.min(b.x) - reach).floor().max(0.0);
        let min_y = (a.y.min(b.y) - reach).floor().max(0.0);
        let max_x = (a.x.max(b.x) + reach).ceil().min(w as f32);
        let max_y = (a.y.max(b.y) + reach).ceil().min(h as f32);
        if !(min_x < max_x && min_y < max_y) {
            return None;
        }

        let ab = b - a;
        let len_sq = ab.length_sq();
        let mut changed: Option<DirtyRegion> = None;
        for y in (min_y as u32)..(max_y as u32) {
            for x in (min_x as u32)..(max_x as u32) {
                let p = pos2(x as f32 + 0.5, y as f32 + 0.5);
                let t = if len_sq > 0.0 {
                    ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let d = (p - (a + ab * t)).length();
                let cov = (radius + 0.5 - d).clamp(0.0, 1.0);
                if cov <= 0.0 {
                    continue;
                }
                let v = (cov * 255.0).round() as u8;
                let px = self.coverage.get_pixel_mut(x, y);
                if v > px.0[0] {
                    if px.0[0] == 0 {
                        self.covered += 1;
                    }
                    px.0[0] = v;
                    let pixel = DirtyRegion {
                        min: [x, y],
                        max: [x + 1, y + 1],
                    };
                    changed = Some(changed.map_or(pixel, |c| c.union(pixel)));
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(mask: &MaskLayer, x: u32, y: u32) -> u8 {
        mask.coverage().get_pixel(x, y).0[0]
    }

    fn scanned_empty(mask: &MaskLayer) -> bool {
        mask.coverage().as_raw().iter().all(|&v| v == 0)
    }

    #[test]
    fn new_mask_is_empty_and_unencoded() {
        let mut mask = MaskLayer::new(16, 8);
        assert!(mask.is_empty(), "fresh mask");
        assert!(!mask.is_painting(), "no stroke yet");
        assert!(mask.png_bytes().is_none(), "nothing released yet");
        assert!(mask.take_dirty().is_none(), "nothing to upload");
        assert_eq!(mask.size(), [16, 8]);
    }

    #[test]
    fn extend_without_button_held_is_ignored() {
        let mut mask = MaskLayer::new(32, 32);
        assert!(!mask.extend_stroke(pos2(10.0, 10.0), 4.0), "no active stroke");
        assert!(mask.is_empty(), "buffer untouched");
        assert!(mask.take_dirty().is_none(), "nothing changed");
        assert!(!mask.end_stroke().expect("nothing to encode"), "no stroke to end");
        assert!(mask.png_bytes().is_none(), "no encode without a stroke");
    }

    #[test]
    fn click_stamps_a_round_dot() {
        let mut mask = MaskLayer::new(32, 32);
        mask.begin_stroke(pos2(16.0, 16.0), 4.0);
        assert!(mask.is_painting(), "stroke active");
        assert_eq!(at(&mask, 16, 16), 255);
        assert_eq!(at(&mask, 15, 15), 255);
        // Within the radius along an axis, but the corner of the bounding square is not.
        assert_eq!(at(&mask, 18, 15), 255);
        assert_eq!(at(&mask, 19, 19), 0);
        assert_eq!(at(&mask, 0, 0), 0);
    }

    #[test]
    fn segment_covers_the_line_and_rounds_the_ends() {
        let mut mask = MaskLayer::new(64, 32);
        mask.begin_stroke(pos2(10.0, 16.0), 3.0);
        assert!(mask.extend_stroke(pos2(50.0, 16.0), 3.0), "stroke active");
        for x in 10..50 {
            assert_eq!(at(&mask, x, 16), 255, "x={x}");
        }
        // Round cap reaches past the end point along the axis...
        assert_eq!(at(&mask, 51, 16), 255);
        assert!(at(&mask, 52, 16) > 0, "cap edge is anti-aliased");
        // ...but not into the corner a square cap would fill.
        assert_eq!(at(&mask, 52, 13), 0);
        // Perpendicular extent equals the radius.
        assert_eq!(at(&mask, 30, 20), 0);
    }

    #[test]
    fn release_encodes_png_with_image_dimensions() {
        let mut mask = MaskLayer::new(40, 30);
        mask.begin_stroke(pos2(5.0, 5.0), 2.0);
        mask.extend_stroke(pos2(20.0, 20.0), 2.0);
        assert!(mask.png_bytes().is_none(), "not encoded while painting");
        assert!(mask.end_stroke().expect("encode"), "stroke ended");
        assert!(!mask.is_painting(), "stroke released");

        let png = mask.png_bytes().expect("encoded on release");
        let decoded = image::load_from_memory(png).expect("valid png").to_luma8();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(decoded.as_raw(), mask.coverage().as_raw());

        // Moving after release must not paint.
        mask.take_dirty();
        let before = mask.coverage().clone();
        assert!(!mask.extend_stroke(pos2(35.0, 5.0), 2.0), "released");
        assert_eq!(mask.coverage(), &before);
        assert!(mask.take_dirty().is_none());
    }

    #[test]
    fn strokes_leaving_the_buffer_are_clipped() {
        let mut mask = MaskLayer::new(10, 10);
        mask.begin_stroke(pos2(-20.0, 5.0), 2.0);
        assert!(mask.is_empty(), "dot fully outside");
        mask.extend_stroke(pos2(30.0, 5.0), 2.0);
        assert_eq!(at(&mask, 0, 5), 255);
        assert_eq!(at(&mask, 9, 5), 255);
    }

    #[test]
    fn dirty_region_bounds_the_changed_pixels() {
        let mut mask = MaskLayer::new(64, 64);
        mask.begin_stroke(pos2(20.0, 20.0), 3.0);
        mask.extend_stroke(pos2(30.0, 20.0), 3.0);
        let dirty = mask.take_dirty().expect("stroke changed pixels");
        assert!(dirty.min[0] >= 16 && dirty.min[0] <= 17, "{dirty:?}");
        assert!(dirty.max[0] >= 33 && dirty.max[0] <= 35, "{dirty:?}");
        assert!(dirty.min[1] >= 16 && dirty.max[1] <= 25, "{dirty:?}");
        assert_ne!(dirty, mask.full_region());
        assert!(mask.take_dirty().is_none(), "taken");

        // Everything outside the region is untouched.
        for (x, y, px) in mask.coverage().enumerate_pixels() {
            let inside = x >= dirty.min[0] && x < dirty.max[0] && y >= dirty.min[1] && y < dirty.max[1];
            if !inside {
                assert_eq!(px.0[0], 0, "({x},{y})");
            }
        }

        let region = mask.region_color_image(dirty, [255, 0, 0], 1.0);
        assert_eq!(region.size, dirty.size());

        mask.clear();
        assert_eq!(mask.take_dirty(), Some(mask.full_region()));
    }

    #[test]
    fn emptiness_tracks_coverage_without_scanning() {
        let mut mask = MaskLayer::new(32, 32);
        mask.begin_stroke(pos2(8.0, 8.0), 2.0);
        mask.extend_stroke(pos2(12.0, 8.0), 2.0);
        mask.end_stroke().expect("encode");
        assert!(!mask.is_empty());
        assert_eq!(mask.is_empty(), scanned_empty(&mask));

        mask.undo().expect("re-encode");
        assert!(mask.is_empty());
        assert_eq!(mask.is_empty(), scanned_empty(&mask));

        mask.begin_stroke(pos2(8.0, 8.0), 2.0);
        mask.end_stroke().expect("encode");
        mask.clear();
        assert!(mask.is_empty());
        mask.undo().expect("re-encode");
        assert!(!mask.is_empty());
        assert_eq!(mask.is_empty(), scanned_empty(&mask));
    }

    #[test]
    fn stroke_that_changes_nothing_leaves_no_undo_step() {
        let mut mask = MaskLayer::new(32, 32);
        // A click in the letterbox, outside the image.
        mask.begin_stroke(pos2(-40.0, -40.0), 3.0);
        assert!(mask.end_stroke().expect("nothing to encode"), "stroke ended");
        assert!(!mask.can_undo(), "no snapshot for a no-op stroke");
        assert!(mask.png_bytes().is_none(), "nothing painted");

        mask.begin_stroke(pos2(10.0, 10.0), 3.0);
        mask.end_stroke().expect("encode");
        let png = mask.png_bytes().expect("encoded").to_vec();

        // Repainting the same dot changes nothing either.
        mask.begin_stroke(pos2(10.0, 10.0), 3.0);
        mask.end_stroke().expect("encode");
        assert_eq!(mask.png_bytes(), Some(png.as_slice()));

        assert!(mask.undo().expect("re-encode"), "one real stroke");
        assert!(mask.is_empty());
        assert!(!mask.can_undo());
    }

    #[test]
    fn undo_restores_previous_stroke_state() {
        let mut mask = MaskLayer::new(32, 32);
        mask.begin_stroke(pos2(5.0, 5.0), 2.0);
        mask.end_stroke().expect("encode");
        let after_first = mask.coverage().clone();

        mask.begin_stroke(pos2(25.0, 25.0), 2.0);
        mask.end_stroke().expect("encode");
        assert_ne!(mask.coverage(), &after_first);

        assert!(mask.undo().expect("re-encode"), "one step back");
        assert_eq!(mask.coverage(), &after_first);
        assert!(mask.png_bytes().is_some(), "still has a stroke");

        assert!(mask.undo().expect("re-encode"), "back to blank");
        assert!(mask.is_empty(), "all strokes undone");
        assert!(mask.png_bytes().is_none(), "empty mask is not encoded");
        assert!(!mask.undo().expect("no-op"), "history exhausted");
    }

    #[test]
    fn clear_wipes_and_can_be_undone() {
        let mut mask = MaskLayer::new(16, 16);
        mask.begin_stroke(pos2(8.0, 8.0), 3.0);
        mask.end_stroke().expect("encode");
        mask.clear();
        assert!(mask.is_empty(), "cleared");
        assert!(mask.png_bytes().is_none(), "encoding dropped");
        assert!(mask.undo().expect("re-encode"), "undo clear");
        assert!(!mask.is_empty(), "stroke restored");
    }

    #[test]
    fn history_is_bounded() {
        let mut mask = MaskLayer::new(8, 8);
        for i in 0..(UNDO_DEPTH + 5) {
            // Each stroke lands on a fresh pixel so every one is undoable.
            mask.begin_stroke(pos2((i % 8) as f32 + 0.5, (i / 8) as f32 * 2.0 + 0.5), 0.5);
            mask.end_stroke().expect("encode");
        }
        let mut undone = 0;
        while mask.undo().expect("re-encode") {
            undone += 1;
        }
        assert_eq!(undone, UNDO_DEPTH);
    }

    #[test]
    fn overlay_alpha_follows_coverage() {
        let mut mask = MaskLayer::new(8, 8);
        mask.begin_stroke(pos2(4.0, 4.0), 2.0);
        let img = mask.to_color_image([255, 0, 0], 0.5);
        assert_eq!(img.size, [8, 8]);
        let covered = img.pixels[4 * 8 + 4];
        let empty = img.pixels[0];
        assert_eq!(covered.a(), 128);
        assert_eq!(empty.a(), 0);
    }
}
