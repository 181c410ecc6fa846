//! Dual-layer drawing surface: the source image with the stroke layer on top.

use egui::{Color32, Rect, Sense, Stroke, TextureHandle, TextureOptions, pos2};
use image::RgbaImage;

use crate::error::Result;
use crate::mask::{Brush, MaskLayer};
use crate::viewport::ImageFit;

/// Colour the strokes are shown in; the exported mask is plain grayscale.
pub const STROKE_TINT: [u8; 3] = [255, 48, 96];

/// How far past 1:1 a small image may be blown up on screen.
const MAX_DISPLAY_SCALE: f32 = 4.0;

pub struct MaskCanvas {
    base: TextureHandle,
    overlay: TextureHandle,
    size: [usize; 2],
    overlay_opacity: f32,
}

impl MaskCanvas {
    pub fn new(ctx: &egui::Context, image: &RgbaImage, mask: &mut MaskLayer, overlay_opacity: f32) -> Self {
        let size = [image.width() as usize, image.height() as usize];
        let base = ctx.load_texture(
            "source_image",
            egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw()),
            TextureOptions::LINEAR,
        );
        let overlay = ctx.load_texture(
            "mask_overlay",
            mask.to_color_image(STROKE_TINT, overlay_opacity),
            TextureOptions::LINEAR,
        );
        // The whole layer was just uploaded.
        mask.take_dirty();
        Self {
            base,
            overlay,
            size,
            overlay_opacity,
        }
    }

    /// Draws both layers into the remaining space and feeds pointer input to the
    /// mask. With `interactive` off the canvas is display-only.
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        mask: &mut MaskLayer,
        brush: Brush,
        overlay_opacity: f32,
        interactive: bool,
    ) -> Result<()> {
        let sense = if interactive {
            Sense::click_and_drag()
        } else {
            Sense::hover()
        };
        let (response, painter) = ui.allocate_painter(ui.available_size(), sense);
        let fit = ImageFit::contain(response.rect, self.size, MAX_DISPLAY_SCALE);
        let radius_px = fit.points_to_pixels(brush.size / 2.0);

        if interactive {
            // Only the primary button paints; other buttons end the stroke.
            let primary_held =
                response.is_pointer_button_down_on() && ui.input(|i| i.pointer.primary_down());
            match response.interact_pointer_pos() {
                Some(pos) if primary_held => {
                    let p = fit.screen_to_image(pos);
                    if mask.is_painting() {
                        mask.extend_stroke(p, radius_px);
                    } else {
                        mask.begin_stroke(p, radius_px);
                    }
                }
                _ => {
                    mask.end_stroke()?;
                }
            }
        } else {
            mask.end_stroke()?;
        }

        self.refresh_overlay(mask, overlay_opacity);

        let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
        painter.image(self.base.id(), fit.rect, uv, Color32::WHITE);
        painter.image(self.overlay.id(), fit.rect, uv, Color32::WHITE);

        if interactive
            && let Some(hover) = response.hover_pos()
            && fit.contains(hover)
        {
            let outline = Stroke::new(1.0, ui.visuals().strong_text_color());
            painter.circle_stroke(hover, brush.size / 2.0, outline);
            ui.ctx().set_cursor_icon(egui::CursorIcon::Crosshair);
        }
        Ok(())
    }

    /// Uploads the part of the overlay the mask changed since the last frame.
    /// An opacity change or a full-layer change re-uploads everything.
    fn refresh_overlay(&mut self, mask: &mut MaskLayer, overlay_opacity: f32) {
        let dirty = mask.take_dirty();
        let opacity_changed = (overlay_opacity - self.overlay_opacity).abs() > f32::EPSILON;
        if opacity_changed || dirty == Some(mask.full_region()) {
            self.overlay
                .set(mask.to_color_image(STROKE_TINT, overlay_opacity), TextureOptions::LINEAR);
            self.overlay_opacity = overlay_opacity;
        } else if let Some(region) = dirty {
            self.overlay.set_partial(
                region.origin(),
                mask.region_color_image(region, STROKE_TINT, overlay_opacity),
                TextureOptions::LINEAR,
            );
        }
    }
}

/// Shows an image scaled to fit `max_size`, preserving aspect ratio.
pub fn show_fitted(ui: &mut egui::Ui, texture: &TextureHandle, max_size: egui::Vec2) {
    let available = Rect::from_min_size(pos2(0.0, 0.0), max_size);
    let fit = ImageFit::contain(available, texture.size(), 1.0);
    ui.add(egui::Image::new((texture.id(), fit.rect.size())));
}
