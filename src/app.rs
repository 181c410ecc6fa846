use egui::{Key, KeyboardShortcut, Modifiers, TextureOptions};

use crate::api::{EditClient, EditRequest, EditedImage};
use crate::canvas::{self, MaskCanvas};
use crate::config::{API_KEY_VAR, Settings};
use crate::encoding::{InlineImage, decode_rgba};
use crate::error::{EditError, Result};
use crate::file_picker;
use crate::job::PendingEdit;
use crate::mask::{Brush, MaskLayer};

const UNDO_SHORTCUT: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::Z);

/// The image being edited, with its stroke layer.
struct Source {
    name: String,
    file: InlineImage,
    size: [usize; 2],
    mask: MaskLayer,
    canvas: MaskCanvas,
}

struct EditResult {
    edited: EditedImage,
    texture: egui::TextureHandle,
}

/// Settings and the last prompt are persisted; images and masks never are.
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MaskBrushApp {
    settings: Settings,
    prompt: String,

    #[serde(skip)]
    source: Option<Source>,

    #[serde(skip)]
    result: Option<EditResult>,

    #[serde(skip)]
    pending: Option<PendingEdit>,

    #[serde(skip)]
    error: Option<String>,

    #[serde(skip)]
    show_settings: bool,
}

impl Default for MaskBrushApp {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            prompt: String::new(),
            source: None,
            result: None,
            pending: None,
            error: None,
            show_settings: false,
        }
    }
}

impl MaskBrushApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // Note that you must enable the `persistence` feature for this to work.
        let mut this: Self = if let Some(storage) = cc.storage {
            eframe::get_value(storage, eframe::APP_KEY).unwrap_or_default()
        } else {
            Default::default()
        };
        this.settings.apply_env();
        if !this.settings.has_api_key() {
            log::warn!("No API key configured; set {API_KEY_VAR} or enter one in Settings");
        }

        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        this
    }

    fn load_source(&mut self, ctx: &egui::Context, bytes: &[u8], name: String) -> Result<()> {
        let file = InlineImage::from_bytes(bytes)?;
        let image = decode_rgba(bytes)?;
        let (w, h) = image.dimensions();
        let mut mask = MaskLayer::new(w, h);
        let canvas = MaskCanvas::new(ctx, &image, &mut mask, self.settings.overlay_opacity);
        log::info!("Loaded {name} ({w}x{h}, {})", file.mime_type);
        self.source = Some(Source {
            name,
            file,
            size: [w as usize, h as usize],
            mask,
            canvas,
        });
        Ok(())
    }

    /// A new source can't be loaded while an edit of the current one is running.
    fn can_open_image(&self) -> bool {
        self.pending.is_none()
    }

    fn open_image(&mut self, ctx: &egui::Context) {
        if !self.can_open_image() {
            log::debug!("Ignoring open while an edit is pending");
            return;
        }
        #[cfg(all(not(target_arch = "wasm32"), not(target_os = "android")))]
        {
            match file_picker::pick_image() {
                Ok(Some((bytes, name))) => {
                    let loaded = self.load_source(ctx, &bytes, name);
                    self.report(loaded);
                }
                Ok(None) => {}
                Err(e) => self.report(Err(e)),
            }
        }

        #[cfg(any(target_arch = "wasm32", target_os = "android"))]
        {
            let _ = ctx;
            file_picker::open_image_picker();
        }
    }

    fn start_edit(&mut self, ctx: &egui::Context) -> Result<()> {
        let source = self.source.as_ref().ok_or(EditError::NoImage)?;
        let mask_png = if source.mask.is_empty() {
            None
        } else {
            source.mask.png_bytes()
        };
        let request = EditRequest::new(&self.prompt, source.file.clone(), mask_png)?;
        let client = EditClient::new(&self.settings)?;
        log::info!("Starting edit of {}: {:?}", source.name, request.prompt);
        self.pending = Some(PendingEdit::spawn(client, request, ctx.clone()));
        Ok(())
    }

    fn poll_pending(&mut self, ctx: &egui::Context) {
        let Some(result) = self.pending.as_ref().and_then(PendingEdit::poll) else {
            return;
        };
        self.pending = None;
        match result {
            Ok(edited) => {
                log::info!(
                    "Edit finished: {}x{} {}",
                    edited.image.width(),
                    edited.image.height(),
                    edited.file.mime_type
                );
                self.show_result(ctx, edited);
                self.error = None;
            }
            Err(e) => self.report(Err(e)),
        }
    }

    fn show_result(&mut self, ctx: &egui::Context, edited: EditedImage) {
        let size = [edited.image.width() as usize, edited.image.height() as usize];
        let texture = ctx.load_texture(
            "edit_result",
            egui::ColorImage::from_rgba_unmultiplied(size, edited.image.as_raw()),
            TextureOptions::LINEAR,
        );
        self.result = Some(EditResult { edited, texture });
    }

    fn use_result_as_base(&mut self, ctx: &egui::Context) -> Result<()> {
        let Some(result) = &self.result else {
            return Ok(());
        };
        let bytes = result.edited.file.decode()?;
        let name = format!("edited.{}", result.edited.file.extension());
        // Keep the result on screen unless the load worked.
        self.load_source(ctx, &bytes, name)?;
        self.result = None;
        Ok(())
    }

    fn save_mask(&self) -> Result<()> {
        let source = self.source.as_ref().ok_or(EditError::NoImage)?;
        let png = source
            .mask
            .png_bytes()
            .filter(|_| !source.mask.is_empty())
            .ok_or(EditError::EmptyMask)?;
        file_picker::save_bytes(png, "mask.png", "image/png")?;
        Ok(())
    }

    fn save_result(&self) -> Result<()> {
        let Some(result) = &self.result else {
            return Ok(());
        };
        let file = &result.edited.file;
        let bytes = file.decode()?;
        file_picker::save_bytes(&bytes, &format!("edited.{}", file.extension()), &file.mime_type)?;
        Ok(())
    }

    fn undo_stroke(&mut self) -> Result<()> {
        if let Some(source) = &mut self.source {
            source.mask.undo()?;
        }
        Ok(())
    }

    /// Shows the error of a failed action, or clears the last one on success.
    fn report(&mut self, result: Result<()>) {
        match result {
            Ok(()) => self.error = None,
            Err(e) => {
                log::error!("{e}");
                self.error = Some(e.to_string());
            }
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let busy = self.pending.is_some();

        ui.heading("1. Image");
        ui.horizontal(|ui| {
            if ui.add_enabled(self.can_open_image(), egui::Button::new("Open image…")).clicked() {
                self.open_image(&ctx);
            }
            if let Some(source) = &self.source {
                ui.label(format!("{} ({}×{})", source.name, source.size[0], source.size[1]));
            } else {
                ui.weak("(none)");
            }
        });

        ui.separator();
        ui.heading("2. Mask");
        ui.add(
            egui::Slider::new(&mut self.settings.brush.size, Brush::SIZE_RANGE)
                .text("Brush size"),
        );
        ui.add(
            egui::Slider::new(&mut self.settings.overlay_opacity, 0.1..=1.0)
                .text("Overlay opacity"),
        );
        let (has_mask, can_undo) = self.source.as_ref().map_or((false, false), |s| {
            (!s.mask.is_empty(), s.mask.can_undo())
        });
        ui.horizontal(|ui| {
            if ui.add_enabled(can_undo && !busy, egui::Button::new("Undo")).clicked() {
                let undone = self.undo_stroke();
                self.report(undone);
            }
            if ui.add_enabled(has_mask && !busy, egui::Button::new("Clear mask")).clicked()
                && let Some(source) = &mut self.source
            {
                source.mask.clear();
            }
            if ui.add_enabled(has_mask, egui::Button::new("Save mask…")).clicked() {
                let saved = self.save_mask();
                self.report(saved);
            }
        });

        ui.separator();
        ui.heading("3. Describe the change");
        ui.add(
            egui::TextEdit::multiline(&mut self.prompt)
                .hint_text("e.g. a bouquet of sunflowers in a glass vase")
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let ready = self.source.is_some() && has_mask && !self.prompt.trim().is_empty();
            if ui
                .add_enabled(ready && !busy, egui::Button::new("Generate"))
                .clicked()
            {
                let started = self.start_edit(&ctx);
                self.report(started);
            }
            if busy {
                ui.spinner();
                ui.label("Generating…");
            }
        });

        if !self.settings.has_api_key() {
            ui.add_space(4.0);
            ui.horizontal_wrapped(|ui| {
                ui.weak("No API key set.");
                if ui.link("Open settings").clicked() {
                    self.show_settings = true;
                }
            });
        }

        if let Some(err) = &self.error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err);
        }
    }

    fn result_ui(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let Some(result) = &self.result else {
            return;
        };
        ui.heading("Result");
        let max = egui::vec2(ui.available_width(), (ui.available_height() - 120.0).max(64.0));
        canvas::show_fitted(ui, &result.texture, max);
        if let Some(note) = &result.edited.note {
            ui.label(egui::RichText::new(note).italics());
        }

        ui.horizontal_wrapped(|ui| {
            if ui.button("Save result…").clicked() {
                let saved = self.save_result();
                self.report(saved);
            }
            if ui
                .add_enabled(self.can_open_image(), egui::Button::new("Use as new base"))
                .clicked()
            {
                let loaded = self.use_result_as_base(&ctx);
                self.report(loaded);
            }
            if ui.button("Discard").clicked() {
                self.result = None;
            }
        });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_settings;
        egui::Window::new("Settings")
            .open(&mut open)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                    ui.label("API key:");
                    ui.add(egui::TextEdit::singleline(&mut self.settings.api_key).password(true))
                        .on_hover_text(format!("Not saved. Can also be set with {API_KEY_VAR}."));
                    ui.end_row();

                    ui.label("Model:");
                    ui.text_edit_singleline(&mut self.settings.model);
                    ui.end_row();

                    ui.label("Endpoint:");
                    ui.text_edit_singleline(&mut self.settings.endpoint);
                    ui.end_row();
                });
                ui.separator();
                if ui.button("Reset to defaults").clicked() {
                    let api_key = std::mem::take(&mut self.settings.api_key);
                    self.settings = Settings {
                        api_key,
                        ..Settings::default()
                    };
                }
            });
        self.show_settings = open;
    }
}

impl eframe::App for MaskBrushApp {
    /// Called by the framework to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, self);
    }

    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // A file picked in the browser waits in its slot until no edit is pending.
        if self.can_open_image()
            && let Some((bytes, name)) = file_picker::take_selected_image_bytes()
        {
            let loaded = self.load_source(ctx, &bytes, name);
            self.report(loaded);
        }
        self.poll_pending(ctx);

        if !ctx.wants_keyboard_input()
            && self.pending.is_none()
            && ctx.input_mut(|i| i.consume_shortcut(&UNDO_SHORTCUT))
        {
            let undone = self.undo_stroke();
            self.report(undone);
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui
                        .add_enabled(self.can_open_image(), egui::Button::new("Open image…"))
                        .clicked()
                    {
                        self.open_image(ctx);
                    }
                    if ui.button("Save mask…").clicked() {
                        let saved = self.save_mask();
                        self.report(saved);
                    }
                    // NOTE: no File->Quit on web pages!
                    if !cfg!(target_arch = "wasm32") {
                        ui.separator();
                        if ui.button("Quit").clicked() {
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                    }
                });
                if ui.button("Settings").clicked() {
                    self.show_settings = !self.show_settings;
                }
                ui.add_space(16.0);
                egui::widgets::global_theme_preference_buttons(ui);
            });
        });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.controls_ui(ui));
            });

        if self.result.is_some() {
            egui::SidePanel::right("result")
                .resizable(true)
                .default_width(360.0)
                .show(ctx, |ui| self.result_ui(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let brush = self.settings.brush;
            let opacity = self.settings.overlay_opacity;
            let interactive = self.pending.is_none();
            let painted = match &mut self.source {
                Some(source) => {
                    source
                        .canvas
                        .show(ui, &mut source.mask, brush, opacity, interactive)
                }
                None => {
                    ui.centered_and_justified(|ui| {
                        ui.label("Open an image, paint over the part to change, then describe the change.");
                    });
                    Ok(())
                }
            };
            if painted.is_err() {
                self.report(painted);
            }
            egui::warn_if_debug_build(ui);
        });

        self.settings_window(ctx);
    }
}
