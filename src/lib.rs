//! Paint a mask over a photo, describe a change, and let a multimodal image
//! model redraw the masked region.

#![warn(clippy::all, rust_2018_idioms)]

mod app;
mod file_picker;

pub mod api;
pub mod canvas;
pub mod config;
pub mod encoding;
pub mod error;
pub mod job;
pub mod mask;
pub mod viewport;

pub use app::MaskBrushApp;
pub use error::{EditError, Result};

use eframe::NativeOptions;

#[cfg(target_os = "android")]
use egui_winit::winit;

pub const APP_NAME: &str = "maskbrush";

impl MaskBrushApp {
    /// Run the app with provided `NativeOptions` (used by the desktop and Android entrypoints).
    pub fn run(options: NativeOptions) -> std::result::Result<(), eframe::Error> {
        eframe::run_native(
            APP_NAME,
            options,
            Box::new(|cc| Ok(Box::new(Self::new(cc)))),
        )
    }
}

#[cfg(target_os = "android")]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn android_main(app: winit::platform::android::activity::AndroidApp) {
    use eframe::Renderer;

    unsafe {
        std::env::set_var("RUST_BACKTRACE", "full");
    }
    android_logger::init_once(
        android_logger::Config::default().with_max_level(log::LevelFilter::Info),
    );

    let options = NativeOptions {
        android_app: Some(app),
        renderer: Renderer::Wgpu,
        ..Default::default()
    };

    if let Err(e) = MaskBrushApp::run(options) {
        log::error!("{APP_NAME} exited with an error: {e}");
    }
}
