//! User-tunable settings, persisted with the rest of the app state by eframe.
//! The API key is the exception: it is never written to storage.

use crate::mask::Brush;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MODEL_VAR: &str = "MASKBRUSH_MODEL";
pub const ENDPOINT_VAR: &str = "MASKBRUSH_ENDPOINT";

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: String,
    pub model: String,
    pub brush: Brush,
    /// Opacity of the stroke overlay drawn over the source image.
    pub overlay_opacity: f32,

    #[serde(skip)]
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            brush: Brush::default(),
            overlay_opacity: 0.55,
            api_key: String::new(),
        }
    }
}

impl Settings {
    /// Applies environment overrides on top of the persisted values.
    /// The browser has no environment, so on wasm the key is typed in.
    pub fn apply_env(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(API_KEY_VAR) {
            log::info!("Using API key from {API_KEY_VAR}");
            self.api_key = key.trim().to_owned();
        }
        if let Some(model) = non_empty(MODEL_VAR) {
            self.model = model.trim().to_owned();
        }
        if let Some(endpoint) = non_empty(ENDPOINT_VAR) {
            self.endpoint = endpoint.trim().to_owned();
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// `{endpoint}/models/{model}:generateContent`, tolerating a trailing slash
    /// on the endpoint.
    pub fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim().trim_end_matches('/'),
            self.model.trim()
        )
    }
}
