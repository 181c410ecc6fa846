//! Error type shared by every stage of an edit: loading, painting, encoding,
//! the outbound request and saving.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditError>;

#[derive(Debug, Error)]
pub enum EditError {
    /// Upload is not an image format the service accepts.
    #[error("Unsupported image format (expected PNG, JPEG, WebP or GIF)")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("No image loaded")]
    NoImage,

    #[error("Describe the change you want first")]
    EmptyPrompt,

    #[error("Paint over the region to change first")]
    EmptyMask,

    #[error("No API key configured (set GEMINI_API_KEY or enter one in Settings)")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The API key was rejected ({status})")]
    Unauthorized { status: u16 },

    #[error("Rate limited by the image service, try again shortly")]
    RateLimited,

    #[error("Image service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from image service: {0}")]
    Json(#[from] serde_json::Error),

    /// Generation refused or cut short by the service's safety filters.
    #[error("Generation blocked: {reason}")]
    Blocked { reason: String },

    #[error("{}", no_image_message(.note))]
    NoImageReturned { note: Option<String> },

    #[error("The request was interrupted before it finished")]
    Interrupted,

    /// The browser refused or failed the download.
    #[error("Could not save {file}: {detail}")]
    Save { file: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn no_image_message(note: &Option<String>) -> String {
    match note {
        Some(text) => format!("The model answered without an image: {text}"),
        None => "The model returned no image".to_owned(),
    }
}

impl EditError {
    /// Maps a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            429 => Self::RateLimited,
            _ => Self::Api {
                status,
                message: api_error_message(body),
            },
        }
    }
}

// Google-style error bodies look like {"error": {"code": 400, "message": "..."}}.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "(empty response body)".to_owned()
            } else {
                trimmed.to_owned()
            }
        })
}
