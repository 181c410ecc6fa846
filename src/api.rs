//! The one outbound call: source image, mask and prompt go to a multimodal
//! `generateContent` endpoint, an edited image comes back.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::encoding::{InlineImage, decode_rgba};
use crate::error::{EditError, Result};

#[cfg(not(target_arch = "wasm32"))]
static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A validated edit: what to change, where, and on which image.
#[derive(Clone, Debug)]
pub struct EditRequest {
    pub prompt: String,
    pub image: InlineImage,
    pub mask: InlineImage,
}

impl EditRequest {
    pub fn new(prompt: &str, image: InlineImage, mask_png: Option<&[u8]>) -> Result<Self> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditError::EmptyPrompt);
        }
        let mask = mask_png.ok_or(EditError::EmptyMask)?;
        Ok(Self {
            prompt: prompt.to_owned(),
            image,
            mask: InlineImage::png(mask),
        })
    }

    fn instruction(&self) -> String {
        format!(
            "Edit the first image. The second image is a mask of the same size: \
             white pixels mark the region to change, black pixels must stay exactly \
             as they are. In the white region: {}. Blend the edit naturally with its \
             surroundings and return the full edited image.",
            self.prompt
        )
    }

    /// Request body for `generateContent`.
    pub fn to_body(&self) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_owned()),
                parts: vec![
                    Part::text(self.instruction()),
                    Part::inline(&self.image),
                    Part::inline(&self.mask),
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_owned(), "IMAGE".to_owned()],
            },
        }
    }
}

/// What came back: the decoded image plus the raw file for saving.
#[derive(Clone, Debug)]
pub struct EditedImage {
    pub image: RgbaImage,
    pub file: InlineImage,
    /// Any text the model sent alongside the image.
    pub note: Option<String>,
}

// --- Wire types ----------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "inline_data")]
    inline_data: Option<Blob>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline(image: &InlineImage) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Pulls the edited image out of a successful response.
    pub fn into_edited_image(self) -> Result<EditedImage> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(EditError::Blocked { reason });
        }
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(EditError::NoImageReturned { note: None });
        };

        let mut file = None;
        let mut notes = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                notes.push(text.trim().to_owned());
            }
            if file.is_none()
                && let Some(blob) = part.inline_data
            {
                file = Some(InlineImage {
                    mime_type: blob.mime_type,
                    data: blob.data,
                });
            }
        }
        let note = (!notes.is_empty()).then(|| notes.join("\n"));

        let Some(file) = file else {
            return match candidate.finish_reason {
                Some(reason) if reason != "STOP" => Err(EditError::Blocked { reason }),
                _ => Err(EditError::NoImageReturned { note }),
            };
        };
        let image = decode_rgba(&file.decode()?)?;
        Ok(EditedImage { image, file, note })
    }
}

// --- Client ----------------------------------------------------------------------

#[derive(Clone)]
pub struct EditClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl EditClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        if !settings.has_api_key() {
            return Err(EditError::MissingApiKey);
        }
        let builder = reqwest::Client::builder();
        // Browsers own the User-Agent header.
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.user_agent(USER_AGENT);
        let http = builder.build()?;
        Ok(Self {
            http,
            url: settings.generate_url(),
            api_key: settings.api_key.trim().to_owned(),
        })
    }

    /// Sends the request once. No retries: failures are reported as-is.
    pub async fn edit(&self, request: EditRequest) -> Result<EditedImage> {
        log::info!("Requesting edit from {}", self.url);
        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request.to_body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Image service returned {status}: {body}");
            return Err(EditError::from_status(status.as_u16(), &body));
        }
        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        parsed.into_edited_image()
    }
}
