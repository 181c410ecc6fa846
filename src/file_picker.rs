// Cross-platform file IO. On wasm we open files through a hidden <input type=file>
// and save through a Blob URL download; natively rfd dialogs block the frame until
// the user picks something.

use crate::error::{EditError, Result};

/// Extensions offered by the open dialog; one or more per supported MIME type.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

#[cfg(target_arch = "wasm32")]
mod web {
    use js_sys::Uint8Array;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::JsValue;
    use wasm_bindgen::closure::Closure;
    use web_sys::{Blob, BlobPropertyBag, FileReader, HtmlAnchorElement, HtmlInputElement, Url};

    use crate::encoding::SUPPORTED_MIME_TYPES;

    /// How long a download's object URL outlives the click.
    const REVOKE_DELAY_MS: i32 = 30_000;

    static SELECTED_IMAGE: Lazy<Mutex<Option<(Vec<u8>, String)>>> = Lazy::new(|| Mutex::new(None));

    pub fn open_image_picker() {
        log::debug!("file_picker: open_image_picker called");
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };

        let Some(input) = document
            .create_element("input")
            .ok()
            .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
        else {
            return;
        };

        input.set_type("file");
        input.set_accept(&SUPPORTED_MIME_TYPES.join(","));
        // Off-screen rather than display:none; some browsers block clicks on hidden inputs.
        let _ = input.set_attribute(
            "style",
            "position: fixed; left: -9999px; width: 1px; height: 1px; opacity: 0;",
        );
        if let Some(body) = document.body() {
            let _ = body.append_child(&input);
        }

        let onchange = Closure::wrap(Box::new(move |ev: web_sys::Event| {
            let Some(input) = ev.target().and_then(|t| t.dyn_into::<HtmlInputElement>().ok())
            else {
                return;
            };
            let Some(file) = input.files().and_then(|files| files.get(0)) else {
                return;
            };
            let Ok(reader) = FileReader::new() else {
                return;
            };
            let reader2 = reader.clone();
            let name = file.name();
            let onload = Closure::once(Box::new(move |_e: JsValue| {
                let Ok(result) = reader2.result() else {
                    log::error!("Failed to read {name}");
                    return;
                };
                let bytes = Uint8Array::new(&result).to_vec();
                if let Ok(mut slot) = SELECTED_IMAGE.lock() {
                    *slot = Some((bytes, name));
                }
            }) as Box<dyn FnOnce(_)>);
            reader.set_onload(Some(onload.as_ref().unchecked_ref()));
            onload.forget();
            let _ = reader.read_as_array_buffer(&file);
            input.remove();
        }) as Box<dyn FnMut(_)>);

        input.set_onchange(Some(onchange.as_ref().unchecked_ref()));
        onchange.forget(); // keep alive

        input.click();
    }

    pub fn take_selected_image_bytes() -> Option<(Vec<u8>, String)> {
        SELECTED_IMAGE.lock().ok()?.take()
    }

    pub fn download(bytes: &[u8], file_name: &str, mime: &str) -> Result<(), JsValue> {
        let parts = js_sys::Array::new();
        parts.push(&Uint8Array::from(bytes));
        let options = BlobPropertyBag::new();
        options.set_type(mime);
        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
        let url = Url::create_object_url_with_blob(&blob)?;

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let anchor = document
            .create_element("a")?
            .dyn_into::<HtmlAnchorElement>()
            .map_err(JsValue::from)?;
        anchor.set_href(&url);
        anchor.set_download(file_name);
        anchor.click();

        // Revoking straight after the click cancels the download in some browsers.
        let revoke = Closure::once_into_js(move || {
            if let Err(e) = Url::revoke_object_url(&url) {
                log::warn!("Failed to revoke download URL: {e:?}");
            }
        });
        window.set_timeout_with_callback_and_timeout_and_arguments_0(
            revoke.unchecked_ref(),
            REVOKE_DELAY_MS,
        )?;
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{open_image_picker, take_selected_image_bytes};

// Native stubs; native builds pick files with `pick_image` instead.
#[cfg(not(target_arch = "wasm32"))]
pub fn open_image_picker() {}

#[cfg(not(target_arch = "wasm32"))]
pub fn take_selected_image_bytes() -> Option<(Vec<u8>, String)> {
    None
}

/// Opens a native dialog and reads the chosen image. `Ok(None)` when cancelled.
#[cfg(all(not(target_arch = "wasm32"), not(target_os = "android")))]
pub fn pick_image() -> Result<Option<(Vec<u8>, String)>> {
    let Some(path) = rfd::FileDialog::new()
        .add_filter("Image", IMAGE_EXTENSIONS)
        .pick_file()
    else {
        return Ok(None);
    };
    let bytes = std::fs::read(&path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Some((bytes, name)))
}

/// Saves `bytes` under a user-chosen name: a save dialog natively, a download in the
/// browser. Returns whether anything was written.
pub fn save_bytes(bytes: &[u8], file_name: &str, mime: &str) -> Result<bool> {
    #[cfg(target_arch = "wasm32")]
    {
        web::download(bytes, file_name, mime).map_err(|e| save_failed(file_name, e))?;
        Ok(true)
    }

    #[cfg(all(not(target_arch = "wasm32"), not(target_os = "android")))]
    {
        let extension = file_name.rsplit_once('.').map_or("png", |(_, ext)| ext);
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(file_name)
            .add_filter(mime, &[extension])
            .save_file()
        else {
            return Ok(false);
        };
        std::fs::write(&path, bytes)?;
        log::info!("Saved {}", path.display());
        Ok(true)
    }

    #[cfg(target_os = "android")]
    {
        let _ = (bytes, mime);
        log::warn!("Saving {file_name} is not supported on Android");
        Ok(false)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn save_failed(file_name: &str, detail: impl std::fmt::Debug) -> EditError {
    EditError::Save {
        file: file_name.to_owned(),
        detail: format!("{detail:?}"),
    }
}
