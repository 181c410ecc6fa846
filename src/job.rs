//! Runs the edit request off the UI thread and hands the result back through a
//! channel the app polls each frame.

use std::sync::mpsc;

use crate::api::{EditClient, EditRequest, EditedImage};
use crate::error::{EditError, Result};

pub struct PendingEdit {
    receiver: mpsc::Receiver<Result<EditedImage>>,
}

impl PendingEdit {
    pub fn spawn(client: EditClient, request: EditRequest, ctx: egui::Context) -> Self {
        let (sender, receiver) = mpsc::channel();

        #[cfg(not(target_arch = "wasm32"))]
        std::thread::spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(EditError::from)
                .and_then(|runtime| runtime.block_on(client.edit(request)));
            // The receiver is gone if the app shut down meanwhile.
            let _ = sender.send(result);
            ctx.request_repaint();
        });

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let result = client.edit(request).await;
            let _ = sender.send(result);
            ctx.request_repaint();
        });

        Self { receiver }
    }

    /// Non-blocking; `None` while the request is still running.
    pub fn poll(&self) -> Option<Result<EditedImage>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(EditError::Interrupted)),
        }
    }
}

#[cfg(test)]
impl PendingEdit {
    /// A pending edit fed by hand instead of a running request.
    pub(crate) fn channel() -> (mpsc::Sender<Result<EditedImage>>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self { receiver })
    }
}
