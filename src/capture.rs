//! Receiver-side capture: one live camera session per view, plus one-shot
//! image uploads. Both feed `QrController::consume_scan`.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::controller::QrController;
use crate::error::{QrError, Result};
use crate::types::{PaymentIntent, ScanSource};

/// A live capture resource (camera stream).
pub trait CaptureHandle: Send {
    /// Releases the resource. Called at most once per handle.
    fn stop(&mut self) -> Result<()>;
}

/// Camera access and frame/image decoding live outside this crate.
pub trait CaptureBackend: Send + Sync {
    /// Opens the camera. Permission or device failures come back as
    /// `CaptureUnavailable`.
    fn open(&self) -> Result<Box<dyn CaptureHandle>>;

    /// Decodes the code contained in a still image.
    fn decode_image(&self, image: &[u8]) -> Result<String>;
}

pub struct CaptureSession {
    id: Uuid,
    handle: Option<Box<dyn CaptureHandle>>,
}

impl CaptureSession {
    fn new(handle: Box<dyn CaptureHandle>) -> Self {
        Self { id: Uuid::new_v4(), handle: Some(handle) }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                warn!(session = %self.id, "capture did not stop cleanly: {e}");
            }
            debug!(session = %self.id, "capture stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct ScannerView {
    backend: Arc<dyn CaptureBackend>,
    controller: Arc<QrController>,
    session: Option<CaptureSession>,
}

impl ScannerView {
    pub fn new(backend: Arc<dyn CaptureBackend>, controller: Arc<QrController>) -> Self {
        Self { backend, controller, session: None }
    }

    /// Starts a camera session, stopping any previous one first.
    pub fn start_camera(&mut self) -> Result<Uuid> {
        self.stop_camera();
        let session = CaptureSession::new(self.backend.open()?);
        let id = session.id();
        debug!(session = %id, "capture started");
        self.session = Some(session);
        Ok(id)
    }

    /// Safe to call when nothing is running.
    pub fn stop_camera(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.session.as_ref().is_some_and(CaptureSession::is_active)
    }

    /// Decoded-text callback for the camera. A verified scan ends the
    /// session; a rejected one leaves it running for another try.
    pub fn on_decoded(&mut self, text: &str) -> Result<PaymentIntent> {
        let intent = self.controller.consume_scan(text, ScanSource::Camera)?;
        self.stop_camera();
        Ok(intent)
    }

    /// Decodes an uploaded image off the async executor and scans the text.
    /// Does not touch the camera session.
    pub async fn scan_upload(&self, image: Vec<u8>) -> Result<PaymentIntent> {
        let backend = self.backend.clone();
        let text = tokio::task::spawn_blocking(move || backend.decode_image(&image))
            .await
            .map_err(|e| QrError::Unexpected(format!("image decode task: {e}")))??;
        self.controller.consume_scan(&text, ScanSource::Upload)
    }
}

impl Drop for ScannerView {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
