//! Live preview and the keypress-gated capture loop.

use crate::camera::CameraError;
use crate::frame::Frame;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use thiserror::Error;

const PREVIEW_FPS: usize = 30;

/// A blocking supplier of camera frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// What the user asked for after a frame was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    Continue,
    Capture,
    Close,
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("preview window: {0}")]
    Window(String),
}

/// Displays frames and reports key events.
pub trait Preview {
    fn show(&mut self, frame: &Frame) -> Result<PreviewEvent, PreviewError>;
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("{0}")]
    Preview(#[from] PreviewError),
}

/// `minifb` window: Space captures, Escape or closing the window cancels.
pub struct PreviewWindow {
    title: String,
    window: Option<Window>,
}

impl PreviewWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window: None,
        }
    }

    fn window_for(&mut self, frame: &Frame) -> Result<&mut Window, PreviewError> {
        if self.window.is_none() {
            let mut window = Window::new(
                &self.title,
                frame.width() as usize,
                frame.height() as usize,
                WindowOptions::default(),
            )
            .map_err(|e| PreviewError::Window(e.to_string()))?;
            window.set_target_fps(PREVIEW_FPS);
            tracing::debug!(width = frame.width(), height = frame.height(), "preview window opened");
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| PreviewError::Window("window unavailable".into()))
    }
}

impl Preview for PreviewWindow {
    fn show(&mut self, frame: &Frame) -> Result<PreviewEvent, PreviewError> {
        let buffer = frame.to_argb();
        let window = self.window_for(frame)?;

        window
            .update_with_buffer(&buffer, frame.width() as usize, frame.height() as usize)
            .map_err(|e| PreviewError::Window(e.to_string()))?;

        if !window.is_open() || window.is_key_down(Key::Escape) {
            Ok(PreviewEvent::Close)
        } else if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            Ok(PreviewEvent::Capture)
        } else {
            Ok(PreviewEvent::Continue)
        }
    }
}

/// Stream frames into `preview` until the user captures or closes.
///
/// Returns the frame that was on screen when capture was requested, or
/// `None` if the preview was closed. A failed frame grab ends the loop.
pub fn capture_on_keypress(
    source: &mut dyn FrameSource,
    preview: &mut dyn Preview,
) -> Result<Option<Frame>, CaptureError> {
    loop {
        let frame = source.next_frame()?;
        match preview.show(&frame)? {
            PreviewEvent::Continue => continue,
            PreviewEvent::Capture => {
                tracing::info!(seq = frame.sequence, "frame captured");
                return Ok(Some(frame));
            }
            PreviewEvent::Close => {
                tracing::info!("preview closed without capture");
                return Ok(None);
            }
        }
    }
}
