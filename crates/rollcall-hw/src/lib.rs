//! rollcall-hw — Camera capture and live preview.
//!
//! Provides V4L2-based RGB frame capture and a preview window that hands
//! back the frame on screen when the capture key is pressed.

pub mod camera;
pub mod frame;
pub mod preview;

pub use camera::{Camera, CameraError, CameraStream, PixelFormat};
pub use frame::Frame;
pub use preview::{capture_on_keypress, CaptureError, FrameSource, Preview, PreviewEvent, PreviewWindow};
