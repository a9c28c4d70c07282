//! The face-encoding seam: image in, one encoding per detected face out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceEncoding;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Produces face encodings for every face found in an image.
///
/// Encodings are ordered by detection confidence, highest first. An empty
/// result means no face was found.
pub trait FaceEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncodeError>;
}

/// SCRFD detection followed by ArcFace encoding.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncodeError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(faces = faces.len(), "detected faces");

        faces
            .iter()
            .map(|face| self.recognizer.encode(image, face).map_err(EncodeError::from))
            .collect()
    }
}

/// Default directory holding the ONNX model files.
///
/// `$XDG_DATA_HOME/rollcall/models`, else `$HOME/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
