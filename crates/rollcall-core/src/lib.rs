//! rollcall-core — face encoding, matching and the reference set.
//!
//! Face detection (SCRFD) and encoding (ArcFace) run through ONNX Runtime
//! behind the [`FaceEncoder`] trait; everything else works on the
//! resulting encodings.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod error_log;
pub mod matcher;
pub mod recognizer;
pub mod references;
pub mod types;

pub use encoder::{default_model_dir, EncodeError, FaceEncoder, OnnxFaceEncoder};
pub use error_log::ErrorLog;
pub use matcher::{FirstMatch, MatchStrategy, Matcher, NearestMatch, Recognition};
pub use references::{load_references, ReferenceEntry, ReferenceError, ReferenceSet};
pub use types::{BoundingBox, FaceEncoding};
