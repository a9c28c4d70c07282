use crate::attendance::{self, AttendanceError, AttendanceRecord};
use crate::config::Config;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use image::RgbImage;
use rollcall_core::{
    load_references, EncodeError, ErrorLog, FaceEncoder, Matcher, OnnxFaceEncoder, Recognition,
    ReferenceSet,
};
use rollcall_hw::{capture_on_keypress, Camera, Frame, FrameSource, PreviewWindow};
use std::path::{Path, PathBuf};

const PREVIEW_TITLE: &str = "Press Space to capture";

/// Result of matching one captured image.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Recognized(Recognition),
    NotRecognized,
    NoFace,
}

/// Result of a full `mark` run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Marked(Recognition),
    NotRecognized,
    NoFace,
    Cancelled,
}

/// Loaded encoder and reference set for one run.
pub struct Session {
    encoder: Box<dyn FaceEncoder>,
    references: ReferenceSet,
    matcher: Box<dyn Matcher>,
    log: ErrorLog,
}

impl Session {
    pub fn new(
        encoder: Box<dyn FaceEncoder>,
        references: ReferenceSet,
        matcher: Box<dyn Matcher>,
        log: ErrorLog,
    ) -> Self {
        Self {
            encoder,
            references,
            matcher,
            log,
        }
    }

    /// Load the ONNX models, then build the reference set.
    ///
    /// Fails fast if the models or the reference directory are unavailable.
    pub fn prepare(config: &Config) -> Result<Self> {
        let log = ErrorLog::new(&config.error_log);

        let mut encoder = OnnxFaceEncoder::load(&config.model_dir)
            .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;

        let references = load_references(&config.references_dir, &mut encoder, &log)?;
        if references.is_empty() {
            tracing::warn!(dir = %config.references_dir.display(), "reference set is empty");
        }

        Ok(Self::new(
            Box::new(encoder),
            references,
            config.match_strategy.matcher(config.tolerance),
            log,
        ))
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.log
    }

    /// Encode the first face in `image` and match it against the references.
    pub fn identify(&mut self, image: &RgbImage) -> Result<Identification, EncodeError> {
        let Some(probe) = self.encoder.encode(image)?.into_iter().next() else {
            return Ok(Identification::NoFace);
        };

        Ok(match self.matcher.recognize(&probe, &self.references) {
            Some(recognition) => {
                tracing::info!(
                    name = %recognition.name,
                    distance = recognition.distance,
                    confidence = recognition.confidence,
                    "face recognized"
                );
                Identification::Recognized(recognition)
            }
            None => Identification::NotRecognized,
        })
    }

    /// Append an attendance row for `recognition`.
    pub fn mark(&self, recognition: &Recognition, attendance_file: &Path) -> Result<(), AttendanceError> {
        let record = AttendanceRecord::now(&recognition.name);
        attendance::mark_attendance(attendance_file, &record, &self.log)
    }
}

/// `captured_<YYYYmmdd_HHMMSS>.jpg`
pub fn capture_file_name(at: NaiveDateTime) -> String {
    format!("captured_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// Persist `frame` under `dir`, creating the directory if needed.
///
/// A failure is logged and yields `None`; the frame stays usable in memory.
pub fn save_capture(frame: &Frame, dir: &Path, at: NaiveDateTime, log: &ErrorLog) -> Option<PathBuf> {
    let path = dir.join(capture_file_name(at));
    let result = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| frame.save_jpeg(&path).map_err(|e| e.to_string()));

    match result {
        Ok(()) => Some(path),
        Err(e) => {
            log.record(&format!("Error saving captured image {}: {e}", path.display()));
            None
        }
    }
}

/// Open the camera, show the preview, and return the frame captured on Space.
///
/// The camera is released before returning.
pub fn capture(config: &Config, log: &ErrorLog) -> Result<Option<Frame>> {
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("could not open webcam {}", config.camera_device))?;
    let mut stream = camera.stream()?;

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        for _ in 0..config.warmup_frames {
            stream.next_frame().context("failed to grab frame")?;
        }
    }

    println!("Press Space to capture an image.");
    let mut preview = PreviewWindow::new(PREVIEW_TITLE);
    let Some(frame) = capture_on_keypress(&mut stream, &mut preview).context("failed to grab frame")? else {
        return Ok(None);
    };

    if frame.is_dark {
        tracing::warn!(brightness = frame.avg_brightness(), "captured frame is very dark");
    }
    if let Some(path) = save_capture(&frame, &config.captures_dir, Local::now().naive_local(), log) {
        println!("Image saved at {}", path.display());
    }

    Ok(Some(frame))
}

/// Load references, capture, match, and mark attendance.
pub fn run_mark(config: &Config) -> Result<Outcome> {
    let mut session = Session::prepare(config)?;

    let Some(frame) = capture(config, session.error_log())? else {
        return Ok(Outcome::Cancelled);
    };

    let recognition = match session.identify(&frame.image)? {
        Identification::Recognized(recognition) => recognition,
        Identification::NotRecognized => return Ok(Outcome::NotRecognized),
        Identification::NoFace => return Ok(Outcome::NoFace),
    };

    session
        .mark(&recognition, &config.attendance_file)
        .context("attendance was not marked")?;

    Ok(Outcome::Marked(recognition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceTable;
    use chrono::NaiveDate;
    use image::Rgb;
    use rollcall_core::{FaceEncoding, FirstMatch, ReferenceEntry};

    /// Encodes the top-left pixel; black means no face.
    struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncodeError> {
            let px = image.get_pixel(0, 0).0;
            if px == [0, 0, 0] {
                return Ok(vec![]);
            }
            Ok(vec![FaceEncoding::new(px.iter().map(|&v| v as f32 / 255.0).collect())])
        }
    }

    fn session(references: Vec<ReferenceEntry>, dir: &Path) -> Session {
        Session::new(
            Box::new(PixelEncoder),
            ReferenceSet::new(references),
            Box::new(FirstMatch { tolerance: 0.1 }),
            ErrorLog::new(dir.join("error_log.txt")),
        )
    }

    fn reference(name: &str, rgb: [u8; 3]) -> ReferenceEntry {
        ReferenceEntry {
            name: name.into(),
            encoding: FaceEncoding::new(rgb.iter().map(|&v| v as f32 / 255.0).collect()),
            source: format!("{name}.png").into(),
        }
    }

    fn solid(rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb(rgb))
    }

    #[test]
    fn test_identify_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(vec![reference("amy", [200, 0, 0])], dir.path());
        assert_eq!(s.identify(&solid([0, 0, 0])).unwrap(), Identification::NoFace);
    }

    #[test]
    fn test_identify_empty_references_not_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(vec![], dir.path());
        assert_eq!(s.identify(&solid([200, 0, 0])).unwrap(), Identification::NotRecognized);
    }

    #[test]
    fn test_identify_and_mark() {
        let dir = tempfile::tempdir().unwrap();
        let attendance_file = dir.path().join("attendance.xlsx");
        let mut s = session(
            vec![reference("amy", [200, 0, 0]), reference("ben", [0, 200, 0])],
            dir.path(),
        );

        let Identification::Recognized(recognition) = s.identify(&solid([0, 200, 0])).unwrap() else {
            panic!("expected a recognition");
        };
        assert_eq!(recognition.name, "ben");
        assert_eq!(recognition.confidence, 100.0);

        s.mark(&recognition, &attendance_file).unwrap();
        let table = AttendanceTable::load(&attendance_file).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "Name"), Some("ben"));
    }

    #[test]
    fn test_capture_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(14, 3, 7)
            .unwrap();
        assert_eq!(capture_file_name(at), "captured_20240131_140307.jpg");
    }

    #[test]
    fn test_save_capture_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let frame = Frame::new(solid([120, 120, 120]), 0);
        let at = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(14, 3, 7)
            .unwrap();

        let path = save_capture(&frame, &dir.path().join("captures"), at, &log).unwrap();
        assert!(path.ends_with("captures/captured_20240131_140307.jpg"));
        assert!(path.exists());
    }

    #[test]
    fn test_save_capture_failure_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let blocker = dir.path().join("captures");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let frame = Frame::new(solid([120, 120, 120]), 0);
        let at = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(14, 3, 7)
            .unwrap();

        assert!(save_capture(&frame, &blocker, at, &log).is_none());
        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert!(logged.contains("Error saving captured image"), "{logged}");
    }
}
