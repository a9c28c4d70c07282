//! Reference set: one named face encoding per image in a directory.

use crate::encoder::FaceEncoder;
use crate::error_log::ErrorLog;
use crate::types::FaceEncoding;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const REFERENCE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("cannot read reference directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A known face: name taken from the file stem.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub name: String,
    pub encoding: FaceEncoding,
    pub source: PathBuf,
}

/// Ordered set of references with unique names.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceSet {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encodings(&self) -> Vec<FaceEncoding> {
        self.entries.iter().map(|e| e.encoding.clone()).collect()
    }
}

/// Why a single reference image was left out.
#[derive(Debug, Error)]
enum SkipReason {
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Encode(#[from] crate::encoder::EncodeError),
    #[error("no face found in image")]
    NoFace,
    #[error("duplicate reference name {0:?}")]
    DuplicateName(String),
}

/// Build the reference set from `.jpg`/`.png` files in `dir`.
///
/// Files are visited in file-name order. A file that cannot be decoded,
/// contains no face, or repeats an earlier name is logged and skipped.
pub fn load_references(
    dir: &Path,
    encoder: &mut dyn FaceEncoder,
    log: &ErrorLog,
) -> Result<ReferenceSet, ReferenceError> {
    let read_err = |source| ReferenceError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let listing = std::fs::read_dir(dir).map_err(read_err)?;
    let files = reference_files(dir, listing.map(|entry| entry.map(|e| e.path())), log);

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());

    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match load_one(&path, encoder, &seen) {
            Ok(entry) => {
                tracing::info!(name = %entry.name, file = %file_name, "loaded reference face");
                seen.insert(entry.name.clone());
                entries.push(entry);
            }
            Err(reason) => log.record(&format!("Error processing file {file_name}: {reason}")),
        }
    }

    tracing::info!(dir = %dir.display(), count = entries.len(), "reference set ready");
    Ok(ReferenceSet::new(entries))
}

/// Sorted candidate files; an unreadable directory entry is logged and skipped.
fn reference_files(
    dir: &Path,
    listing: impl Iterator<Item = std::io::Result<PathBuf>>,
    log: &ErrorLog,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = listing
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log.record(&format!("Error reading an entry of {}: {e}", dir.display()));
                None
            }
        })
        .filter(|path| path.is_file() && has_reference_extension(path))
        .collect();
    files.sort();
    files
}

fn load_one(
    path: &Path,
    encoder: &mut dyn FaceEncoder,
    seen: &HashSet<String>,
) -> Result<ReferenceEntry, SkipReason> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if seen.contains(&name) {
        return Err(SkipReason::DuplicateName(name));
    }

    let image = image::open(path)?.to_rgb8();
    let encoding = encoder.encode(&image)?.into_iter().next().ok_or(SkipReason::NoFace)?;

    Ok(ReferenceEntry {
        name,
        encoding,
        source: path.to_path_buf(),
    })
}

fn has_reference_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| REFERENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeError;
    use image::{Rgb, RgbImage};

    /// Encodes any image whose top-left pixel is not black; the encoding is that pixel.
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

    fn write_png(dir: &Path, file: &str, color: [u8; 3]) {
        RgbImage::from_pixel(8, 8, Rgb(color)).save(dir.join(file)).unwrap();
    }

    fn log_contents(log: &ErrorLog) -> String {
        std::fs::read_to_string(log.path()).unwrap_or_default()
    }

    #[test]
    fn test_corrupt_image_is_skipped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let faces = dir.path().join("faces");
        std::fs::create_dir(&faces).unwrap();

        write_png(&faces, "alice.png", [200, 10, 10]);
        std::fs::write(faces.join("broken.jpg"), b"definitely not a jpeg").unwrap();

        let set = load_references(&faces, &mut PixelEncoder, &log).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].name, "alice");
        let logged = log_contents(&log);
        assert_eq!(logged.lines().count(), 1);
        assert!(logged.contains("Error processing file broken.jpg"), "{logged}");
    }

    #[test]
    fn test_image_without_face_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));

        write_png(dir.path(), "empty.png", [0, 0, 0]);

        let set = load_references(dir.path(), &mut PixelEncoder, &log).unwrap();
        assert!(set.is_empty());
        assert!(log_contents(&log).contains("empty.png: no face found in image"));
    }

    #[test]
    fn test_only_jpg_and_png_are_considered() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));

        write_png(dir.path(), "bob.PNG", [10, 200, 10]);
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("carol.gif"), "GIF89a").unwrap();

        let set = load_references(dir.path(), &mut PixelEncoder, &log).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].name, "bob");
        assert!(!log.path().exists());
    }

    #[test]
    fn test_entries_sorted_and_names_unique() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));

        write_png(dir.path(), "zoe.png", [9, 9, 9]);
        write_png(dir.path(), "ana.png", [50, 50, 50]);
        image::RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]))
            .save(dir.path().join("ana.jpg"))
            .unwrap();

        let set = load_references(dir.path(), &mut PixelEncoder, &log).unwrap();
        let names: Vec<&str> = set.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ana", "zoe"]);
        assert_eq!(set.entries()[0].source.file_name().unwrap(), "ana.jpg");
        assert!(log_contents(&log).contains("duplicate reference name \"ana\""));
    }

    #[test]
    fn test_unreadable_entry_is_logged_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let good = dir.path().join("amy.png");
        RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])).save(&good).unwrap();

        let listing = vec![
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "entry vanished")),
            Ok(good.clone()),
        ];
        let files = reference_files(dir.path(), listing.into_iter(), &log);

        assert_eq!(files, [good]);
        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(logged.lines().count(), 1);
        assert!(logged.contains("entry vanished"), "{logged}");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let result = load_references(&dir.path().join("nope"), &mut PixelEncoder, &log);
        assert!(matches!(result, Err(ReferenceError::Directory { .. })));
    }
}
