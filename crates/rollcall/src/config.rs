use rollcall_core::matcher::DEFAULT_TOLERANCE;
use rollcall_core::MatchStrategy;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Run configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of reference face images (`<name>.jpg` / `<name>.png`).
    pub references_dir: PathBuf,
    /// Directory receiving captured frames.
    pub captures_dir: PathBuf,
    /// Append-only error log.
    pub error_log: PathBuf,
    /// Attendance spreadsheet, rewritten in full on each mark.
    pub attendance_file: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Largest encoding distance that still counts as a match.
    pub tolerance: f32,
    pub match_strategy: MatchStrategy,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            references_dir: env_path("ROLLCALL_REFERENCES_DIR", "known_faces"),
            captures_dir: env_path("ROLLCALL_CAPTURES_DIR", "captured_images"),
            error_log: env_path("ROLLCALL_ERROR_LOG", "error_log.txt"),
            attendance_file: env_path("ROLLCALL_ATTENDANCE_FILE", "attendance.xlsx"),
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| rollcall_core::default_model_dir()),
            tolerance: env_with("ROLLCALL_TOLERANCE", DEFAULT_TOLERANCE, parse_tolerance),
            match_strategy: env_parse("ROLLCALL_MATCH_STRATEGY", MatchStrategy::First),
            warmup_frames: env_parse("ROLLCALL_WARMUP_FRAMES", 4),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Tolerance from text: a finite, non-negative distance.
pub fn parse_tolerance(value: &str) -> Result<f32, String> {
    let tolerance: f32 = value.trim().parse().map_err(|e| format!("{e}"))?;
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(tolerance)
    } else {
        Err(format!("tolerance must be a finite non-negative number, got {value}"))
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    env_with(key, default, |v| v.parse::<T>().map_err(|e| e.to_string()))
}

/// Parse `key` with `parse`; an unset variable or a bad value yields `default`.
fn env_with<T>(key: &str, default: T, parse: impl FnOnce(&str) -> Result<T, String>) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match parse(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tolerance() {
        assert_eq!(parse_tolerance("0.6"), Ok(0.6));
        assert_eq!(parse_tolerance("0"), Ok(0.0));
        assert!(parse_tolerance("NaN").is_err());
        assert!(parse_tolerance("inf").is_err());
        assert!(parse_tolerance("-0.5").is_err());
        assert!(parse_tolerance("close").is_err());
    }

    #[test]
    fn test_invalid_env_values_fall_back_to_defaults() {
        std::env::set_var("ROLLCALL_TEST_TOLERANCE_NAN", "NaN");
        std::env::set_var("ROLLCALL_TEST_STRATEGY_TYPO", "frist");
        std::env::set_var("ROLLCALL_TEST_WARMUP_OK", "2");

        assert_eq!(
            env_with("ROLLCALL_TEST_TOLERANCE_NAN", DEFAULT_TOLERANCE, parse_tolerance),
            DEFAULT_TOLERANCE
        );
        assert_eq!(
            env_parse("ROLLCALL_TEST_STRATEGY_TYPO", MatchStrategy::First),
            MatchStrategy::First
        );
        assert_eq!(env_parse("ROLLCALL_TEST_WARMUP_OK", 4usize), 2);
        assert_eq!(env_parse("ROLLCALL_TEST_UNSET", 4usize), 4);
    }
}
