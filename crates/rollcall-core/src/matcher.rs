//! Match decision over a reference set.

use crate::references::ReferenceSet;
use crate::types::FaceEncoding;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest distance between two unit-length encodings.
pub const MAX_DISTANCE: f32 = 2.0;

/// Default tolerance for unit-length ArcFace encodings (≈ cosine 0.40).
pub const DEFAULT_TOLERANCE: f32 = 1.10;

/// Distance from `probe` to every known encoding, in order.
pub fn face_distances(known: &[FaceEncoding], probe: &FaceEncoding) -> Vec<f32> {
    known.iter().map(|k| k.distance(probe)).collect()
}

/// Whether each known encoding is within `tolerance` of `probe`.
pub fn compare_faces(known: &[FaceEncoding], probe: &FaceEncoding, tolerance: f32) -> Vec<bool> {
    face_distances(known, probe)
        .into_iter()
        .map(|d| d <= tolerance)
        .collect()
}

/// Percentage confidence: one minus the normalized distance, two decimals.
pub fn confidence_from_distance(distance: f32) -> f32 {
    let pct = (1.0 - distance / MAX_DISTANCE) * 100.0;
    (pct.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// A recognized reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub name: String,
    pub distance: f32,
    /// Percentage in [0, 100].
    pub confidence: f32,
}

impl Recognition {
    fn from_reference(references: &ReferenceSet, idx: usize, distance: f32) -> Self {
        Self {
            name: references.entries()[idx].name.clone(),
            distance,
            confidence: confidence_from_distance(distance),
        }
    }
}

/// Strategy for choosing a reference for a probe encoding.
pub trait Matcher {
    fn recognize(&self, probe: &FaceEncoding, references: &ReferenceSet) -> Option<Recognition>;
}

/// The first reference, in set order, within tolerance.
pub struct FirstMatch {
    pub tolerance: f32,
}

impl Matcher for FirstMatch {
    fn recognize(&self, probe: &FaceEncoding, references: &ReferenceSet) -> Option<Recognition> {
        let known = references.encodings();
        let matches = compare_faces(&known, probe, self.tolerance);
        let distances = face_distances(&known, probe);

        let idx = matches.iter().position(|&m| m)?;
        Some(Recognition::from_reference(references, idx, distances[idx]))
    }
}

/// The closest reference, if it is within tolerance.
pub struct NearestMatch {
    pub tolerance: f32,
}

impl Matcher for NearestMatch {
    fn recognize(&self, probe: &FaceEncoding, references: &ReferenceSet) -> Option<Recognition> {
        let distances = face_distances(&references.encodings(), probe);
        let (idx, &distance) = distances
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))?;

        (distance <= self.tolerance).then(|| Recognition::from_reference(references, idx, distance))
    }
}

/// Configurable choice between [`FirstMatch`] and [`NearestMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    #[default]
    First,
    Nearest,
}

impl MatchStrategy {
    pub fn matcher(self, tolerance: f32) -> Box<dyn Matcher> {
        match self {
            MatchStrategy::First => Box::new(FirstMatch { tolerance }),
            MatchStrategy::Nearest => Box::new(NearestMatch { tolerance }),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(MatchStrategy::First),
            "nearest" => Ok(MatchStrategy::Nearest),
            other => Err(format!("unknown match strategy {other:?} (expected first or nearest)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::ReferenceEntry;

    fn reference(name: &str, values: Vec<f32>) -> ReferenceEntry {
        ReferenceEntry {
            name: name.into(),
            encoding: FaceEncoding::new(values),
            source: format!("{name}.png").into(),
        }
    }

    fn gallery() -> ReferenceSet {
        ReferenceSet::new(vec![
            reference("far", vec![0.0, 1.0, 0.0]),
            reference("close", vec![0.8, 0.6, 0.0]),
            reference("exact", vec![1.0, 0.0, 0.0]),
        ])
    }

    #[test]
    fn test_empty_reference_set_is_not_recognized() {
        let probe = FaceEncoding::new(vec![1.0, 0.0]);
        let empty = ReferenceSet::default();
        assert_eq!(FirstMatch { tolerance: MAX_DISTANCE }.recognize(&probe, &empty), None);
        assert_eq!(NearestMatch { tolerance: MAX_DISTANCE }.recognize(&probe, &empty), None);
    }

    #[test]
    fn test_first_match_takes_first_not_closest() {
        let probe = FaceEncoding::new(vec![1.0, 0.0, 0.0]);
        let result = FirstMatch { tolerance: 0.7 }.recognize(&probe, &gallery()).unwrap();

        // "close" is at distance sqrt(0.04 + 0.36) ≈ 0.632, ahead of "exact" in order.
        assert_eq!(result.name, "close");
        assert!((result.distance - 0.4f32.sqrt()).abs() < 1e-5);
        assert!((result.confidence - 68.38).abs() < 1e-3, "{}", result.confidence);
    }

    #[test]
    fn test_nearest_match_takes_closest() {
        let probe = FaceEncoding::new(vec![1.0, 0.0, 0.0]);
        let result = NearestMatch { tolerance: 0.7 }.recognize(&probe, &gallery()).unwrap();
        assert_eq!(result.name, "exact");
        assert_eq!(result.confidence, 100.0);
    }

    #[test]
    fn test_nothing_within_tolerance() {
        let probe = FaceEncoding::new(vec![0.0, 0.0, 1.0]);
        assert_eq!(FirstMatch { tolerance: 1.0 }.recognize(&probe, &gallery()), None);
        assert_eq!(NearestMatch { tolerance: 1.0 }.recognize(&probe, &gallery()), None);
    }

    #[test]
    fn test_compare_faces_tolerance_is_inclusive() {
        let known = vec![FaceEncoding::new(vec![0.0, 1.0]), FaceEncoding::new(vec![0.0, 2.0])];
        let probe = FaceEncoding::new(vec![0.0, 0.0]);
        assert_eq!(compare_faces(&known, &probe, 1.0), vec![true, false]);
    }

    #[test]
    fn test_confidence_from_distance() {
        assert_eq!(confidence_from_distance(0.0), 100.0);
        assert_eq!(confidence_from_distance(1.0), 50.0);
        assert_eq!(confidence_from_distance(MAX_DISTANCE), 0.0);
        assert_eq!(confidence_from_distance(3.0), 0.0);
        assert!((confidence_from_distance(0.123) - 93.85).abs() < 1e-3);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("First".parse::<MatchStrategy>(), Ok(MatchStrategy::First));
        assert_eq!(" nearest ".parse::<MatchStrategy>(), Ok(MatchStrategy::Nearest));
        assert!("best".parse::<MatchStrategy>().is_err());
    }
}
