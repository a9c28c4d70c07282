//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace crop using the
//! five InsightFace reference landmarks and a least-squares fit.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Fit `dst ≈ [a -b; b a] * src + [tx; ty]` over five point pairs.
///
/// Returns the row-major 3×3 homogeneous matrix.
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 9] {
    // Normal equations (AᵀA) x = Aᵀb, x = [a, b, tx, ty], as an augmented 4×5 matrix.
    let mut m = [[0.0f32; 5]; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        for (row, target) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
            for j in 0..4 {
                for k in 0..4 {
                    m[j][k] += row[j] * row[k];
                }
                m[j][4] += row[j] * target;
            }
        }
    }

    let [a, b, tx, ty] = solve_augmented(m).unwrap_or([1.0, 0.0, 0.0, 0.0]);
    [a, -b, tx, b, a, ty, 0.0, 0.0, 1.0]
}

/// Gaussian elimination with partial pivoting; `None` for a singular system.
fn solve_augmented(mut m: [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    Some(x)
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Pixels that map outside the source image are black.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let mut aligned = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);

    match Projection::from_matrix(matrix) {
        Some(projection) => warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut aligned,
        ),
        None => tracing::warn!(?landmarks, "degenerate landmarks; alignment produced an empty crop"),
    }

    aligned
}
