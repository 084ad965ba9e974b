//! Landmark fixtures shared by the unit tests and the `tests/` integration tests.
//!
//! Integration tests include this file with `#[path]`, so it only names items re-exported from the
//! crate root.

use super::LandmarkSet;

/// An upright right hand with all five fingers spread, palm facing the camera.
pub fn open_hand() -> LandmarkSet {
    LandmarkSet::from_points([
        (0.50, 0.85),
        // Thumb
        (0.42, 0.80),
        (0.36, 0.72),
        (0.31, 0.65),
        (0.27, 0.58),
        // Index
        (0.44, 0.58),
        (0.42, 0.46),
        (0.41, 0.39),
        (0.40, 0.32),
        // Middle
        (0.50, 0.56),
        (0.50, 0.43),
        (0.50, 0.35),
        (0.50, 0.27),
        // Ring
        (0.56, 0.58),
        (0.58, 0.46),
        (0.59, 0.39),
        (0.60, 0.33),
        // Pinky
        (0.61, 0.62),
        (0.64, 0.53),
        (0.66, 0.47),
        (0.68, 0.41),
    ])
    .unwrap()
}

/// An upright closed fist, the thumb and all fingertips folded back towards the palm.
pub fn fist() -> LandmarkSet {
    LandmarkSet::from_points([
        (0.50, 0.85),
        // Thumb
        (0.43, 0.80),
        (0.39, 0.73),
        (0.40, 0.66),
        (0.46, 0.70),
        // Index
        (0.44, 0.60),
        (0.43, 0.52),
        (0.45, 0.58),
        (0.46, 0.63),
        // Middle
        (0.50, 0.59),
        (0.50, 0.51),
        (0.50, 0.57),
        (0.50, 0.62),
        // Ring
        (0.55, 0.60),
        (0.56, 0.53),
        (0.55, 0.59),
        (0.54, 0.64),
        // Pinky
        (0.60, 0.63),
        (0.62, 0.57),
        (0.61, 0.62),
        (0.59, 0.66),
    ])
    .unwrap()
}
