//! Landmark normalization into classifier features.
//!
//! The keypoint classifier does not see landmark positions directly. Instead, every landmark is
//! expressed relative to the wrist, and the resulting offsets are divided by the single largest
//! absolute offset (across both axes). This makes the features independent of where the hand is
//! in the image and of how large it appears, while preserving its aspect ratio.
//!
//! The classifier was trained on exactly this representation. Per-axis scaling, or any other
//! normalization scheme, produces inputs from a different distribution and degrades accuracy
//! without raising any error.

use std::ops::Index;

use crate::landmark::{PixelLandmarks, NUM_LANDMARKS};

/// The number of values in a [`FeatureVector`]: one X and one Y offset per landmark.
pub const FEATURE_LEN: usize = NUM_LANDMARKS * 2;

/// Normalized landmark offsets, interleaved as `[x0, y0, x1, y1, ...]`.
///
/// Every entry lies in range -1.0 to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    /// Wraps raw feature values.
    ///
    /// No normalization is performed; use [`normalize`] to compute features from landmarks.
    pub fn from_raw(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        self.0.iter().copied()
    }

    /// Returns the normalized offset of landmark `index` from the wrist.
    pub fn point(&self, index: usize) -> (f32, f32) {
        (self.0[index * 2], self.0[index * 2 + 1])
    }

    /// Returns whether every entry is zero.
    ///
    /// This happens when every landmark coincides with the wrist.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

impl Index<usize> for FeatureVector {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

/// Computes the classifier features for a set of pixel landmarks.
///
/// If all landmarks coincide with the wrist, the result is all zeros.
pub fn normalize(landmarks: &PixelLandmarks) -> FeatureVector {
    let base = landmarks.wrist();

    let mut relative = [0i64; FEATURE_LEN];
    for (i, p) in landmarks.iter().enumerate() {
        relative[i * 2] = i64::from(p.x) - i64::from(base.x);
        relative[i * 2 + 1] = i64::from(p.y) - i64::from(base.y);
    }

    let max_value = relative.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
    if max_value == 0 {
        log::trace!("all landmarks coincide with the wrist");
        return FeatureVector([0.0; FEATURE_LEN]);
    }

    let max_value = max_value as f64;
    FeatureVector(relative.map(|v| (v as f64 / max_value) as f32))
}
