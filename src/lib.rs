//! Static hand-sign recognition.
//!
//! A single still image goes through a fixed sequence of stages:
//!
//! 1. A [`LandmarkDetector`] locates the 21 landmarks of (at most) one hand.
//! 2. [`geometry::extract`] converts them to pixel space and computes their [`BoundingBox`].
//! 3. [`features::normalize`] turns the pixel landmarks into a translation and scale invariant
//!    [`FeatureVector`].
//! 4. The [`Classifier`] runs a pretrained keypoint classification network over that vector.
//! 5. [`prediction::assemble`] maps the result to a human-readable label from a [`LabelTable`].
//!
//! [`Pipeline`] ties these together and owns the loaded networks for the lifetime of the process.
//!
//! # Coordinates
//!
//! Landmarks use image coordinates: the origin is the top left corner, X points to the right, Y
//! points *down*. Detectors emit coordinates as fractions of the image size; once extracted they
//! are integer pixel offsets.
//!
//! # Environment Variables
//!
//! [`Config::from_env`] reads the following variables:
//!
//! * `HANDSIGN_CLASSIFIER_MODEL`: path to the keypoint classifier `.onnx` file.
//! * `HANDSIGN_LANDMARK_MODEL`: path to the hand landmark `.onnx` file.
//! * `HANDSIGN_LABELS`: path to the label CSV file.
//! * `HANDSIGN_LABEL_POLICY`: what to do when the label file cannot be read or parsed. Allowed
//!   values are:
//!   * `strict`: fail startup.
//!   * `lenient`: fall back to [`LabelTable::default`].
//! * `HANDSIGN_MIN_DETECTION_CONFIDENCE`: minimum hand presence score, in range 0.0 to 1.0.
//! * `HANDSIGN_MIRROR`: whether to mirror input images horizontally before detection
//!   (`true`/`false`).

use log::LevelFilter;

pub mod classifier;
pub mod config;
pub mod detector;
pub mod features;
pub mod geometry;
pub mod image;
pub mod labels;
pub mod landmark;
pub mod nn;
pub mod pipeline;
pub mod prediction;
pub mod rect;
pub mod timer;

#[cfg(test)]
mod test;

pub use classifier::{Classification, Classifier, InferenceEngine};
pub use config::Config;
pub use detector::{HandLandmarker, LandmarkDetector};
pub use features::FeatureVector;
pub use labels::{LabelPolicy, LabelTable};
pub use landmark::{Handedness, HandLandmarks, LandmarkSet};
pub use pipeline::{Error, ErrorKind, Pipeline, Stage};
pub use prediction::Prediction;
pub use rect::BoundingBox;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and `handsign` will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `tract` will always log at *warn* level. `RUST_LOG` overrides all of the above.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
