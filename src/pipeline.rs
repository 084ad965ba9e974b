//! Request orchestration.
//!
//! A request moves through these states, in order:
//!
//! ```text
//! RECEIVED -> DETECTED -> EXTRACTED -> NORMALIZED -> CLASSIFIED -> ASSEMBLED
//!          \-> NO_HAND
//! ```
//!
//! Any stage may instead fail, which ends the request with an [`Error`] naming that stage. An
//! undecodable image fails in [`Stage::Decode`] as [`Error::Input`]. Classification failures are
//! absorbed into an `Unknown` prediction. No stage is ever retried.

use std::fmt;

use crate::{
    classifier::Classifier,
    config::Config,
    detector::{HandLandmarker, LandmarkDetector},
    features,
    geometry,
    image::Image,
    labels::LabelTable,
    prediction::{self, Prediction},
    timer::Timer,
};

/// A step of the recognition pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Detect,
    Extract,
    Normalize,
    Classify,
    Assemble,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Decode,
        Stage::Detect,
        Stage::Extract,
        Stage::Normalize,
        Stage::Classify,
        Stage::Assemble,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Detect => "detect",
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Classify => "classify",
            Stage::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors reported by [`Pipeline`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input image is missing or could not be decoded.
    #[error("invalid input image: {0:#}")]
    Input(#[source] anyhow::Error),
    /// The image was processed, but contains no hand.
    #[error("No hand detected")]
    NoHandDetected,
    /// A pipeline stage failed internally.
    #[error("{stage} stage failed: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
    /// A model or the label table could not be loaded.
    #[error("startup failed: {0:#}")]
    Startup(#[source] anyhow::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied unusable input.
    Client,
    /// No hand was found. This is an expected outcome, not a malfunction.
    NoHand,
    /// Processing failed for reasons outside of the caller's control.
    Internal,
    /// The pipeline could not be constructed.
    Startup,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::Client,
            Error::NoHandDetected => ErrorKind::NoHand,
            Error::Stage { .. } => ErrorKind::Internal,
            Error::Startup(_) => ErrorKind::Startup,
        }
    }

    /// Returns the stage that failed.
    ///
    /// [`Error::Input`] is reported as [`Stage::Decode`]. Returns [`None`] for errors that are not
    /// tied to a stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Input(_) => Some(Stage::Decode),
            Error::Stage { stage, .. } => Some(*stage),
            Error::NoHandDetected | Error::Startup(_) => None,
        }
    }
}

/// One [`Timer`] per [`Stage`].
struct Timers([Timer; Stage::ALL.len()]);

impl Timers {
    fn new() -> Self {
        Self(Stage::ALL.map(|stage| Timer::new(stage.name())))
    }

    fn get(&self, stage: Stage) -> &Timer {
        &self.0[stage as usize]
    }
}

/// Runs single images through detection, feature extraction and classification.
///
/// The pipeline owns its detector, classifier and label table. It is meant to be created once and
/// then shared (for example via [`std::sync::Arc`]) by every thread that handles requests.
pub struct Pipeline {
    detector: Box<dyn LandmarkDetector>,
    classifier: Classifier,
    labels: LabelTable,
    mirror: bool,
    timers: Timers,
}

impl Pipeline {
    /// Creates a pipeline from its parts.
    ///
    /// Mirroring is disabled; enable it with [`Pipeline::with_mirror`].
    pub fn new<D: LandmarkDetector + 'static>(
        detector: D,
        classifier: Classifier,
        labels: LabelTable,
    ) -> Self {
        Self {
            detector: Box::new(detector),
            classifier,
            labels,
            mirror: false,
            timers: Timers::new(),
        }
    }

    /// Sets whether images are mirrored horizontally before detection.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Loads all models and the label table described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let labels =
            LabelTable::load(config.labels(), config.label_policy()).map_err(Error::Startup)?;
        let classifier = Classifier::load(config.classifier_model()).map_err(Error::Startup)?;
        let detector = HandLandmarker::load(
            config.landmark_model(),
            config.min_detection_confidence(),
        )
        .map_err(Error::Startup)?;

        Ok(Self::new(detector, classifier, labels).with_mirror(config.mirror()))
    }

    #[inline]
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Returns the timer measuring `stage`.
    #[inline]
    pub fn timer(&self, stage: Stage) -> &Timer {
        self.timers.get(stage)
    }

    /// Returns the per-stage timers, in [`Stage::ALL`] order.
    ///
    /// Displaying a timer resets it.
    pub fn timers(&self) -> [&Timer; Stage::ALL.len()] {
        Stage::ALL.map(|stage| self.timer(stage))
    }

    /// Decodes an encoded image and runs it through the pipeline.
    ///
    /// Empty or undecodable data results in [`Error::Input`] without running detection.
    pub fn predict_bytes(&self, data: &[u8]) -> Result<Prediction, Error> {
        let image = self
            .timer(Stage::Decode)
            .time(|| Image::decode(data))
            .map_err(Error::Input)?;
        log::trace!("decoded {} image", image.resolution());
        self.predict(&image)
    }

    /// Runs a decoded image through the pipeline.
    pub fn predict(&self, image: &Image) -> Result<Prediction, Error> {
        let res = image.resolution();
        if res.is_empty() {
            return Err(Error::Input(anyhow::anyhow!("image is empty ({})", res)));
        }

        let mirrored;
        let image = if self.mirror {
            mirrored = image.flip_horizontal();
            &mirrored
        } else {
            image
        };

        let hand = self
            .timer(Stage::Detect)
            .time(|| self.detector.detect(image))
            .map_err(|source| Error::Stage {
                stage: Stage::Detect,
                source,
            })?;
        let Some(hand) = hand else {
            log::debug!("no hand detected in {} image", res);
            return Err(Error::NoHandDetected);
        };
        log::trace!(
            "detected {} hand (presence {})",
            hand.handedness,
            hand.presence
        );

        let (pixels, bbox) = self
            .timer(Stage::Extract)
            .time(|| geometry::extract(res, &hand.landmarks));

        let features = self
            .timer(Stage::Normalize)
            .time(|| features::normalize(&pixels));
        log::trace!("features: {:?}", features.as_slice());

        let classification = self
            .timer(Stage::Classify)
            .time(|| self.classifier.classify(&features));

        let prediction = self.timer(Stage::Assemble).time(|| {
            prediction::assemble(
                classification.label_index,
                classification.confidence,
                bbox,
                hand.handedness,
                &self.labels,
            )
        });
        log::debug!(
            "{} hand: '{}' (#{}) with confidence {:.3} in {:?}",
            prediction.handedness,
            prediction.label,
            prediction.label_index,
            prediction.confidence,
            prediction.bounding_box.to_array(),
        );
        Ok(prediction)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("classifier", &self.classifier)
            .field("labels", &self.labels.len())
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}
