//! Keypoint classification.
//!
//! The [`Classifier`] owns an [`InferenceEngine`] that maps a [`FeatureVector`] to per-class
//! scores. The engine is loaded once and then shared by every request; calls are serialized so
//! that each inference runs as one uninterrupted unit.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{Mutex, PoisonError},
};

use tract_onnx::prelude::{tract_ndarray, IntoTensor};

use crate::{
    features::{FeatureVector, FEATURE_LEN},
    nn::{Inputs, NeuralNetwork},
};

/// Shape of the classifier input: a batch containing a single feature vector.
pub const INPUT_SHAPE: [usize; 2] = [1, FEATURE_LEN];

/// Trait for inference backends that score a feature vector.
///
/// Implementations return one probability-like score per class. They get exclusive access while
/// running, so they may keep mutable scratch state between calls.
pub trait InferenceEngine: Send {
    /// Computes the class scores for `features`.
    fn infer(&mut self, features: &FeatureVector) -> anyhow::Result<Vec<f32>>;
}

impl<F> InferenceEngine for F
where
    F: FnMut(&FeatureVector) -> anyhow::Result<Vec<f32>> + Send,
{
    fn infer(&mut self, features: &FeatureVector) -> anyhow::Result<Vec<f32>> {
        self(features)
    }
}

/// An [`InferenceEngine`] backed by an ONNX keypoint classification network.
pub struct OnnxEngine {
    nn: NeuralNetwork,
    num_classes: usize,
}

impl OnnxEngine {
    /// Loads the network from an `.onnx` file.
    ///
    /// Fails unless the network takes a single `[1, 42]` input and produces a `[1, C]` output
    /// as its first output.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let nn = NeuralNetwork::from_path(path)?
            .with_input_shape(&INPUT_SHAPE)
            .load()?;
        let engine = Self::new(nn)?;
        log::info!(
            "loaded keypoint classifier '{}' ({} classes)",
            path.display(),
            engine.num_classes(),
        );
        Ok(engine)
    }

    /// Wraps an already loaded network, validating its input and output shapes.
    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        anyhow::ensure!(
            nn.num_inputs() == 1,
            "keypoint classifier has to take exactly 1 input, this one takes {}",
            nn.num_inputs(),
        );
        let input = &nn.inputs()[0];
        anyhow::ensure!(
            input.shape() == INPUT_SHAPE,
            "keypoint classifier input '{}' has shape {:?}, expected {:?}",
            input.name(),
            input.shape(),
            INPUT_SHAPE,
        );

        let num_classes = match nn.outputs().first().map(|info| info.shape()) {
            Some([1, classes]) if *classes > 0 => *classes,
            Some(shape) => anyhow::bail!(
                "keypoint classifier output has shape {:?}, expected [1, C]",
                shape
            ),
            None => anyhow::bail!("keypoint classifier has no outputs"),
        };

        Ok(Self { nn, num_classes })
    }

    /// Returns the number of classes the network distinguishes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl InferenceEngine for OnnxEngine {
    fn infer(&mut self, features: &FeatureVector) -> anyhow::Result<Vec<f32>> {
        let input =
            tract_ndarray::Array2::from_shape_vec(INPUT_SHAPE, features.as_slice().to_vec())?
                .into_tensor();
        let outputs = self.nn.estimate(Inputs::from(input))?;
        Ok(outputs.f32_slice(0, &[1, self.num_classes])?.to_vec())
    }
}

/// The outcome of classifying one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Index of the highest-scoring class, or [`None`] if inference failed.
    pub label_index: Option<usize>,
    /// Score of the highest-scoring class. `0.0` if inference failed.
    pub confidence: f32,
}

impl Classification {
    /// The result reported when inference fails.
    pub const NONE: Self = Self {
        label_index: None,
        confidence: 0.0,
    };

    /// Picks the highest score. Ties resolve to the lowest index.
    ///
    /// Returns [`None`] if `scores` is empty or the maximum is not a finite number.
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        let (index, max) = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| !score.is_nan())
            .fold(None, |best: Option<(usize, f32)>, (i, score)| match best {
                Some((_, max)) if score <= max => best,
                _ => Some((i, score)),
            })?;

        max.is_finite().then_some(Self {
            label_index: Some(index),
            confidence: max,
        })
    }
}

/// Wrapper that serializes access to a shared [`InferenceEngine`].
pub struct Classifier {
    engine: Mutex<Box<dyn InferenceEngine>>,
}

impl Classifier {
    pub fn new<E: InferenceEngine + 'static>(engine: E) -> Self {
        Self {
            engine: Mutex::new(Box::new(engine)),
        }
    }

    /// Loads an ONNX keypoint classifier from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        OnnxEngine::load(path).map(Self::new)
    }

    /// Classifies a feature vector.
    ///
    /// This never fails: engine errors and panics are logged and reported as
    /// [`Classification::NONE`].
    pub fn classify(&self, features: &FeatureVector) -> Classification {
        // A panic inside a previous call leaves the engine itself intact.
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);

        let scores = match panic::catch_unwind(AssertUnwindSafe(|| engine.infer(features))) {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => {
                log::error!("keypoint classification failed: {:#}", e);
                return Classification::NONE;
            }
            Err(payload) => {
                log::error!(
                    "keypoint classifier panicked: {}",
                    panic_message(payload.as_ref())
                );
                return Classification::NONE;
            }
        };
        drop(engine);

        match Classification::from_scores(&scores) {
            Some(classification) => {
                log::trace!("class scores: {:?}", scores);
                classification
            }
            None => {
                log::error!("keypoint classifier produced no usable scores: {:?}", scores);
                Classification::NONE
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use approx::assert_relative_eq;

    use super::*;

    fn features() -> FeatureVector {
        FeatureVector::from_raw([0.5; FEATURE_LEN])
    }

    fn classifier<F>(f: F) -> Classifier
    where
        F: FnMut(&FeatureVector) -> anyhow::Result<Vec<f32>> + Send + 'static,
    {
        Classifier::new(f)
    }

    #[test]
    fn argmax() {
        let c = Classification::from_scores(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(c.label_index, Some(1));
        assert_eq!(c.confidence, 0.7);

        let c = Classification::from_scores(&[0.4, 0.2, 0.4]).unwrap();
        assert_eq!(c.label_index, Some(0));

        let c = Classification::from_scores(&[f32::NAN, 0.3, 0.1]).unwrap();
        assert_eq!(c.label_index, Some(1));

        assert_eq!(Classification::from_scores(&[]), None);
        assert_eq!(Classification::from_scores(&[f32::NAN]), None);
        assert_eq!(Classification::from_scores(&[0.1, f32::INFINITY]), None);
    }

    #[test]
    fn classify() {
        let classifier = classifier(|_| Ok(vec![0.05, 0.05, 0.9]));
        let c = classifier.classify(&features());
        assert_eq!(c.label_index, Some(2));
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn low_confidence_is_not_rejected() {
        let classifier = classifier(|_| Ok(vec![0.1, 0.12, 0.11]));
        let c = classifier.classify(&features());
        assert_eq!(c.label_index, Some(1));
        assert_eq!(c.confidence, 0.12);
    }

    #[test]
    fn engine_failure_is_absorbed() {
        let failing = classifier(|_| anyhow::bail!("tensor shape mismatch"));
        assert_eq!(failing.classify(&features()), Classification::NONE);

        let empty = classifier(|_| Ok(Vec::new()));
        assert_eq!(empty.classify(&features()), Classification::NONE);
    }

    #[test]
    fn engine_panic_is_absorbed() {
        let mut calls = 0;
        let classifier = classifier(move |_| {
            calls += 1;
            if calls == 1 {
                panic!("index out of bounds in engine");
            }
            Ok(vec![0.2, 0.8])
        });

        assert_eq!(classifier.classify(&features()), Classification::NONE);
        let c = classifier.classify(&features());
        assert_eq!(c.label_index, Some(1));
        assert_eq!(c.confidence, 0.8);
    }

    #[test]
    fn engine_sees_features() {
        let classifier = classifier(|f| {
            assert_eq!(f.as_slice().len(), FEATURE_LEN);
            Ok(vec![f[0], 1.0 - f[0]])
        });
        let c = classifier.classify(&FeatureVector::from_raw([0.75; FEATURE_LEN]));
        assert_eq!(c.label_index, Some(0));
        assert_eq!(c.confidence, 0.75);
    }

    #[test]
    fn concurrent_calls_are_serialized() {
        struct Exclusive {
            active: Arc<AtomicUsize>,
            calls: Arc<AtomicUsize>,
        }

        impl InferenceEngine for Exclusive {
            fn infer(&mut self, _: &FeatureVector) -> anyhow::Result<Vec<f32>> {
                let active = self.active.fetch_add(1, Ordering::SeqCst);
                assert_eq!(active, 0, "engine entered concurrently");
                std::thread::yield_now();
                self.active.fetch_sub(1, Ordering::SeqCst);
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1.0])
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = Classifier::new(Exclusive {
            active: Arc::new(AtomicUsize::new(0)),
            calls: calls.clone(),
        });

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(classifier.classify(&features()).label_index, Some(0));
                    }
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn load_errors() {
        assert!(Classifier::load("models/missing.onnx").is_err());
        assert!(Classifier::load("keypoint_classifier.tflite").is_err());
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    /// `keypoint_classifier.onnx` is `softmax(features × W)` with `W[i][j] = 1` for `i == j`, so
    /// feature `k < 10` drives class `k`.
    #[test]
    fn onnx_engine() {
        let engine = OnnxEngine::load(fixture("keypoint_classifier.onnx")).unwrap();
        assert_eq!(engine.num_classes(), 10);

        let classifier = Classifier::new(engine);
        for class in [0, 3, 9] {
            let mut raw = [0.0; FEATURE_LEN];
            raw[class] = 1.0;
            raw[20] = -1.0;
            let c = classifier.classify(&FeatureVector::from_raw(raw));

            let e = std::f32::consts::E;
            assert_eq!(c.label_index, Some(class));
            assert_relative_eq!(c.confidence, e / (e + 9.0), epsilon = 1e-5);
        }

        let c = classifier.classify(&FeatureVector::from_raw([0.0; FEATURE_LEN]));
        assert_eq!(c.label_index, Some(0));
        assert_relative_eq!(c.confidence, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn onnx_engine_rejects_input_shape() {
        let path = fixture("keypoint_classifier_40.onnx");
        assert!(OnnxEngine::load(&path).is_err());

        let nn = NeuralNetwork::from_path(&path).unwrap().load().unwrap();
        assert_eq!(nn.inputs()[0].shape(), &[1, 40]);
        let err = OnnxEngine::new(nn).err().unwrap();
        assert!(err.to_string().contains("[1, 40]"), "{err}");
    }

    #[test]
    fn onnx_engine_rejects_output_shape() {
        let err = OnnxEngine::load(fixture("keypoint_classifier_2x5.onnx"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("[2, 5]"), "{err}");
    }
}
