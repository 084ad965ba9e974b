//! Hand landmark detection.

use std::path::Path;

use itertools::Itertools;

use crate::{
    image::{Image, Resolution},
    landmark::{HandLandmarks, Handedness, LandmarkSet, NUM_LANDMARKS},
    nn::{Cnn, ColorMapper, NeuralNetwork},
};

/// Locates the landmarks of a single hand in an image.
///
/// Implementations are shared between all requests and must be usable from several threads at
/// once.
pub trait LandmarkDetector: Send + Sync {
    /// Runs detection on `image`.
    ///
    /// Returns `Ok(None)` if no hand was found with sufficient confidence. Only the most prominent
    /// hand is reported if there are several.
    fn detect(&self, image: &Image) -> anyhow::Result<Option<HandLandmarks>>;
}

impl<F> LandmarkDetector for F
where
    F: Fn(&Image) -> anyhow::Result<Option<HandLandmarks>> + Send + Sync,
{
    fn detect(&self, image: &Image) -> anyhow::Result<Option<HandLandmarks>> {
        self(image)
    }
}

/// Number of values in the screen landmark output: X, Y and Z for every landmark.
const SCREEN_LANDMARK_LEN: usize = NUM_LANDMARKS * 3;

const OUTPUT_SHAPES: [&[usize]; 3] = [&[1, SCREEN_LANDMARK_LEN], &[1, 1], &[1, 1]];

/// Landmark detector running MediaPipe's full-range hand landmark network.
///
/// There is no palm detection step: the network is given the whole image, stretched to its input
/// resolution, instead of a crop around the hand. The landmark network is trained on such crops,
/// so this only finds hands that fill most of the frame. A small or off-center hand is usually
/// reported as absent, or gets imprecise landmarks.
///
/// The network is expected to produce these outputs:
///
/// 0. `[1, 63]` screen landmarks (X, Y, Z per landmark, in input pixels)
/// 1. `[1, 1]` hand presence score
/// 2. `[1, 1]` handedness score (> 0.5 means right hand)
///
/// Any additional outputs (like the metric-space landmarks) are ignored.
#[derive(Clone)]
pub struct HandLandmarker {
    cnn: Cnn,
    min_detection_confidence: f32,
}

impl HandLandmarker {
    /// Loads the hand landmark network from an `.onnx` file.
    ///
    /// Hands with a presence score below `min_detection_confidence` are not reported.
    pub fn load<P: AsRef<Path>>(path: P, min_detection_confidence: f32) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let nn = NeuralNetwork::from_path(path)?.load()?;
        let cnn = Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?;
        let this = Self::new(cnn, min_detection_confidence)?;
        log::info!(
            "loaded hand landmark network '{}' (input {}, min. confidence {})",
            path.display(),
            this.cnn.input_resolution(),
            min_detection_confidence,
        );
        Ok(this)
    }

    /// Wraps a loaded [`Cnn`], validating its outputs.
    pub fn new(cnn: Cnn, min_detection_confidence: f32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&min_detection_confidence),
            "minimum detection confidence must be in range 0.0 to 1.0, got {}",
            min_detection_confidence,
        );

        let outputs = cnn.network().outputs();
        anyhow::ensure!(
            outputs.len() >= OUTPUT_SHAPES.len(),
            "hand landmark network has to have at least 3 outputs, this one has {}",
            outputs.len(),
        );
        for (info, expected) in outputs.iter().zip(OUTPUT_SHAPES) {
            anyhow::ensure!(
                info.shape() == expected,
                "hand landmark output '{}' has shape {:?}, expected {:?}",
                info.name(),
                info.shape(),
                expected,
            );
        }

        Ok(Self {
            cnn,
            min_detection_confidence,
        })
    }

    #[inline]
    pub fn min_detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }
}

impl LandmarkDetector for HandLandmarker {
    fn detect(&self, image: &Image) -> anyhow::Result<Option<HandLandmarks>> {
        let outputs = self.cnn.estimate(image)?;
        let screen = outputs.f32_slice(0, OUTPUT_SHAPES[0])?;
        let presence = outputs.f32_slice(1, OUTPUT_SHAPES[1])?[0];
        let handedness = outputs.f32_slice(2, OUTPUT_SHAPES[2])?[0];

        if presence.is_nan() || presence < self.min_detection_confidence {
            log::debug!(
                "hand presence {} below threshold {}",
                presence,
                self.min_detection_confidence,
            );
            return Ok(None);
        }

        decode(self.cnn.input_resolution(), screen, presence, handedness).map(Some)
    }
}

/// Converts raw network outputs into [`HandLandmarks`].
///
/// `screen` holds the landmarks as `[x, y, z]` triples in pixels of the network input; they are
/// turned into fractions of the input size. The depth coordinate is dropped.
fn decode(
    input_res: Resolution,
    screen: &[f32],
    presence: f32,
    handedness: f32,
) -> anyhow::Result<HandLandmarks> {
    anyhow::ensure!(
        screen.len() == SCREEN_LANDMARK_LEN,
        "expected {} screen landmark values, got {}",
        SCREEN_LANDMARK_LEN,
        screen.len(),
    );

    let (w, h) = (input_res.width() as f32, input_res.height() as f32);
    let landmarks = LandmarkSet::from_points(
        screen
            .iter()
            .copied()
            .tuples::<(f32, f32, f32)>()
            .map(|(x, y, _z)| (x / w, y / h)),
    )?;

    Ok(HandLandmarks {
        landmarks,
        handedness: Handedness::from_score(handedness),
        presence,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::landmark::{LandmarkIdx, LandmarkPoint};

    use super::*;

    const INPUT: Resolution = Resolution::new(224, 224);

    fn screen(f: impl Fn(usize) -> [f32; 3]) -> Vec<f32> {
        (0..NUM_LANDMARKS).flat_map(f).collect()
    }

    #[test]
    fn decode_scales_to_input() {
        let raw = screen(|i| [i as f32 * 10.0, 112.0, -3.0]);
        let hand = decode(INPUT, &raw, 0.98, 0.91).unwrap();

        assert_eq!(hand.presence, 0.98);
        assert_eq!(hand.handedness, Handedness::Right);
        assert_eq!(hand.landmarks.wrist(), LandmarkPoint::new(0.0, 0.5));
        assert_eq!(
            hand.landmarks[LandmarkIdx::IndexFingerPip],
            LandmarkPoint::new(60.0 / 224.0, 0.5)
        );
    }

    #[test]
    fn decode_left_hand() {
        let raw = screen(|_| [100.0, 100.0, 0.0]);
        let hand = decode(INPUT, &raw, 0.8, 0.2).unwrap();
        assert_eq!(hand.handedness, Handedness::Left);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(decode(INPUT, &[0.0; 60], 1.0, 1.0).is_err());
        assert!(decode(INPUT, &[], 1.0, 1.0).is_err());
    }

    #[test]
    fn closure_detector() {
        let detector = |_: &Image| -> anyhow::Result<Option<HandLandmarks>> { Ok(None) };
        let detector: &dyn LandmarkDetector = &detector;
        assert_eq!(detector.detect(&Image::new(4, 4)).unwrap(), None);
    }

    #[test]
    fn load_errors() {
        assert!(HandLandmarker::load("models/missing.onnx", 0.7).is_err());
        assert!(HandLandmarker::load("hand_landmark_full.tflite", 0.7).is_err());
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    /// `hand_landmark.onnx` takes a `[1, 3, 4, 4]` image and averages each color channel. With
    /// red mean `r` and green mean `g`, landmark `i` is at `(0.2 * i * r, 2 * r)` input pixels,
    /// presence is `r` and handedness is `g`.
    fn landmarker(min_detection_confidence: f32) -> HandLandmarker {
        HandLandmarker::load(fixture("hand_landmark.onnx"), min_detection_confidence).unwrap()
    }

    #[test]
    fn landmarker_detects() {
        let landmarker = landmarker(0.7);
        let white = Image::filled(Resolution::new(32, 24), [255, 255, 255]);
        let hand = landmarker.detect(&white).unwrap().unwrap();

        assert_relative_eq!(hand.presence, 1.0);
        assert_eq!(hand.handedness, Handedness::Right);
        for (i, point) in hand.landmarks.iter().enumerate() {
            assert_relative_eq!(point.x, 0.05 * i as f32, epsilon = 1e-5);
            assert_relative_eq!(point.y, 0.5, epsilon = 1e-5);
        }

        let red = Image::filled(Resolution::new(8, 8), [255, 0, 0]);
        let hand = landmarker.detect(&red).unwrap().unwrap();
        assert_eq!(hand.handedness, Handedness::Left);
    }

    #[test]
    fn landmarker_threshold() {
        let black = Image::filled(Resolution::new(8, 8), [0, 0, 0]);
        assert_eq!(landmarker(0.7).detect(&black).unwrap(), None);

        let dim = Image::filled(Resolution::new(8, 8), [128, 128, 128]);
        assert_eq!(landmarker(0.7).detect(&dim).unwrap(), None);
        let hand = landmarker(0.5).detect(&dim).unwrap().unwrap();
        assert_relative_eq!(hand.presence, 128.0 / 255.0, epsilon = 1e-5);
    }

    #[test]
    fn landmarker_rejects_outputs() {
        let err = HandLandmarker::load(fixture("hand_landmark_42.onnx"), 0.7)
            .err()
            .unwrap();
        assert!(err.to_string().contains("[1, 42]"), "{err}");

        let nn = NeuralNetwork::from_path(fixture("hand_landmark.onnx"))
            .unwrap()
            .load()
            .unwrap();
        let cnn = Cnn::new(nn, ColorMapper::linear(0.0..=1.0)).unwrap();
        assert_eq!(cnn.input_resolution(), Resolution::new(4, 4));
        assert!(HandLandmarker::new(cnn.clone(), 1.5).is_err());
        assert!(HandLandmarker::new(cnn, 0.0).is_ok());

        let classifier = NeuralNetwork::from_path(fixture("keypoint_classifier.onnx"))
            .unwrap()
            .load()
            .unwrap();
        assert!(Cnn::new(classifier, ColorMapper::linear(0.0..=1.0)).is_err());
    }
}
