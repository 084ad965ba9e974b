//! The outward-facing recognition result.

use serde::Serialize;

use crate::{labels::LabelTable, landmark::Handedness, rect::BoundingBox};

/// Label reported when the classifier did not produce a usable class.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// The recognition result for one image.
///
/// Serializes as:
///
/// ```json
/// {
///   "prediction": 5,
///   "label": "Five",
///   "handedness": "Right",
///   "bounding_box": [120, 80, 310, 400],
///   "confidence": 0.93
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Index of the recognized class, or `-1` if unknown.
    #[serde(rename = "prediction")]
    pub label_index: i64,
    pub label: String,
    pub handedness: Handedness,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl Prediction {
    /// Returns whether a known label was recognized.
    pub fn is_known(&self) -> bool {
        self.label_index >= 0
    }
}

/// Combines the per-stage results into a [`Prediction`].
///
/// A missing or out-of-range `label_index` yields index `-1` with [`UNKNOWN_LABEL`]. The
/// confidence is passed through unchanged; no threshold is applied.
pub fn assemble(
    label_index: Option<usize>,
    confidence: f32,
    bounding_box: BoundingBox,
    handedness: Handedness,
    labels: &LabelTable,
) -> Prediction {
    let known = label_index.and_then(|index| {
        let label = labels.get(index)?;
        Some((i64::try_from(index).ok()?, label))
    });

    let (label_index, label) = match known {
        Some((index, label)) => (index, label),
        None => {
            if let Some(index) = label_index {
                log::warn!(
                    "label index {} out of range for {} labels",
                    index,
                    labels.len()
                );
            }
            (-1, UNKNOWN_LABEL)
        }
    };

    Prediction {
        label_index,
        label: label.to_string(),
        handedness,
        bounding_box,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::from_top_left(10, 20, 30, 40)
    }

    #[test]
    fn known_label() {
        let p = assemble(Some(5), 0.93, bbox(), Handedness::Right, &LabelTable::default());
        assert!(p.is_known());
        assert_eq!(p.label_index, 5);
        assert_eq!(p.label, "Five");
        assert_eq!(p.confidence, 0.93);
        assert_eq!(p.bounding_box, bbox());
    }

    #[test]
    fn unknown_label() {
        let labels = LabelTable::new(["A", "B"]);
        for index in [None, Some(2), Some(usize::MAX)] {
            let p = assemble(index, 0.4, bbox(), Handedness::Left, &labels);
            assert!(!p.is_known());
            assert_eq!(p.label_index, -1);
            assert_eq!(p.label, UNKNOWN_LABEL);
            assert_eq!(p.confidence, 0.4);
        }

        let empty = LabelTable::new(Vec::<String>::new());
        let p = assemble(Some(0), 0.1, bbox(), Handedness::Left, &empty);
        assert_eq!((p.label_index, p.label.as_str()), (-1, UNKNOWN_LABEL));
    }

    #[test]
    fn confidence_is_not_rounded() {
        let p = assemble(Some(1), 0.123456, bbox(), Handedness::Left, &LabelTable::default());
        assert_eq!(p.confidence, 0.123456);
    }

    #[test]
    fn json_shape() {
        let p = assemble(Some(2), 0.5, bbox(), Handedness::Right, &LabelTable::default());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prediction": 2,
                "label": "Two",
                "handedness": "Right",
                "bounding_box": [10, 20, 40, 60],
                "confidence": 0.5,
            })
        );
    }
}
