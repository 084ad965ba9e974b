//! Hand landmark types.

use std::{fmt, ops::Index};

use serde::Serialize;

/// The number of landmarks a hand landmark detector emits per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the hand landmarks, in the order detectors emit them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Whether a detected hand is a left or a right hand.
///
/// Serializes as `"Left"` or `"Right"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Interprets a raw handedness score, where values above 0.5 indicate a right hand.
    pub fn from_score(score: f32) -> Self {
        if score > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        })
    }
}

/// A landmark position, as a fraction of the image size.
///
/// `(0.0, 0.0)` is the top left corner of the image, `(1.0, 1.0)` the bottom right one. Detectors
/// may place landmarks slightly outside of that range when part of the hand leaves the image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A landmark position in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The 21 landmarks of one hand, in normalized image coordinates.
///
/// Landmark 0 is always the wrist.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [LandmarkPoint; NUM_LANDMARKS],
}

impl LandmarkSet {
    pub fn new(points: [LandmarkPoint; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Creates a landmark set from a list of `(x, y)` pairs.
    ///
    /// Returns an error unless exactly [`NUM_LANDMARKS`] points are given.
    pub fn from_points<I>(points: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        let points = points
            .into_iter()
            .map(|(x, y)| LandmarkPoint::new(x, y))
            .collect::<Vec<_>>();
        let len = points.len();
        let points: [LandmarkPoint; NUM_LANDMARKS] = points.try_into().map_err(|_| {
            anyhow::anyhow!("expected {} hand landmarks, got {}", NUM_LANDMARKS, len)
        })?;
        Ok(Self { points })
    }

    #[inline]
    pub fn points(&self) -> &[LandmarkPoint; NUM_LANDMARKS] {
        &self.points
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = LandmarkPoint> + '_ {
        self.points.iter().copied()
    }

    #[inline]
    pub fn wrist(&self) -> LandmarkPoint {
        self[LandmarkIdx::Wrist]
    }
}

impl Index<LandmarkIdx> for LandmarkSet {
    type Output = LandmarkPoint;

    fn index(&self, index: LandmarkIdx) -> &LandmarkPoint {
        &self.points[index as usize]
    }
}

/// The 21 landmarks of one hand, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelLandmarks {
    points: [PixelPoint; NUM_LANDMARKS],
}

impl PixelLandmarks {
    pub fn new(points: [PixelPoint; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    #[inline]
    pub fn points(&self) -> &[PixelPoint; NUM_LANDMARKS] {
        &self.points
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = PixelPoint> + '_ {
        self.points.iter().copied()
    }

    #[inline]
    pub fn wrist(&self) -> PixelPoint {
        self[LandmarkIdx::Wrist]
    }

    /// Applies `f` to every landmark, keeping their order.
    pub fn map(&self, f: impl FnMut(PixelPoint) -> PixelPoint) -> Self {
        Self {
            points: self.points.map(f),
        }
    }
}

impl Index<LandmarkIdx> for PixelLandmarks {
    type Output = PixelPoint;

    fn index(&self, index: LandmarkIdx) -> &PixelPoint {
        &self.points[index as usize]
    }
}

/// A single detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    pub landmarks: LandmarkSet,
    pub handedness: Handedness,
    /// Confidence that a hand is actually present, in range 0.0 to 1.0.
    pub presence: f32,
}
