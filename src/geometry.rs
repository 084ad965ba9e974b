//! Conversion of detector landmarks into pixel space.

use crate::{
    image::Resolution,
    landmark::{LandmarkSet, PixelLandmarks, PixelPoint},
    rect::BoundingBox,
};

/// Converts normalized landmarks to integer pixel coordinates.
///
/// Each coordinate is scaled by the image size and rounded down. Coordinates are capped at the
/// last pixel row/column, so a landmark at exactly `1.0` does not land one pixel past the edge.
/// Landmarks left of or above the image keep their negative coordinates.
pub fn pixel_landmarks(res: Resolution, landmarks: &LandmarkSet) -> PixelLandmarks {
    let to_pixel = |v: f32, extent: u32| -> i32 {
        // Multiply in f64 so that coordinates like `0.5 * 640` are exact.
        let scaled = (f64::from(v) * f64::from(extent)).floor() as i64;
        let last = i64::from(extent) - 1;
        scaled.min(last).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    };

    PixelLandmarks::new(
        landmarks
            .points()
            .map(|p| PixelPoint::new(to_pixel(p.x, res.width()), to_pixel(p.y, res.height()))),
    )
}

/// Computes the bounding box of a set of pixel landmarks, restricted to the image area.
pub fn bounding_box(res: Resolution, landmarks: &PixelLandmarks) -> BoundingBox {
    BoundingBox::bounding(landmarks.iter())
        .map(|bbox| bbox.clamp_to(res))
        .unwrap_or_else(|| BoundingBox::from_top_left(0, 0, 0, 0))
}

/// Converts normalized landmarks to pixel space and computes their bounding box.
pub fn extract(res: Resolution, landmarks: &LandmarkSet) -> (PixelLandmarks, BoundingBox) {
    let pixels = pixel_landmarks(res, landmarks);
    let bbox = bounding_box(res, &pixels);
    log::trace!("landmarks in {} image span {:?}", res, bbox);
    (pixels, bbox)
}
