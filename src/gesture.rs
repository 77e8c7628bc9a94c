use crate::keypoints::{Keypoints, NUM_JOINTS};
use crate::space::Crop;

pub const FEATURE_LEN: usize = NUM_JOINTS * 2;

/// Input vector of the gesture classifier.
///
/// Each joint contributes `[y / S, x / S]`, y first, where `S` is the crop side length. The
/// classifier was trained on exactly this layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureFeatures([f32; FEATURE_LEN]);

impl GestureFeatures {
    pub fn encode(keypoints: &Keypoints<Crop>, crop_size: u32) -> Self {
        let s = crop_size as f32;
        let mut out = [0.0; FEATURE_LEN];
        for (pair, p) in out.chunks_exact_mut(2).zip(keypoints.iter()) {
            pair[0] = p.y / s;
            pair[1] = p.x / s;
        }
        Self(out)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Capitalizes a class label for display, e.g. `"rock"` becomes `"Rock"`.
pub fn display_label(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Point;

    #[test]
    fn centered_keypoints_encode_to_half() {
        let kps = Keypoints::new([Point::<Crop>::new(128.0, 128.0); NUM_JOINTS]);
        let features = GestureFeatures::encode(&kps, 256);
        assert_eq!(features.as_slice().len(), 42);
        assert!(features.as_slice().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn y_comes_before_x() {
        let mut points = [Point::<Crop>::default(); NUM_JOINTS];
        points[3] = Point::new(64.0, 192.0);
        let features = GestureFeatures::encode(&Keypoints::new(points), 256);
        assert_eq!(&features.as_slice()[6..8], &[0.75, 0.25]);
    }

    #[test]
    fn labels_are_capitalized() {
        assert_eq!(display_label("rock"), "Rock");
        assert_eq!(display_label("ok"), "Ok");
        assert_eq!(display_label(""), "");
    }
}
