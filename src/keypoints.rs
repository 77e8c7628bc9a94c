//! Hand joints and heatmap peak detection.

use std::fmt;

use crate::error::{Error, Result};
use crate::scoremap::ScoreMap;
use crate::space::{Crop, Point, Space};

pub const NUM_JOINTS: usize = 21;

/// Points per digit, stored tip first.
pub const JOINTS_PER_FINGER: usize = 4;

/// Anatomical joint order of the pose network's output channels.
///
/// The palm root comes first, followed by each digit from its tip down to the knuckle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Joint {
    Wrist,
    ThumbTip,
    ThumbIp,
    ThumbMcp,
    ThumbCmc,
    IndexTip,
    IndexDip,
    IndexPip,
    IndexMcp,
    MiddleTip,
    MiddleDip,
    MiddlePip,
    MiddleMcp,
    RingTip,
    RingDip,
    RingPip,
    RingMcp,
    LittleTip,
    LittleDip,
    LittlePip,
    LittleMcp,
}

/// The five digits, in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Little,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Little,
    ];

    /// Channel index of the fingertip.
    pub fn tip_index(self) -> usize {
        1 + self as usize * JOINTS_PER_FINGER
    }
}

/// One bone of the hand skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment<S: Space> {
    pub from: Point<S>,
    pub to: Point<S>,
}

/// All 21 joints of one hand, in [`Joint`] order, expressed in space `S`.
#[derive(Clone, Copy, PartialEq)]
pub struct Keypoints<S: Space> {
    points: [Point<S>; NUM_JOINTS],
}

impl<S: Space> Keypoints<S> {
    pub fn new(points: [Point<S>; NUM_JOINTS]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point<S>; NUM_JOINTS] {
        &self.points
    }

    pub fn get(&self, joint: Joint) -> Point<S> {
        self.points[joint as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = Point<S>> + '_ {
        self.points.iter().copied()
    }

    /// Moves every joint into another space.
    pub fn map<T: Space>(&self, mut f: impl FnMut(Point<S>) -> Point<T>) -> Keypoints<T> {
        let mut out = [Point::<T>::default(); NUM_JOINTS];
        for (dst, src) in out.iter_mut().zip(self.points) {
            *dst = f(src);
        }
        Keypoints { points: out }
    }

    /// Bones of one digit, running from the palm root out to the fingertip.
    pub fn finger_segments(&self, finger: Finger) -> [Segment<S>; JOINTS_PER_FINGER] {
        let tip = finger.tip_index();
        // palm root, then the digit's joints reversed: knuckle ... tip
        let chain = [
            self.points[Joint::Wrist as usize],
            self.points[tip + 3],
            self.points[tip + 2],
            self.points[tip + 1],
            self.points[tip],
        ];
        std::array::from_fn(|i| Segment {
            from: chain[i],
            to: chain[i + 1],
        })
    }

    /// The full skeleton, one row of bones per digit in [`Finger::ALL`] order.
    pub fn finger_lines(&self) -> [[Segment<S>; JOINTS_PER_FINGER]; 5] {
        Finger::ALL.map(|finger| self.finger_segments(finger))
    }
}

impl<S: Space> fmt::Debug for Keypoints<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.points.iter()).finish()
    }
}

/// Finds the peak of every heatmap channel.
///
/// Each channel is scanned row by row; the first pixel holding the strictly greatest value wins.
/// Coordinates are whole heatmap pixels.
pub fn detect_keypoints(heatmaps: &ScoreMap) -> Result<Keypoints<Crop>> {
    if heatmaps.channels() != NUM_JOINTS {
        return Err(Error::invalid(format!(
            "expected {NUM_JOINTS} joint heatmaps, got {}",
            heatmaps.channels()
        )));
    }
    if heatmaps.size().is_empty() {
        return Err(Error::invalid("joint heatmaps are empty"));
    }

    let mut points = [Point::default(); NUM_JOINTS];
    for (joint, point) in points.iter_mut().enumerate() {
        let mut best = f32::NEG_INFINITY;
        let mut at = (0, 0);
        for ((y, x), v) in heatmaps.channel(joint).indexed_iter() {
            if *v > best {
                best = *v;
                at = (x, y);
            }
        }
        *point = Point::new(at.0 as f32, at.1 as f32);
    }
    Ok(Keypoints::new(points))
}
