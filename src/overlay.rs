//! Preview rendering: an RGB frame annotated with `imageproc`, packed into the 0RGB `u32`
//! buffer `minifb` wants.

use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::keypoints::{Finger, Keypoints};
use crate::space::{Point, Size, Viewport};

/// Packs 8-bit channels into the `0x00RRGGBB` layout the window expects.
pub fn pack_rgb(Rgb([r, g, b]): Rgb<u8>) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

// Thumb to little finger.
const FINGER_COLORS: [[u8; 3]; 5] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [165, 42, 42],
];

const SEGMENT_FADE: f32 = 0.15;

const JOINT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Color of bone `segment` (0 = the one attached to the palm) of `finger`.
pub fn bone_color(finger: Finger, segment: usize) -> Rgb<u8> {
    let factor = (1.0 - SEGMENT_FADE).powi(segment as i32);
    Rgb(FINGER_COLORS[finger as usize].map(|c| (c as f32 * factor).round() as u8))
}

/// A viewport-sized frame. Draw into it, then [`pack`](Self::pack) before handing
/// [`pixels`](Self::pixels) to the window.
pub struct FrameBuffer {
    image: RgbImage,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(size: Size) -> Self {
        Self {
            image: RgbImage::new(size.width, size.height),
            pixels: vec![0; size.area()],
        }
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copies `image` to the top-left corner, clipping whatever does not fit.
    pub fn blit(&mut self, image: &RgbImage) {
        imageops::replace(&mut self.image, image, 0, 0);
    }

    pub fn dot(&mut self, at: Point<Viewport>, radius: i32, color: Rgb<u8>) {
        draw_filled_circle_mut(
            &mut self.image,
            (at.x.round() as i32, at.y.round() as i32),
            radius,
            color,
        );
    }

    pub fn line(&mut self, from: Point<Viewport>, to: Point<Viewport>, color: Rgb<u8>) {
        draw_line_segment_mut(&mut self.image, (from.x, from.y), (to.x, to.y), color);
    }

    /// Draws the 20 bones of the hand plus a dot on every joint.
    pub fn skeleton(&mut self, keypoints: &Keypoints<Viewport>) {
        for (finger, bones) in Finger::ALL.into_iter().zip(keypoints.finger_lines()) {
            for (i, bone) in bones.iter().enumerate() {
                self.line(bone.from, bone.to, bone_color(finger, i));
            }
        }
        for p in keypoints.iter() {
            self.dot(p, 2, JOINT_COLOR);
        }
    }

    /// Refreshes the packed pixel buffer from the drawn frame.
    pub fn pack(&mut self) {
        for (dst, p) in self.pixels.iter_mut().zip(self.image.pixels()) {
            *dst = pack_rgb(*p);
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_zero_rgb() {
        assert_eq!(pack_rgb(Rgb([0x12, 0x34, 0x56])), 0x123456);
    }

    #[test]
    fn bones_darken_away_from_palm() {
        assert_eq!(bone_color(Finger::Thumb, 0), Rgb([255, 0, 0]));
        assert_eq!(bone_color(Finger::Thumb, 1), Rgb([217, 0, 0]));
        assert_eq!(bone_color(Finger::Middle, 0), Rgb([0, 0, 255]));
    }

    #[test]
    fn line_is_drawn_between_points() {
        let mut fb = FrameBuffer::new(Size::new(10, 10));
        let color = Rgb([7, 7, 7]);
        fb.line(Point::new(1.0, 5.0), Point::new(8.0, 5.0), color);
        assert_eq!(fb.image().get_pixel(1, 5), &color);
        assert_eq!(fb.image().get_pixel(4, 5), &color);
        assert_eq!(fb.image().get_pixel(4, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn blit_clips_and_pack_follows_the_frame() {
        let mut fb = FrameBuffer::new(Size::new(4, 4));
        fb.blit(&RgbImage::from_pixel(6, 2, Rgb([1, 2, 3])));
        fb.dot(Point::new(0.0, 3.0), 0, Rgb([9, 9, 9]));

        assert!(fb.pixels().iter().all(|&p| p == 0));
        fb.pack();
        assert_eq!(fb.pixels()[3], 0x010203);
        assert_eq!(fb.pixels()[8], 0);
        assert_eq!(fb.pixels()[12], 0x090909);
    }

    #[test]
    fn skeleton_draws_every_joint() {
        let points = std::array::from_fn(|i| {
            Point::<Viewport>::new((i % 7) as f32 * 10.0 + 5.0, (i / 7) as f32 * 10.0 + 5.0)
        });
        let mut fb = FrameBuffer::new(Size::new(80, 40));
        fb.skeleton(&Keypoints::new(points));
        for p in points {
            assert_eq!(fb.image().get_pixel(p.x as u32, p.y as u32), &JOINT_COLOR);
        }
    }
}
