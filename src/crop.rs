//! Hand bounding box, crop descriptor and the affine crop resampler.
//!
//! The crop is a `crop_size`-sided square cut from the canvas after magnifying it by the crop
//! scale. Its center is kept twice: upright (top-left origin) for reporting and for mapping
//! keypoints back, and vertically flipped (bottom-left origin) for placing the crop rectangle,
//! which lives in bottom-up image coordinates.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::segmentation::HandMask;
use crate::space::{Canvas, Crop, Point, Size};

/// What to do when the hand mask comes out empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyMaskPolicy {
    /// Abort the prediction with [`Error::NoHandDetected`].
    #[default]
    Fail,
    /// Carry on with the whole canvas as the hand box.
    Center,
}

/// Inclusive pixel bounds of the occupied part of a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    /// Smallest box containing every pixel with a value above zero, or `None` for an empty mask.
    pub fn of_mask(mask: &HandMask) -> Option<Self> {
        let (width, height) = (mask.width(), mask.height());
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (width, height, 0, 0);
        let mut any = false;

        for ((y, x), v) in mask.as_array().indexed_iter() {
            if *v > 0.0 {
                let (x, y) = (x as u32, y as u32);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                any = true;
            }
        }

        any.then_some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Box spanning a whole canvas.
    pub fn full(canvas: Size) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: canvas.width.saturating_sub(1),
            max_y: canvas.height.saturating_sub(1),
        }
    }

    /// Extent along x, measured between the outermost pixel indices.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point<Canvas> {
        Point::new(
            self.min_x as f32 + self.width() as f32 / 2.0,
            self.min_y as f32 + self.height() as f32 / 2.0,
        )
    }
}

/// Finds the hand box in `mask`, applying `policy` when the mask is empty.
pub fn locate_hand(mask: &HandMask, policy: EmptyMaskPolicy) -> Result<BoundingBox> {
    match (BoundingBox::of_mask(mask), policy) {
        (Some(bbox), _) => Ok(bbox),
        (None, EmptyMaskPolicy::Fail) => Err(Error::NoHandDetected),
        (None, EmptyMaskPolicy::Center) => {
            log::warn!("hand mask is empty, falling back to a centered crop");
            Ok(BoundingBox::full(mask.size()))
        }
    }
}

/// Parameters turning a bounding box into a crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropParams {
    pub crop_size: u32,
    pub box_padding: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            crop_size: 256,
            box_padding: 1.25,
            min_scale: 0.25,
            max_scale: 5.0,
        }
    }
}

impl From<&PipelineConfig> for CropParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            crop_size: config.crop_size,
            box_padding: config.box_padding,
            min_scale: config.min_crop_scale,
            max_scale: config.max_crop_scale,
        }
    }
}

/// Crop rectangle in the magnified canvas, bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Where and how strongly the hand crop was cut from the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropDescriptor {
    /// Box center in the magnified canvas (canvas × `scale`), top-left origin, whole pixels.
    pub center: (f32, f32),
    /// Same center measured from the bottom edge of the magnified canvas.
    pub flipped_center: (f32, f32),
    /// Magnification from canvas to crop pixels. Always within the configured bounds.
    pub scale: f32,
    pub crop_size: u32,
    pub canvas: Size,
}

impl CropDescriptor {
    pub fn new(bbox: &BoundingBox, canvas: Size, params: &CropParams) -> Self {
        let box_size = bbox.width().max(bbox.height()) as f32 * params.box_padding;
        // A single-pixel box divides by zero; the infinity clamps to the upper bound.
        let scale = (params.crop_size as f32 / box_size).clamp(params.min_scale, params.max_scale);

        let cx = bbox.min_x as f32 + bbox.width() as f32 / 2.0;
        let cy = bbox.min_y as f32 + bbox.height() as f32 / 2.0;
        let flipped_cy = canvas.height as f32 - bbox.min_y as f32 - bbox.height() as f32 / 2.0;

        Self {
            center: ((scale * cx).round(), (scale * cy).round()),
            flipped_center: ((scale * cx).round(), (scale * flipped_cy).round()),
            scale,
            crop_size: params.crop_size,
            canvas,
        }
    }

    pub fn half(&self) -> f32 {
        self.crop_size as f32 / 2.0
    }

    /// Box center back in unscaled canvas pixels.
    pub fn canvas_center(&self) -> Point<Canvas> {
        Point::new(self.center.0 / self.scale, self.center.1 / self.scale)
    }

    pub fn rect(&self) -> CropRect {
        CropRect {
            x: self.flipped_center.0 - self.half(),
            y: self.flipped_center.1 - self.half(),
            size: self.crop_size as f32,
        }
    }

    pub fn to_canvas(&self, pt: Point<Crop>) -> Point<Canvas> {
        Point::new(
            (pt.x - self.half() + self.center.0) / self.scale,
            (pt.y - self.half() + self.center.1) / self.scale,
        )
    }

    pub fn to_crop(&self, pt: Point<Canvas>) -> Point<Crop> {
        Point::new(
            pt.x * self.scale - self.center.0 + self.half(),
            pt.y * self.scale - self.center.1 + self.half(),
        )
    }
}

/// Resamples the crop described by `desc` out of `canvas`.
///
/// The canvas is magnified by `desc.scale`, shifted so the crop rectangle's origin lands on
/// zero and clipped to `crop_size × crop_size`. Samples are bilinear; anything outside the
/// canvas is black.
pub fn extract_crop(canvas: &RgbImage, desc: &CropDescriptor) -> Result<RgbImage> {
    if Size::of(canvas) != desc.canvas {
        return Err(Error::invalid(format!(
            "crop was computed for a {} canvas, got {}",
            desc.canvas,
            Size::of(canvas)
        )));
    }

    let rect = desc.rect();
    let n = desc.crop_size;
    let height = desc.canvas.height as f32;

    Ok(RgbImage::from_fn(n, n, |u, v| {
        // Pixel center in the crop, bottom-up.
        let cu = u as f32 + 0.5;
        let cv = n as f32 - (v as f32 + 0.5);
        // Back into the unscaled canvas, bottom-up, then top-down.
        let x = (cu + rect.x) / desc.scale;
        let y = height - (cv + rect.y) / desc.scale;
        sample_bilinear(canvas, x - 0.5, y - 0.5)
    }))
}

// Taps outside the image are black.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);

    let mut acc = [0.0f32; 3];
    for (dy, wy) in [(0, 1.0 - fy), (1, fy)] {
        for (dx, wx) in [(0, 1.0 - fx), (1, fx)] {
            let (px, py) = (x0 as i64 + dx, y0 as i64 + dy);
            let weight = wx * wy;
            if weight == 0.0 || px < 0 || py < 0 || px >= width || py >= height {
                continue;
            }
            let p = image.get_pixel(px as u32, py as u32);
            for (a, c) in acc.iter_mut().zip(p.0) {
                *a += weight * c as f32;
            }
        }
    }
    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn mask_with_box(canvas: Size, x0: usize, y0: usize, x1: usize, y1: usize) -> HandMask {
        let mut data = Array2::zeros((canvas.height as usize, canvas.width as usize));
        for y in y0..=y1 {
            for x in x0..=x1 {
                data[[y, x]] = 0.25;
            }
        }
        HandMask::from_array(data)
    }

    #[test]
    fn bounding_box_is_tight() {
        let mask = mask_with_box(Size::new(320, 240), 40, 100, 90, 130);
        assert_eq!(
            BoundingBox::of_mask(&mask),
            Some(BoundingBox {
                min_x: 40,
                min_y: 100,
                max_x: 90,
                max_y: 130,
            })
        );
    }

    #[test]
    fn empty_mask_follows_policy() {
        let mask = HandMask::from_array(Array2::zeros((24, 32)));
        assert!(BoundingBox::of_mask(&mask).is_none());
        assert!(matches!(
            locate_hand(&mask, EmptyMaskPolicy::Fail),
            Err(Error::NoHandDetected)
        ));
        assert_eq!(
            locate_hand(&mask, EmptyMaskPolicy::Center).unwrap(),
            BoundingBox::full(Size::new(32, 24))
        );
    }

    #[test]
    fn scale_is_padded_and_clamped() {
        let canvas = Size::new(320, 240);
        let params = CropParams::default();

        let bbox = BoundingBox {
            min_x: 100,
            min_y: 50,
            max_x: 180,
            max_y: 110,
        };
        let desc = CropDescriptor::new(&bbox, canvas, &params);
        assert_relative_eq!(desc.scale, 256.0 / 100.0);
        assert_eq!(desc.center, ((2.56f32 * 140.0).round(), (2.56f32 * 80.0).round()));

        let tiny = BoundingBox {
            min_x: 10,
            min_y: 10,
            max_x: 10,
            max_y: 10,
        };
        assert_eq!(CropDescriptor::new(&tiny, canvas, &params).scale, 5.0);

        let whole = CropDescriptor::new(&BoundingBox::full(Size::new(4000, 3000)), canvas, &params);
        assert_eq!(whole.scale, 0.25);
    }

    #[test]
    fn flipped_center_mirrors_vertically() {
        let canvas = Size::new(320, 240);
        let bbox = BoundingBox {
            min_x: 60,
            min_y: 20,
            max_x: 100,
            max_y: 60,
        };
        let params = CropParams {
            max_scale: 1.0,
            ..CropParams::default()
        };
        let desc = CropDescriptor::new(&bbox, canvas, &params);
        assert_eq!(desc.scale, 1.0);
        assert_eq!(desc.center, (80.0, 40.0));
        assert_eq!(desc.flipped_center, (80.0, 200.0));
    }

    #[test]
    fn crop_and_canvas_points_round_trip() {
        let bbox = BoundingBox {
            min_x: 33,
            min_y: 71,
            max_x: 97,
            max_y: 120,
        };
        let desc = CropDescriptor::new(&bbox, Size::new(320, 240), &CropParams::default());
        let p = Point::<Crop>::new(17.0, 230.0);
        let back = desc.to_crop(desc.to_canvas(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-3);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-3);

        // The crop center maps onto the box center.
        let c = desc.to_canvas(Point::new(128.0, 128.0));
        assert_relative_eq!(c.x, bbox.center().x, epsilon = 0.5 / desc.scale);
        assert_relative_eq!(c.y, bbox.center().y, epsilon = 0.5 / desc.scale);
    }

    #[test]
    fn crop_samples_the_hand_region() {
        // Left half red, right half blue, green square around (200, 60).
        let canvas_size = Size::new(320, 240);
        let canvas = RgbImage::from_fn(320, 240, |x, y| {
            if (180..220).contains(&x) && (40..80).contains(&y) {
                Rgb([0, 255, 0])
            } else if x < 160 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let bbox = BoundingBox {
            min_x: 180,
            min_y: 40,
            max_x: 219,
            max_y: 79,
        };
        let desc = CropDescriptor::new(&bbox, canvas_size, &CropParams::default());
        let crop = extract_crop(&canvas, &desc).unwrap();
        assert_eq!(crop.dimensions(), (256, 256));
        assert_eq!(crop.get_pixel(128, 128), &Rgb([0, 255, 0]));

        // The pixel above the box in the crop is above the box in the canvas.
        let above = desc.to_canvas(Point::new(128.0, 10.0));
        assert!(above.y < 40.0);
        assert_eq!(crop.get_pixel(128, 10), &Rgb([0, 0, 255]));
    }

    #[test]
    fn crop_outside_canvas_is_black() {
        let canvas = RgbImage::from_pixel(320, 240, Rgb([200, 200, 200]));
        let bbox = BoundingBox {
            min_x: 0,
            min_y: 0,
            max_x: 20,
            max_y: 20,
        };
        let desc = CropDescriptor::new(&bbox, Size::new(320, 240), &CropParams::default());
        let crop = extract_crop(&canvas, &desc).unwrap();
        assert_eq!(crop.get_pixel(2, 2), &Rgb([0, 0, 0]));
        assert_eq!(crop.get_pixel(250, 250), &Rgb([200, 200, 200]));
    }
}
