//! Coordinate transforms between the four image spaces.
//!
//! Every step is a scale plus translation recomputed from recorded sizes and the crop
//! descriptor, so a point can be moved in either direction at any time after the prediction.
//! All steps stay in floating point except the final hop into the viewport, which rounds to
//! whole display pixels.

use crate::crop::CropDescriptor;
use crate::error::Result;
use crate::keypoints::Keypoints;
use crate::letterbox::Letterbox;
use crate::space::{Canvas, Crop, Original, Point, Size, Viewport};

pub fn crop_to_canvas(pt: Point<Crop>, crop: &CropDescriptor) -> Point<Canvas> {
    crop.to_canvas(pt)
}

pub fn canvas_to_crop(pt: Point<Canvas>, crop: &CropDescriptor) -> Point<Crop> {
    crop.to_crop(pt)
}

/// Undoes the letterbox that fitted an `original`-sized image into `canvas`.
pub fn canvas_to_original(pt: Point<Canvas>, canvas: Size, original: Size) -> Result<Point<Original>> {
    Ok(Letterbox::<Original, Canvas>::fit(original, canvas)?.inverse(pt))
}

pub fn original_to_canvas(pt: Point<Original>, original: Size, canvas: Size) -> Result<Point<Canvas>> {
    Ok(Letterbox::<Original, Canvas>::fit(original, canvas)?.forward(pt))
}

/// Fits the original image into a display viewport and rounds to the nearest display pixel.
pub fn original_to_viewport(
    pt: Point<Original>,
    original: Size,
    viewport: Size,
) -> Result<Point<Viewport>> {
    Ok(Letterbox::<Original, Viewport>::fit(original, viewport)?
        .forward(pt)
        .round())
}

pub fn viewport_to_original(
    pt: Point<Viewport>,
    original: Size,
    viewport: Size,
) -> Result<Point<Original>> {
    Ok(Letterbox::<Original, Viewport>::fit(original, viewport)?.inverse(pt))
}

/// The full crop → canvas → original chain of one prediction.
#[derive(Debug, Clone, Copy)]
pub struct TransformChain {
    crop: CropDescriptor,
    canvas: Letterbox<Original, Canvas>,
}

impl TransformChain {
    pub fn new(crop: CropDescriptor, original: Size) -> Result<Self> {
        let canvas = Letterbox::fit(original, crop.canvas)?;
        Ok(Self { crop, canvas })
    }

    pub fn crop(&self) -> &CropDescriptor {
        &self.crop
    }

    pub fn original_size(&self) -> Size {
        self.canvas.source()
    }

    pub fn to_original(&self, pt: Point<Crop>) -> Point<Original> {
        self.canvas.inverse(crop_to_canvas(pt, &self.crop))
    }

    pub fn to_crop(&self, pt: Point<Original>) -> Point<Crop> {
        canvas_to_crop(self.canvas.forward(pt), &self.crop)
    }

    pub fn keypoints_to_canvas(&self, kps: &Keypoints<Crop>) -> Keypoints<Canvas> {
        kps.map(|p| crop_to_canvas(p, &self.crop))
    }

    pub fn keypoints_to_original(&self, kps: &Keypoints<Crop>) -> Keypoints<Original> {
        kps.map(|p| self.to_original(p))
    }
}

/// Moves original-space keypoints into a viewport of the given size.
pub fn keypoints_to_viewport(
    kps: &Keypoints<Original>,
    original: Size,
    viewport: Size,
) -> Result<Keypoints<Viewport>> {
    let fit = Letterbox::<Original, Viewport>::fit(original, viewport)?;
    Ok(kps.map(|p| fit.forward(p).round()))
}
