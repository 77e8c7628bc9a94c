//! Aspect-preserving fits between two image sizes.

use std::fmt;
use std::marker::PhantomData;

use image::{GenericImageView, ImageBuffer, Pixel, Rgb, RgbImage, imageops};

use crate::config::ResizeFilter;
use crate::error::Result;
use crate::space::{Canvas, Original, Point, Size, Space};

/// Uniform scale + centering offset that fits an image of one size into a target of another
/// size without cropping.
///
/// The parameters are a pure function of the two sizes, so any stage can recompute them instead
/// of carrying them along.
#[derive(Clone, Copy, PartialEq)]
pub struct Letterbox<Src: Space, Dst: Space> {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    source: Size,
    _spaces: PhantomData<(Src, Dst)>,
}

impl<Src: Space, Dst: Space> Letterbox<Src, Dst> {
    /// Computes the fit of `source` into `target`.
    ///
    /// The constraining dimension is picked by comparing aspect ratios: a source that is wider
    /// than the target (relative to height) is fitted to the target width, anything else to the
    /// target height.
    pub fn fit(source: Size, target: Size) -> Result<Self> {
        source.ensure_non_empty("source image")?;
        target.ensure_non_empty("target surface")?;

        let scale = if source.aspect_ratio() > target.aspect_ratio() {
            target.width as f32 / source.width as f32
        } else {
            target.height as f32 / source.height as f32
        };
        Ok(Self {
            scale,
            pad_x: (target.width as f32 - source.width as f32 * scale) / 2.0,
            pad_y: (target.height as f32 - source.height as f32 * scale) / 2.0,
            source,
            _spaces: PhantomData,
        })
    }

    pub fn source(&self) -> Size {
        self.source
    }

    /// Size of the source once scaled, rounded to whole pixels (at least 1x1).
    pub fn scaled_size(&self) -> Size {
        Size::new(
            ((self.source.width as f32 * self.scale).round() as u32).max(1),
            ((self.source.height as f32 * self.scale).round() as u32).max(1),
        )
    }

    pub fn forward(&self, pt: Point<Src>) -> Point<Dst> {
        Point::new(
            pt.x * self.scale + self.pad_x,
            pt.y * self.scale + self.pad_y,
        )
    }

    pub fn inverse(&self, pt: Point<Dst>) -> Point<Src> {
        Point::new(
            (pt.x - self.pad_x) / self.scale,
            (pt.y - self.pad_y) / self.scale,
        )
    }
}

impl<Src: Space, Dst: Space> fmt::Debug for Letterbox<Src, Dst> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Letterbox")
            .field("from", &Src::NAME)
            .field("to", &Dst::NAME)
            .field("scale", &self.scale)
            .field("pad_x", &self.pad_x)
            .field("pad_y", &self.pad_y)
            .finish()
    }
}

/// Fits `image` into a black canvas of size `canvas`, keeping its aspect ratio.
pub fn letterbox_resize(image: &RgbImage, canvas: Size, filter: ResizeFilter) -> Result<RgbImage> {
    let fit = Letterbox::<Original, Canvas>::fit(Size::of(image), canvas)?;
    let scaled = fit.scaled_size();
    let resized = imageops::resize(image, scaled.width, scaled.height, filter.into());

    let mut out = RgbImage::from_pixel(canvas.width, canvas.height, Rgb([0, 0, 0]));
    imageops::replace(
        &mut out,
        &resized,
        fit.pad_x.round() as i64,
        fit.pad_y.round() as i64,
    );
    Ok(out)
}

/// Cuts the letterbox padding back off a canvas-sized preview, leaving a picture with the
/// aspect ratio of `original`.
///
/// Used for showing the score map or hand mask next to the source photo.
pub fn trim_letterbox<P>(
    preview: &ImageBuffer<P, Vec<P::Subpixel>>,
    original: Size,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
{
    let fit = Letterbox::<Original, Canvas>::fit(original, Size::of(preview))?;
    let x = fit.pad_x.round().max(0.0) as u32;
    let y = fit.pad_y.round().max(0.0) as u32;
    let width = (original.width as f32 * fit.scale).round() as u32;
    let height = (original.height as f32 * fit.scale).round() as u32;
    let width = width.clamp(1, preview.width() - x);
    let height = height.clamp(1, preview.height() - y);
    Ok(preview.view(x, y, width, height).to_image())
}
