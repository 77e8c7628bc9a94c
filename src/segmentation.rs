//! Hand mask post-processing of the segmentation network's score maps.
//!
//! The network emits a background and a foreground logit per canvas pixel. The mask is derived
//! in five passes over dense float buffers:
//!
//! 1. two-class softmax → foreground probability,
//! 2. global min/max of the probability map,
//! 3. the exact maximum becomes 1.0 and the exact minimum 0.0, everything else passes through,
//! 4. rounding to the nearest of {0, 1} (the *anchor*),
//! 5. `iterations` rounds of: mean-filter the running mask with a flat square window, then
//!    multiply it with the anchor.
//!
//! The result stays inside the anchor's support. Interior pixels keep a positive value while
//! isolated specks, whose window mean decays geometrically, fade out to exactly zero.

use image::{GrayImage, Luma};
use ndarray::Array2;

use crate::compute::ComputeContext;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::scoremap::ScoreMap;
use crate::space::Size;

pub const BACKGROUND_CHANNEL: usize = 0;
pub const FOREGROUND_CHANNEL: usize = 1;

/// Dilation parameters of the final mask pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskParams {
    /// Side of the square window. Must be odd.
    pub window: u32,
    pub iterations: u32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            window: 21,
            iterations: 32,
        }
    }
}

impl From<&PipelineConfig> for MaskParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            window: config.dilate_size,
            iterations: config.dilate_iterations,
        }
    }
}

/// Single-channel hand mask on the working canvas. A pixel belongs to the hand if its value is
/// above zero.
#[derive(Debug, Clone, PartialEq)]
pub struct HandMask {
    data: Array2<f32>,
}

impl HandMask {
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn width(&self) -> u32 {
        self.data.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.data.dim().0 as u32
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Mask value at `(x, y)`. Panics when out of bounds.
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.data[[y as usize, x as usize]]
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.value(x, y) > 0.0
    }

    /// Number of pixels that belong to the hand.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v > 0.0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|v| !(*v > 0.0))
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Renders the mask as 8-bit grayscale, mapping `0.0..=1.0` to `0..=255`.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([(self.value(x, y).clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }
}

// Two-class softmax as a sigmoid of the logit difference. NaN stays NaN: min_max skips it and
// binarize sends it to 0.
fn softmax_foreground(bg: f32, fg: f32) -> f32 {
    1.0 / (1.0 + (bg - fg).exp())
}

// A flat map collapses to zero.
fn replace_extremes(v: f32, min: f32, max: f32) -> f32 {
    if min == max {
        0.0
    } else if v == max {
        1.0
    } else if v == min {
        0.0
    } else {
        v
    }
}

// Rounds to the nearest of {0, 1}; anything that is not a number lands on 0.
fn binarize(v: f32) -> f32 {
    if v >= 0.5 { 1.0 } else { 0.0 }
}

fn window_sum(src: &[f32], center: usize, radius: usize) -> f32 {
    let lo = center.saturating_sub(radius);
    let hi = (center + radius + 1).min(src.len());
    src[lo..hi].iter().sum()
}

/// Runs the full post-processing chain on a `(background, foreground)` score map pair and
/// returns the hand mask.
///
/// The score maps must match the canvas the context was created for.
pub fn hand_mask(
    ctx: &mut ComputeContext,
    scores: &ScoreMap,
    params: MaskParams,
) -> Result<HandMask> {
    let canvas = ctx.canvas();
    if scores.channels() != 2 {
        return Err(Error::invalid(format!(
            "expected background and foreground score maps, got {} channel(s)",
            scores.channels()
        )));
    }
    if scores.size() != canvas {
        return Err(Error::invalid(format!(
            "score map is {}, compute context expects {canvas}",
            scores.size()
        )));
    }
    if params.window == 0 || params.window % 2 == 0 {
        return Err(Error::invalid(format!(
            "dilation window must be odd, got {}",
            params.window
        )));
    }

    let width = canvas.width as usize;
    let height = canvas.height as usize;
    let radius = (params.window / 2) as usize;
    let inv_area = 1.0 / (params.window * params.window) as f32;

    let ComputeContext {
        dispatch, scratch, ..
    } = ctx;

    for (dst, src) in scratch
        .background
        .iter_mut()
        .zip(scores.channel(BACKGROUND_CHANNEL).iter())
    {
        *dst = *src;
    }
    for (dst, src) in scratch
        .foreground
        .iter_mut()
        .zip(scores.channel(FOREGROUND_CHANNEL).iter())
    {
        *dst = *src;
    }

    {
        let bg = &scratch.background;
        let fg = &scratch.foreground;
        dispatch.per_pixel(&mut scratch.anchor, |i| softmax_foreground(bg[i], fg[i]));
    }

    let (min, max) = dispatch.min_max(&scratch.anchor);
    log::trace!("foreground probability range [{min}, {max}]");

    dispatch.map_in_place(&mut scratch.anchor, |v| replace_extremes(v, min, max));
    dispatch.map_in_place(&mut scratch.anchor, binarize);

    scratch.current.copy_from_slice(&scratch.anchor);

    dispatch.iterate(params.iterations, |_| {
        {
            let current = &scratch.current;
            dispatch.per_row(&mut scratch.rows, width, |y, row| {
                let src = &current[y * width..(y + 1) * width];
                for (x, out) in row.iter_mut().enumerate() {
                    *out = window_sum(src, x, radius);
                }
            });
        }
        {
            let rows = &scratch.rows;
            dispatch.per_row(&mut scratch.dilated, width, |y, out| {
                out.fill(0.0);
                let lo = y.saturating_sub(radius);
                let hi = (y + radius + 1).min(height);
                for yy in lo..hi {
                    let src = &rows[yy * width..(yy + 1) * width];
                    for (o, s) in out.iter_mut().zip(src) {
                        *o += *s;
                    }
                }
                for o in out.iter_mut() {
                    *o *= inv_area;
                }
            });
        }
        {
            let dilated = &scratch.dilated;
            let anchor = &scratch.anchor;
            dispatch.per_pixel(&mut scratch.current, |i| dilated[i] * anchor[i]);
        }
    });

    let current = &scratch.current;
    let data = Array2::from_shape_fn((height, width), |(y, x)| current[y * width + x]);
    Ok(HandMask::from_array(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComputeBackend, ComputeOptions};

    fn context(canvas: Size) -> ComputeContext {
        ComputeContext::new(canvas, &ComputeOptions::serial()).unwrap()
    }

    fn blob_scores(canvas: Size, x0: usize, y0: usize, side: usize) -> ScoreMap {
        let (w, h) = (canvas.width as usize, canvas.height as usize);
        let mut data = vec![0.0; 2 * w * h];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                data[w * h + y * w + x] = 1.0;
            }
        }
        ScoreMap::from_vec(2, h, w, data).unwrap()
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        assert_eq!(softmax_foreground(0.0, 0.0), 0.5);
        assert!((softmax_foreground(-1000.0, 1000.0) - 1.0).abs() < 1e-6);
        assert!(softmax_foreground(1000.0, -1000.0) < 1e-6);
    }

    #[test]
    fn softmax_handles_non_finite_logits() {
        assert!(softmax_foreground(f32::NAN, 1.0).is_nan());
        assert!(softmax_foreground(f32::INFINITY, f32::INFINITY).is_nan());
        assert_eq!(softmax_foreground(1.0, f32::INFINITY), 1.0);
        assert_eq!(softmax_foreground(f32::INFINITY, 1.0), 0.0);
        assert_eq!(binarize(f32::NAN), 0.0);
        assert_eq!(binarize(0.5), 1.0);
        assert_eq!(binarize(0.49), 0.0);
    }

    #[test]
    fn only_exact_extremes_are_replaced() {
        assert_eq!(replace_extremes(0.9, 0.1, 0.9), 1.0);
        assert_eq!(replace_extremes(0.1, 0.1, 0.9), 0.0);
        assert_eq!(replace_extremes(0.3, 0.1, 0.9), 0.3);
        assert_eq!(replace_extremes(0.3, 0.3, 0.3), 0.0);
    }

    #[test]
    fn round_step_yields_binary_values() {
        // No dilation passes: the output is the rounded anchor itself.
        let canvas = Size::new(16, 8);
        let data: Vec<f32> = (0..2 * 16 * 8)
            .map(|i| ((i * 37 % 101) as f32 / 10.0) - 5.0)
            .collect();
        let scores = ScoreMap::from_vec(2, 8, 16, data).unwrap();
        let mask = hand_mask(
            &mut context(canvas),
            &scores,
            MaskParams {
                window: 3,
                iterations: 0,
            },
        )
        .unwrap();
        assert!(mask.as_array().iter().all(|v| *v == 0.0 || *v == 1.0));
        assert!(!mask.is_empty());
    }

    #[test]
    fn nan_logit_stays_out_of_the_mask() {
        let canvas = Size::new(16, 8);
        let mut data = vec![0.0; 2 * 16 * 8];
        data[16 * 8 + 3 * 16 + 5] = f32::NAN;
        data[16 * 8 + 4 * 16 + 9] = 2.0;
        let scores = ScoreMap::from_vec(2, 8, 16, data).unwrap();
        let mask = hand_mask(
            &mut context(canvas),
            &scores,
            MaskParams {
                window: 3,
                iterations: 0,
            },
        )
        .unwrap();
        assert!(mask.as_array().iter().all(|v| *v == 0.0 || *v == 1.0));
        assert!(!mask.is_set(5, 3));
        assert!(mask.is_set(9, 4));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn nan_logit_does_not_hide_a_hand() {
        let canvas = Size::new(320, 240);
        let blob = blob_scores(canvas, 130, 90, 60);
        let mut data: Vec<f32> = blob.channel(BACKGROUND_CHANNEL).iter().copied().collect();
        let mut fg: Vec<f32> = blob.channel(FOREGROUND_CHANNEL).iter().copied().collect();
        fg[5 * 320 + 5] = f32::NAN;
        data.extend(fg);
        let scores = ScoreMap::from_vec(2, 240, 320, data).unwrap();

        let mask = hand_mask(&mut context(canvas), &scores, MaskParams::default()).unwrap();
        assert!(mask.as_array().iter().all(|v| !v.is_nan()));
        assert!(!mask.is_set(5, 5));
        assert!(mask.is_set(160, 120));
        assert!(mask.is_set(130, 90));
        assert_eq!(mask.count(), 60 * 60);
    }

    #[test]
    fn mask_support_matches_blob() {
        let canvas = Size::new(64, 48);
        let scores = blob_scores(canvas, 20, 10, 16);
        let mask = hand_mask(&mut context(canvas), &scores, MaskParams::default()).unwrap();

        for y in 0..48 {
            for x in 0..64 {
                let inside = (20..36).contains(&x) && (10..26).contains(&y);
                assert_eq!(mask.is_set(x, y), inside, "({x}, {y})");
            }
        }
        assert!(mask.as_array().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn isolated_speck_fades_out() {
        let canvas = Size::new(40, 40);
        let (w, h) = (40usize, 40usize);
        let mut data = vec![0.0; 2 * w * h];
        for y in 5..25 {
            for x in 5..25 {
                data[w * h + y * w + x] = 1.0;
            }
        }
        data[w * h + 35 * w + 35] = 1.0;
        let scores = ScoreMap::from_vec(2, h, w, data).unwrap();

        let mask = hand_mask(&mut context(canvas), &scores, MaskParams::default()).unwrap();
        assert!(!mask.is_set(35, 35));
        assert!(mask.is_set(15, 15));
        assert!(mask.is_set(5, 5));
    }

    #[test]
    fn flat_foreground_gives_empty_mask() {
        let canvas = Size::new(32, 24);
        let scores = ScoreMap::from_vec(2, 24, 32, vec![0.0; 2 * 32 * 24]).unwrap();
        let mask = hand_mask(&mut context(canvas), &scores, MaskParams::default()).unwrap();
        assert!(mask.is_empty());
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn serial_and_pool_backends_agree() {
        let canvas = Size::new(80, 60);
        let scores = blob_scores(canvas, 30, 12, 25);
        let params = MaskParams {
            window: 7,
            iterations: 6,
        };
        let serial = hand_mask(&mut context(canvas), &scores, params).unwrap();
        let mut pooled_ctx = ComputeContext::new(
            canvas,
            &ComputeOptions {
                backend: ComputeBackend::Threads,
                threads: 4,
            },
        )
        .unwrap();
        let pooled = hand_mask(&mut pooled_ctx, &scores, params).unwrap();
        assert_eq!(serial, pooled);
    }

    #[test]
    fn context_is_reusable_between_calls() {
        let canvas = Size::new(48, 32);
        let mut ctx = context(canvas);
        let first = hand_mask(&mut ctx, &blob_scores(canvas, 4, 4, 10), MaskParams::default())
            .unwrap();
        let second = hand_mask(&mut ctx, &blob_scores(canvas, 30, 15, 12), MaskParams::default())
            .unwrap();
        assert!(first.is_set(8, 8));
        assert!(!second.is_set(8, 8));
        assert!(second.is_set(35, 20));
    }

    #[test]
    fn shape_mismatch_is_invalid_input() {
        let scores = blob_scores(Size::new(32, 32), 4, 4, 8);
        let err = hand_mask(
            &mut context(Size::new(320, 240)),
            &scores,
            MaskParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn mask_image_is_grayscale_copy() {
        let mut data = Array2::zeros((2, 2));
        data[[0, 1]] = 1.0;
        data[[1, 0]] = 0.5;
        let img = HandMask::from_array(data).to_image();
        assert_eq!(img.as_raw(), &[0, 255, 128, 0]);
    }
}
