use image::{GrayImage, Luma};
use ndarray::{Array3, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::space::Size;

/// Dense `channel × height × width` tensor of network scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
    data: Array3<f32>,
}

impl ScoreMap {
    /// Builds a score map from row-major data laid out channel by channel.
    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let data = Array3::from_shape_vec((channels, height, width), data)
            .map_err(|e| Error::invalid(format!("score map shape: {e}")))?;
        Ok(Self { data })
    }

    /// Stacks single-channel maps of equal size into one tensor.
    pub fn from_channels(channels: &[ArrayView2<'_, f32>]) -> Result<Self> {
        let data = ndarray::stack(Axis(0), channels)
            .map_err(|e| Error::invalid(format!("score map channels differ in shape: {e}")))?;
        Ok(Self { data })
    }

    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Spatial size of a single channel.
    pub fn size(&self) -> Size {
        Size::new(self.width() as u32, self.height() as u32)
    }

    /// Panics if `index` is out of range.
    pub fn channel(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    /// Renders one channel as an 8-bit grayscale image, stretching the channel's own min..max
    /// range to 0..255.
    ///
    /// A flat channel renders black.
    pub fn channel_image(&self, index: usize) -> GrayImage {
        let channel = self.channel(index);
        let (lo, hi) = channel
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = hi - lo;

        GrayImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            let v = channel[[y as usize, x as usize]];
            if range > 0.0 {
                Luma([((v - lo) / range * 255.0).round() as u8])
            } else {
                Luma([0])
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn from_vec_checks_length() {
        assert!(ScoreMap::from_vec(2, 3, 4, vec![0.0; 24]).is_ok());
        assert!(ScoreMap::from_vec(2, 3, 4, vec![0.0; 23]).is_err());
    }

    #[test]
    fn channels_stack_in_order() {
        let bg = Array2::from_elem((2, 3), 1.0f32);
        let fg = Array2::from_elem((2, 3), 2.0f32);
        let map = ScoreMap::from_channels(&[bg.view(), fg.view()]).unwrap();
        assert_eq!(map.channels(), 2);
        assert_eq!(map.size(), Size::new(3, 2));
        assert_eq!(map.channel(1)[[1, 2]], 2.0);
    }

    #[test]
    fn mismatched_channels_are_rejected() {
        let a = Array2::<f32>::zeros((2, 3));
        let b = Array2::<f32>::zeros((3, 2));
        assert!(ScoreMap::from_channels(&[a.view(), b.view()]).is_err());
    }

    #[test]
    fn channel_image_stretches_range() {
        let map = ScoreMap::from_vec(1, 1, 3, vec![-2.0, 0.0, 2.0]).unwrap();
        let img = map.channel_image(0);
        assert_eq!(img.as_raw(), &[0, 128, 255]);
    }

    #[test]
    fn flat_channel_renders_black() {
        let map = ScoreMap::from_vec(1, 2, 2, vec![0.7; 4]).unwrap();
        assert!(map.channel_image(0).pixels().all(|p| p.0 == [0]));
    }
}
