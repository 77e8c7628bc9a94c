//! Coordinate spaces.
//!
//! A single joint passes through four image spaces during one prediction:
//!
//! * [`Crop`]: pixels of the fixed-size hand crop fed to the pose network.
//! * [`Canvas`]: pixels of the letterboxed working canvas fed to the segmentation network.
//! * [`Original`]: pixels of the image the caller passed in.
//! * [`Viewport`]: pixels of whatever display the caller renders into.
//!
//! [`Point`] carries its space as a type parameter, so a crop-space point cannot be handed to a
//! function expecting canvas coordinates. All spaces use a top-left origin with Y pointing down.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};

/// Marker trait implemented by the coordinate space tags.
pub trait Space: Copy + fmt::Debug + Default + PartialEq {
    const NAME: &'static str;
}

macro_rules! spaces {
    ($($(#[$attr:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$attr])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name;

            impl Space for $name {
                const NAME: &'static str = stringify!($name);
            }
        )+
    };
}

spaces! {
    /// Pose network input crop.
    Crop,
    /// Letterboxed segmentation network input.
    Canvas,
    /// Source image as supplied by the caller.
    Original,
    /// Display surface.
    Viewport,
}

/// Width and height of an image or surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of anything implementing [`image::GenericImageView`].
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Fails with [`Error::InvalidInput`] if either dimension is zero.
    pub fn ensure_non_empty(self, what: &str) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::invalid(format!(
                "{what} has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        Ok(self)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A 2D point living in coordinate space `S`.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct Point<S: Space> {
    pub x: f32,
    pub y: f32,
    _space: PhantomData<S>,
}

impl<S: Space> Point<S> {
    pub const fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Rounds both coordinates to the nearest integer.
    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }

    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl<S: Space> fmt::Debug for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", S::NAME, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_names_space() {
        let p = Point::<Canvas>::new(1.5, -2.0);
        assert_eq!(format!("{p:?}"), "Canvas(1.5, -2)");
    }

    #[test]
    fn empty_sizes_are_rejected() {
        assert!(Size::new(0, 10).ensure_non_empty("image").is_err());
        assert!(Size::new(10, 0).ensure_non_empty("image").is_err());
        assert_eq!(
            Size::new(4, 3).ensure_non_empty("image").unwrap(),
            Size::new(4, 3)
        );
    }
}
