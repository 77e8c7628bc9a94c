use std::path::Path;

use anyhow::{Context, Result};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Decodes a still image from disk into RGB, turned upright according to its EXIF orientation.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let mut decoder = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()?
        .into_decoder()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let orientation = decoder.orientation()?;
    let image = DynamicImage::from_decoder(decoder)
        .with_context(|| format!("failed to decode {}", path.display()))?;

    log::debug!(
        "loaded {} ({}x{}, {orientation:?})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(upright(image, orientation))
}

fn upright(mut image: DynamicImage, orientation: Orientation) -> RgbImage {
    image.apply_orientation(orientation);
    image.to_rgb8()
}

pub mod webcam {
    use super::*;

    pub fn setup(index: u32) -> Result<Camera> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        log::info!("opening camera {index}");
        let camera = Camera::new(CameraIndex::Index(index), requested)
            .with_context(|| format!("failed to open camera {index}"))?;
        Ok(camera)
    }

    pub fn capture_and_decode_frame(camera: &mut Camera) -> Result<RgbImage> {
        let frame = camera.frame()?;
        Ok(frame.decode_image::<RgbFormat>()?)
    }

    /// Grabs one decoded frame from camera `index` and closes the stream again.
    pub fn snapshot(index: u32) -> Result<RgbImage> {
        let mut camera = setup(index)?;
        camera.open_stream()?;
        let frame = capture_and_decode_frame(&mut camera);
        if let Err(e) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {e}");
        }
        frame
    }
}
