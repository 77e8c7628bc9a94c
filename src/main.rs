use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use image::{DynamicImage, GrayImage, RgbImage};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use handpose::config::ResizeFilter;
use handpose::detector::OnnxNetworks;
use handpose::letterbox::{letterbox_resize, trim_letterbox};
use handpose::overlay::FrameBuffer;
use handpose::sensor::{self, webcam};
use handpose::{AppConfig, ComputeContext, HandPosePipeline, Prediction, Size};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photo to run on. Without one, a single frame is taken from the camera
    image: Option<PathBuf>,

    /// Camera index used when no image is given
    #[arg(short, long, default_value_t = 0)]
    camera: u32,

    /// JSON configuration file (defaults are used if it does not exist)
    #[arg(long, default_value = "handpose.json")]
    config: PathBuf,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,

    /// Save the hand mask as a grayscale image
    #[arg(long)]
    mask_out: Option<PathBuf>,

    /// Save the foreground score map as a grayscale image
    #[arg(long)]
    scoremap_out: Option<PathBuf>,

    /// Save the crop fed to the pose network
    #[arg(long)]
    crop_out: Option<PathBuf>,

    /// Show the result in a window
    #[arg(long)]
    preview: bool,

    /// Preview window size
    #[arg(long, default_value = "960x540", value_parser = parse_size)]
    viewport: Size,
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    let size = Size::new(width, height);
    if size.is_empty() {
        return Err(format!("viewport {size} has a zero dimension"));
    }
    Ok(size)
}

/// What the preview window is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Original,
    Scoremap,
    Mask,
}

fn main() -> Result<()> {
    handpose::init_logger();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    if args.write_config {
        config.save(&args.config)?;
        println!("Wrote configuration to {}", args.config.display());
        return Ok(());
    }

    let image = match &args.image {
        Some(path) => sensor::load_image(path)?,
        None => webcam::snapshot(args.camera)?,
    };

    let compute = ComputeContext::new(config.pipeline.canvas, &config.pipeline.compute)?;
    let nets = OnnxNetworks::load(&config.models)?;
    let mut pipeline = HandPosePipeline::new(
        config.pipeline.clone(),
        compute,
        nets.segmentation,
        nets.pose,
        nets.gesture,
    )?;

    let prediction = match pipeline.predict(&image) {
        Ok(prediction) => prediction,
        Err(e) if e.is_no_hand() => {
            println!("No hand found in the image.");
            return Ok(());
        }
        Err(e) => return Err(e).context("prediction failed"),
    };

    println!("Gesture: {}", prediction.label());
    for (i, p) in prediction.keypoints.iter().enumerate() {
        println!("  joint {i:2}: ({:.1}, {:.1})", p.x, p.y);
    }

    let original = prediction.original_size();
    if let Some(path) = &args.mask_out {
        save_preview(&prediction.hand_mask.to_image(), original, path)?;
    }
    if let Some(path) = &args.scoremap_out {
        save_preview(&prediction.foreground_scoremap, original, path)?;
    }
    if let Some(path) = &args.crop_out {
        prediction
            .crop_image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if args.preview {
        show(&image, &prediction, args.viewport)?;
    }
    Ok(())
}

fn save_preview(preview: &GrayImage, original: Size, path: &Path) -> Result<()> {
    trim_letterbox(preview, original)?
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn render(
    image: &RgbImage,
    prediction: &Prediction,
    view: View,
    show_keypoints: bool,
    viewport: Size,
) -> Result<FrameBuffer> {
    let original = prediction.original_size();
    let source = match view {
        View::Original => image.clone(),
        View::Scoremap => gray_to_rgb(trim_letterbox(&prediction.foreground_scoremap, original)?),
        View::Mask => gray_to_rgb(trim_letterbox(&prediction.hand_mask.to_image(), original)?),
    };

    let mut frame = FrameBuffer::new(viewport);
    frame.blit(&letterbox_resize(&source, viewport, ResizeFilter::Triangle)?);
    if show_keypoints {
        frame.skeleton(&prediction.keypoints_in_viewport(viewport)?);
    }
    frame.pack();
    Ok(frame)
}

fn gray_to_rgb(image: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image).to_rgb8()
}

fn show(image: &RgbImage, prediction: &Prediction, viewport: Size) -> Result<()> {
    let (width, height) = (viewport.width as usize, viewport.height as usize);
    let mut window = Window::new(
        &format!("handpose v{} - {}", env!("CARGO_PKG_VERSION"), prediction.label()),
        width,
        height,
        WindowOptions::default(),
    )?;
    window.limit_update_rate(Some(Duration::from_micros(1_000_000 / 30)));

    let mut view = View::Original;
    let mut show_keypoints = true;
    let mut frame = render(image, prediction, view, show_keypoints, viewport)?;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let mut changed = true;
        if window.is_key_pressed(Key::Key1, KeyRepeat::No) {
            view = View::Original;
        } else if window.is_key_pressed(Key::Key2, KeyRepeat::No) {
            view = View::Scoremap;
        } else if window.is_key_pressed(Key::Key3, KeyRepeat::No) {
            view = View::Mask;
        } else if window.is_key_pressed(Key::K, KeyRepeat::No) {
            show_keypoints = !show_keypoints;
        } else {
            changed = false;
        }
        if changed {
            log::debug!("showing {view:?}, keypoints {show_keypoints}");
            frame = render(image, prediction, view, show_keypoints, viewport)?;
        }

        window.update_with_buffer(frame.pixels(), frame.width(), frame.height())?;
    }
    Ok(())
}
