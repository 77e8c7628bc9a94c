//! Single-shot hand pose and gesture recognition.
//!
//! [`HandPosePipeline::predict`] letterboxes a photo onto the working canvas, derives a hand
//! mask from the segmentation network's score maps, cuts a square crop around the hand, reads 21
//! joints off the pose network's heatmaps, classifies them into a gesture and maps the joints
//! back onto the caller's image. The networks themselves are pluggable, see [`detector`].

pub mod compute;
pub mod config;
pub mod crop;
pub mod detector;
pub mod error;
pub mod gesture;
pub mod keypoints;
pub mod letterbox;
pub mod overlay;
pub mod pipeline;
pub mod scoremap;
pub mod segmentation;
pub mod sensor;
pub mod space;
pub mod transform;

use log::LevelFilter;

pub use compute::ComputeContext;
pub use config::{AppConfig, PipelineConfig};
pub use error::{Error, Network, Result};
pub use keypoints::{Joint, Keypoints};
pub use pipeline::{HandPosePipeline, Prediction};
pub use space::{Canvas, Crop, Original, Point, Size, Viewport};

/// Initializes logging to *stderr*.
///
/// This crate logs at *debug* level, ONNX Runtime at *warn*. `RUST_LOG` overrides both. Does
/// nothing if a global logger is already registered.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter(Some(env!("CARGO_CRATE_NAME")), LevelFilter::Debug)
        .filter(Some("ort"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}
