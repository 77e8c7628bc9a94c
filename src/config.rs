use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::crop::EmptyMaskPolicy;
use crate::error::Error;
use crate::space::Size;

/// Everything the binary reads from its JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub models: ModelConfig,
}

/// Geometry and compute parameters of the prediction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Working canvas the segmentation network runs on.
    pub canvas: Size,
    /// Side length of the square crop fed to the pose network.
    pub crop_size: u32,
    /// Factor applied to the larger side of the mask bounding box.
    pub box_padding: f32,
    pub min_crop_scale: f32,
    pub max_crop_scale: f32,
    /// Side length of the square structuring element used by the mask dilation. Must be odd.
    pub dilate_size: u32,
    /// Number of dilate+multiply passes run over the hand mask.
    pub dilate_iterations: u32,
    pub resize_filter: ResizeFilter,
    pub on_empty_mask: EmptyMaskPolicy,
    pub compute: ComputeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas: Size::new(320, 240),
            crop_size: 256,
            box_padding: 1.25,
            min_crop_scale: 0.25,
            max_crop_scale: 5.0,
            dilate_size: 21,
            dilate_iterations: 32,
            resize_filter: ResizeFilter::Triangle,
            on_empty_mask: EmptyMaskPolicy::Fail,
            compute: ComputeOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        self.canvas.ensure_non_empty("canvas")?;
        if self.crop_size == 0 {
            return Err(Error::invalid("crop size must be greater than zero"));
        }
        if self.dilate_size == 0 || self.dilate_size % 2 == 0 {
            return Err(Error::invalid(format!(
                "dilation window must be odd and non-zero, got {}",
                self.dilate_size
            )));
        }
        if !(self.box_padding > 0.0) {
            return Err(Error::invalid(format!(
                "box padding must be positive, got {}",
                self.box_padding
            )));
        }
        if !(self.min_crop_scale > 0.0 && self.min_crop_scale <= self.max_crop_scale) {
            return Err(Error::invalid(format!(
                "crop scale bounds [{}, {}] are not a valid range",
                self.min_crop_scale, self.max_crop_scale
            )));
        }
        Ok(())
    }
}

/// Interpolation used when letterboxing the input photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How the mask post-processing passes are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeBackend {
    /// Dedicated rayon thread pool.
    Threads,
    /// Everything on the calling thread.
    Serial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeOptions {
    pub backend: ComputeBackend,
    /// Worker count for [`ComputeBackend::Threads`]. 0 lets rayon decide.
    pub threads: usize,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            backend: ComputeBackend::Threads,
            threads: 0,
        }
    }
}

impl ComputeOptions {
    pub fn serial() -> Self {
        Self {
            backend: ComputeBackend::Serial,
            threads: 1,
        }
    }
}

/// Locations and tensor names of the three ONNX networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub segmentation: SegmentationModel,
    pub pose: PoseModel,
    pub gesture: GestureModel,
    /// Intra-op threads handed to each ONNX Runtime session.
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationModel::default(),
            pose: PoseModel::default(),
            gesture: GestureModel::default(),
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationModel {
    pub path: PathBuf,
    pub input: String,
    pub background_output: String,
    pub foreground_output: String,
}

impl Default for SegmentationModel {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/HandSegNet.onnx"),
            input: "image".to_string(),
            background_output: "bgScoremap".to_string(),
            foreground_output: "fgScoremap".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseModel {
    pub path: PathBuf,
    pub input: String,
    pub output: String,
}

impl Default for PoseModel {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/PoseNet.onnx"),
            input: "image".to_string(),
            output: "keypointScoremaps".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureModel {
    pub path: PathBuf,
    pub input: String,
    pub output: String,
    /// Class labels, indexed by the network's output channel.
    pub labels: Vec<String>,
}

impl Default for GestureModel {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/GestureNet.onnx"),
            input: "keypoints".to_string(),
            output: "classScores".to_string(),
            labels: ["fist", "one", "two", "three", "four", "five", "ok", "rock"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AppConfig {
    /// Reads the config at `path`, or returns the defaults if the file does not exist.
    ///
    /// Missing fields take their default values. A file that exists but does not parse is an
    /// error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                "configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }
}
