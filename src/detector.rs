//! The three neural networks the pipeline calls into, and their ONNX Runtime backends.
//!
//! The pipeline only sees the traits; any type that can turn an image into score maps (or a
//! feature vector into a label) plugs in, which is how the tests drive it with fakes.

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use image::RgbImage;
use ndarray::{Array2, Array4};
use ort::{inputs, session::Session, session::builder::GraphOptimizationLevel, value::Value};

use crate::config::{GestureModel, ModelConfig, PoseModel, SegmentationModel};
use crate::gesture::GestureFeatures;
use crate::keypoints::NUM_JOINTS;
use crate::scoremap::ScoreMap;

/// Canvas image → two single-channel score maps, background first, at canvas resolution.
pub trait SegmentationNetwork {
    fn segment(&mut self, canvas: &RgbImage) -> Result<ScoreMap>;
}

/// Hand crop → one heatmap per joint at crop resolution.
pub trait PoseNetwork {
    fn estimate(&mut self, crop: &RgbImage) -> Result<ScoreMap>;
}

/// Encoded keypoints → class label.
pub trait GestureNetwork {
    fn classify(&mut self, features: &GestureFeatures) -> Result<String>;
}

impl<T: SegmentationNetwork + ?Sized> SegmentationNetwork for Box<T> {
    fn segment(&mut self, canvas: &RgbImage) -> Result<ScoreMap> {
        (**self).segment(canvas)
    }
}

impl<T: PoseNetwork + ?Sized> PoseNetwork for Box<T> {
    fn estimate(&mut self, crop: &RgbImage) -> Result<ScoreMap> {
        (**self).estimate(crop)
    }
}

impl<T: GestureNetwork + ?Sized> GestureNetwork for Box<T> {
    fn classify(&mut self, features: &GestureFeatures) -> Result<String> {
        (**self).classify(features)
    }
}

fn open_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load model {}", path.display()))?;

    log::debug!("{} inputs: {:?}", path.display(), session.inputs());
    log::debug!("{} outputs: {:?}", path.display(), session.outputs());
    Ok(session)
}

fn image_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, rgb) in image.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = rgb[c] as f32 / 255.0;
        }
    }
    input
}

// [1, C, H, W] or [C, H, W]
fn scoremap_from(shape: &[i64], data: &[f32]) -> Result<ScoreMap> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    let (c, h, w) = match dims.as_slice() {
        [1, c, h, w] | [c, h, w] => (*c, *h, *w),
        other => bail!("expected a [1, C, H, W] score tensor, got {other:?}"),
    };
    Ok(ScoreMap::from_vec(c, h, w, data.to_vec())?)
}

pub struct OnnxSegmentationNet {
    session: Session,
    model: SegmentationModel,
}

impl OnnxSegmentationNet {
    pub fn new(model: SegmentationModel, intra_threads: usize) -> Result<Self> {
        let session = open_session(&model.path, intra_threads)?;
        Ok(Self { session, model })
    }
}

impl SegmentationNetwork for OnnxSegmentationNet {
    fn segment(&mut self, canvas: &RgbImage) -> Result<ScoreMap> {
        let input = Value::from_array(image_tensor(canvas))?;
        let outputs = self
            .session
            .run(inputs![self.model.input.as_str() => input])?;

        let (bg_shape, bg) = outputs[self.model.background_output.as_str()].try_extract_tensor::<f32>()?;
        let (fg_shape, fg) = outputs[self.model.foreground_output.as_str()].try_extract_tensor::<f32>()?;
        let bg = scoremap_from(bg_shape, bg)?;
        let fg = scoremap_from(fg_shape, fg)?;
        ensure!(
            bg.channels() == 1 && fg.channels() == 1,
            "segmentation outputs must have one channel each, got {} and {}",
            bg.channels(),
            fg.channels()
        );

        Ok(ScoreMap::from_channels(&[bg.channel(0), fg.channel(0)])?)
    }
}

pub struct OnnxPoseNet {
    session: Session,
    model: PoseModel,
}

impl OnnxPoseNet {
    pub fn new(model: PoseModel, intra_threads: usize) -> Result<Self> {
        let session = open_session(&model.path, intra_threads)?;
        Ok(Self { session, model })
    }
}

impl PoseNetwork for OnnxPoseNet {
    fn estimate(&mut self, crop: &RgbImage) -> Result<ScoreMap> {
        let input = Value::from_array(image_tensor(crop))?;
        let outputs = self
            .session
            .run(inputs![self.model.input.as_str() => input])?;

        let (shape, data) = outputs[self.model.output.as_str()].try_extract_tensor::<f32>()?;
        let heatmaps = scoremap_from(shape, data)?;
        ensure!(
            heatmaps.channels() == NUM_JOINTS,
            "pose network returned {} heatmaps, expected {NUM_JOINTS}",
            heatmaps.channels()
        );
        Ok(heatmaps)
    }
}

pub struct OnnxGestureNet {
    session: Session,
    model: GestureModel,
}

impl OnnxGestureNet {
    pub fn new(model: GestureModel, intra_threads: usize) -> Result<Self> {
        ensure!(!model.labels.is_empty(), "gesture model has no class labels");
        let session = open_session(&model.path, intra_threads)?;
        Ok(Self { session, model })
    }
}

impl GestureNetwork for OnnxGestureNet {
    fn classify(&mut self, features: &GestureFeatures) -> Result<String> {
        let values = features.as_slice();
        let input = Value::from_array(Array2::from_shape_vec((1, values.len()), values.to_vec())?)?;
        let outputs = self
            .session
            .run(inputs![self.model.input.as_str() => input])?;

        let (_, scores) = outputs[self.model.output.as_str()].try_extract_tensor::<f32>()?;
        ensure!(
            scores.len() == self.model.labels.len(),
            "gesture network returned {} class scores for {} labels",
            scores.len(),
            self.model.labels.len()
        );

        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        log::trace!("gesture scores: {scores:?}");
        Ok(self.model.labels[best].clone())
    }
}

/// The three ONNX networks, loaded from one [`ModelConfig`].
pub struct OnnxNetworks {
    pub segmentation: OnnxSegmentationNet,
    pub pose: OnnxPoseNet,
    pub gesture: OnnxGestureNet,
}

impl OnnxNetworks {
    pub fn load(models: &ModelConfig) -> Result<Self> {
        Ok(Self {
            segmentation: OnnxSegmentationNet::new(models.segmentation.clone(), models.intra_threads)?,
            pose: OnnxPoseNet::new(models.pose.clone(), models.intra_threads)?,
            gesture: OnnxGestureNet::new(models.gesture.clone(), models.intra_threads)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn image_tensor_is_planar_and_normalized() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 0, 51]));
        let t = image_tensor(&img);
        assert_eq!(t.dim(), (1, 3, 2, 3));
        assert_eq!(t[[0, 0, 1, 2]], 1.0);
        assert_eq!(t[[0, 1, 1, 2]], 0.0);
        assert_eq!(t[[0, 2, 1, 2]], 0.2);
    }

    #[test]
    fn scoremap_accepts_batched_and_unbatched_shapes() {
        let data = vec![0.0; 2 * 4 * 5];
        assert_eq!(scoremap_from(&[1, 2, 4, 5], &data).unwrap().channels(), 2);
        assert_eq!(scoremap_from(&[2, 4, 5], &data).unwrap().size().width, 5);
        assert!(scoremap_from(&[40], &data).is_err());
        assert!(scoremap_from(&[1, 2, 4, 4], &data).is_err());
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let model = PoseModel {
            path: "does/not/exist.onnx".into(),
            ..PoseModel::default()
        };
        assert!(OnnxPoseNet::new(model, 1).is_err());
    }
}
