//! One full prediction: resize → segment → mask → crop → pose → keypoints → gesture → back to
//! the original image.

use std::time::Instant;

use image::{GrayImage, RgbImage};

use crate::compute::ComputeContext;
use crate::config::PipelineConfig;
use crate::crop::{BoundingBox, CropDescriptor, CropParams, extract_crop, locate_hand};
use crate::detector::{GestureNetwork, PoseNetwork, SegmentationNetwork};
use crate::error::{Error, Network, Result};
use crate::gesture::{GestureFeatures, display_label};
use crate::keypoints::{Keypoints, NUM_JOINTS, detect_keypoints};
use crate::letterbox::letterbox_resize;
use crate::segmentation::{FOREGROUND_CHANNEL, HandMask, MaskParams, hand_mask};
use crate::space::{Canvas, Crop, Original, Size, Viewport};
use crate::transform::{TransformChain, keypoints_to_viewport};

/// Everything one prediction produced.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Raw class label from the gesture network.
    pub gesture: String,
    /// Joints in the caller's image.
    pub keypoints: Keypoints<Original>,
    pub canvas_keypoints: Keypoints<Canvas>,
    /// Joints as detected in the pose heatmaps.
    pub crop_keypoints: Keypoints<Crop>,
    pub bounding_box: BoundingBox,
    pub transform: TransformChain,
    /// Letterboxed input the segmentation network saw.
    pub canvas_image: RgbImage,
    /// Hand crop the pose network saw.
    pub crop_image: RgbImage,
    /// Foreground score map, min/max stretched to 8 bits.
    pub foreground_scoremap: GrayImage,
    pub hand_mask: HandMask,
}

impl Prediction {
    pub fn original_size(&self) -> Size {
        self.transform.original_size()
    }

    pub fn crop(&self) -> &CropDescriptor {
        self.transform.crop()
    }

    /// Gesture label as shown to a user.
    pub fn label(&self) -> String {
        display_label(&self.gesture)
    }

    /// Joints placed in a display of size `viewport`, the original image letterboxed into it.
    pub fn keypoints_in_viewport(&self, viewport: Size) -> Result<Keypoints<Viewport>> {
        keypoints_to_viewport(&self.keypoints, self.original_size(), viewport)
    }
}

/// Ties the three networks to the geometry and compute stages.
///
/// The pipeline owns its [`ComputeContext`], so one pipeline serves one prediction at a time.
pub struct HandPosePipeline<S, P, G> {
    config: PipelineConfig,
    compute: ComputeContext,
    segmentation: S,
    pose: P,
    gesture: G,
}

impl<S, P, G> HandPosePipeline<S, P, G>
where
    S: SegmentationNetwork,
    P: PoseNetwork,
    G: GestureNetwork,
{
    pub fn new(
        config: PipelineConfig,
        compute: ComputeContext,
        segmentation: S,
        pose: P,
        gesture: G,
    ) -> Result<Self> {
        config.validate()?;
        if compute.canvas() != config.canvas {
            return Err(Error::invalid(format!(
                "compute context was built for a {} canvas, pipeline uses {}",
                compute.canvas(),
                config.canvas
            )));
        }
        Ok(Self {
            config,
            compute,
            segmentation,
            pose,
            gesture,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn predict(&mut self, image: &RgbImage) -> Result<Prediction> {
        let started = Instant::now();
        let original = Size::of(image).ensure_non_empty("input image")?;
        let canvas_size = self.config.canvas;

        let t = Instant::now();
        let canvas_image = letterbox_resize(image, canvas_size, self.config.resize_filter)?;
        log::debug!("resize {original} -> {canvas_size}: {:?}", t.elapsed());

        let t = Instant::now();
        let scores = self
            .segmentation
            .segment(&canvas_image)
            .map_err(|e| Error::inference(Network::Segmentation, e))?;
        if scores.channels() != 2 || scores.size() != canvas_size {
            return Err(unexpected_output(
                Network::Segmentation,
                format!(
                    "expected 2 score maps of {canvas_size}, got {} of {}",
                    scores.channels(),
                    scores.size()
                ),
            ));
        }
        log::debug!("segmentation network: {:?}", t.elapsed());

        let t = Instant::now();
        let mask = hand_mask(&mut self.compute, &scores, MaskParams::from(&self.config))?;
        log::debug!("hand mask ({} px): {:?}", mask.count(), t.elapsed());

        let t = Instant::now();
        let bounding_box = locate_hand(&mask, self.config.on_empty_mask)?;
        let crop = CropDescriptor::new(&bounding_box, canvas_size, &CropParams::from(&self.config));
        let crop_image = extract_crop(&canvas_image, &crop)?;
        log::debug!(
            "crop {bounding_box:?} at scale {:.3}: {:?}",
            crop.scale,
            t.elapsed()
        );

        let t = Instant::now();
        let heatmaps = self
            .pose
            .estimate(&crop_image)
            .map_err(|e| Error::inference(Network::Pose, e))?;
        let crop_side = Size::new(crop.crop_size, crop.crop_size);
        if heatmaps.channels() != NUM_JOINTS || heatmaps.size() != crop_side {
            return Err(unexpected_output(
                Network::Pose,
                format!(
                    "expected {NUM_JOINTS} heatmaps of {crop_side}, got {} of {}",
                    heatmaps.channels(),
                    heatmaps.size()
                ),
            ));
        }
        let crop_keypoints = detect_keypoints(&heatmaps)?;
        log::debug!("pose network: {:?}", t.elapsed());
        log::trace!("crop keypoints: {crop_keypoints:?}");

        let t = Instant::now();
        let features = GestureFeatures::encode(&crop_keypoints, crop.crop_size);
        let gesture = self
            .gesture
            .classify(&features)
            .map_err(|e| Error::inference(Network::Gesture, e))?;
        log::debug!("gesture network ({gesture}): {:?}", t.elapsed());

        let transform = TransformChain::new(crop, original)?;
        let canvas_keypoints = transform.keypoints_to_canvas(&crop_keypoints);
        let keypoints = transform.keypoints_to_original(&crop_keypoints);
        log::trace!("original keypoints: {keypoints:?}");
        log::debug!("prediction total: {:?}", started.elapsed());

        Ok(Prediction {
            gesture,
            keypoints,
            canvas_keypoints,
            crop_keypoints,
            bounding_box,
            transform,
            canvas_image,
            crop_image,
            foreground_scoremap: scores.channel_image(FOREGROUND_CHANNEL),
            hand_mask: mask,
        })
    }
}

fn unexpected_output(network: Network, msg: String) -> Error {
    Error::inference(network, anyhow::anyhow!(msg))
}
