//! Object detectors.

use crate::{
    config::{DetectorConfig, InferenceBackend},
    detection::{BBox, Detection},
};
use anyhow::{anyhow, ensure, Result};
use log::info;
use opencv::{
    core::{Rect, Scalar, Size, Vector, CV_32F},
    dnn,
    prelude::*,
};

/// Produces detections for a color frame.
pub trait Detector: Send {
    fn detect(&mut self, image: &Mat) -> Result<Vec<Detection>>;
}

/// Boxes of different classes are shifted this far apart so that NMS
/// never suppresses across classes.
const CLASS_OFFSET: f32 = 8192.0;

/// Runs an Ultralytics YOLO ONNX export with the OpenCV DNN module.
///
/// The model is expected to output a `[1, 4 + classes, anchors]`
/// tensor, where each anchor holds `cx, cy, w, h` followed by the
/// per-class scores.
pub struct YoloDetector {
    net: dnn::Net,
    input_size: i32,
    num_classes: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
    max_detections: usize,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let DetectorConfig {
            ref model_file,
            input_size,
            num_classes,
            confidence_threshold,
            nms_threshold,
            max_detections,
            backend,
        } = *config;

        let model_path = model_file
            .to_str()
            .ok_or_else(|| anyhow!("model path {} is not valid UTF-8", model_file.display()))?;
        ensure!(
            model_file.is_file(),
            "model file {} does not exist",
            model_file.display()
        );
        ensure!(input_size > 0, "input_size must be positive");
        ensure!(num_classes > 0, "num_classes must be positive");

        let mut net = dnn::read_net_from_onnx(model_path)?;
        match backend {
            InferenceBackend::Cpu => {
                net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
                net.set_preferable_target(dnn::DNN_TARGET_CPU)?;
            }
            InferenceBackend::Cuda => {
                net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
                net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
            }
        }
        info!(
            "Loaded {} with {:?} backend, {}x{} input",
            model_file.display(),
            backend,
            input_size,
            input_size
        );

        Ok(Self {
            net,
            input_size: input_size as i32,
            num_classes,
            confidence_threshold: confidence_threshold.raw() as f32,
            nms_threshold: nms_threshold.raw() as f32,
            max_detections,
        })
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, image: &Mat) -> Result<Vec<Detection>> {
        ensure!(
            image.rows() > 0 && image.cols() > 0,
            "cannot run detection on an empty image"
        );

        let blob = dnn::blob_from_image(
            image,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,  // swap_rb
            false, // crop
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;

        let bytes = output.data_bytes()?;
        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let scale_x = image.cols() as f32 / self.input_size as f32;
        let scale_y = image.rows() as f32 / self.input_size as f32;
        let candidates = decode_predictions(
            &data,
            self.num_classes,
            [scale_x, scale_y],
            self.confidence_threshold,
        )?;

        suppress_overlaps(candidates, self.nms_threshold, self.max_detections)
    }
}

/// Decodes a flattened `[4 + num_classes, anchors]` prediction
/// tensor. Each anchor keeps its best class if that score reaches
/// `confidence_threshold`. Coordinates are multiplied by `scale`.
pub fn decode_predictions(
    data: &[f32],
    num_classes: usize,
    scale: [f32; 2],
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let num_attrs = 4 + num_classes;
    ensure!(
        data.len() % num_attrs == 0,
        "prediction size {} is not a multiple of {} attributes",
        data.len(),
        num_attrs
    );
    let num_anchors = data.len() / num_attrs;
    let [scale_x, scale_y] = scale;
    let attr = |attr: usize, anchor: usize| data[attr * num_anchors + anchor];

    let detections = (0..num_anchors)
        .filter_map(|anchor| {
            let (class_id, confidence) = (0..num_classes)
                .map(|class_id| (class_id, attr(4 + class_id, anchor)))
                .max_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))?;

            if !(confidence >= confidence_threshold) {
                return None;
            }

            let bbox = BBox::from_center(
                attr(0, anchor) * scale_x,
                attr(1, anchor) * scale_y,
                attr(2, anchor) * scale_x,
                attr(3, anchor) * scale_y,
            );

            Some(Detection {
                bbox,
                confidence,
                class_id,
            })
        })
        .collect();

    Ok(detections)
}

/// Class-aware non-maximum suppression. The result is sorted by
/// decreasing confidence and holds at most `max_detections` entries.
pub fn suppress_overlaps(
    candidates: Vec<Detection>,
    nms_threshold: f32,
    max_detections: usize,
) -> Result<Vec<Detection>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let rects: Vector<Rect> = candidates
        .iter()
        .map(|det| {
            let offset = det.class_id as f32 * CLASS_OFFSET;
            let BBox {
                xmin,
                ymin,
                xmax,
                ymax,
            } = det.bbox;
            BBox::new(xmin + offset, ymin + offset, xmax + offset, ymax + offset).to_rect()
        })
        .collect();
    let scores: Vector<f32> = candidates.iter().map(|det| det.confidence).collect();
    let mut indices: Vector<i32> = Vector::new();

    dnn::nms_boxes(
        &rects,
        &scores,
        0.0, // score_threshold
        nms_threshold,
        &mut indices,
        1.0, // eta
        max_detections as i32,
    )?;

    let mut kept: Vec<Detection> = indices
        .iter()
        .filter_map(|idx| candidates.get(idx as usize).cloned())
        .collect();
    kept.sort_by(|lhs, rhs| rhs.confidence.total_cmp(&lhs.confidence));
    kept.truncate(max_detections);

    Ok(kept)
}
