use crate::depth::DepthReduction;
use noisy_float::prelude::*;
use serde::Deserialize;
use serde_semver::SemverReq;
use std::{num::NonZeroU64, path::PathBuf, time::Duration};

#[derive(Debug, Clone, SemverReq)]
#[version("0.1.0")]
pub struct Version;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Config format version.
    pub version: Version,

    /// ROS Namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Input topic for color images.
    pub image_topic: String,

    /// Input topic for registered depth images. Required by the
    /// depth-aware node and ignored by the color-only node.
    #[serde(default)]
    pub depth_topic: Option<String>,

    /// Output topic for detections. Nothing is published if unset.
    #[serde(default)]
    pub output_topic: Option<String>,

    /// The period of the sampling timer in milliseconds.
    #[serde(default = "default_sampling_period_ms")]
    pub sampling_period_ms: NonZeroU64,

    /// History depth of the subscription QoS.
    #[serde(default = "default_qos_depth")]
    pub qos_depth: usize,

    /// Class names indexed by class ID. Falls back to the COCO names.
    #[serde(default)]
    pub labels: Option<Vec<String>>,

    /// Disables annotation and GUI windows.
    #[serde(default)]
    pub headless: bool,

    pub detector: DetectorConfig,

    #[serde(default)]
    pub depth: DepthConfig,
}

impl Config {
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms.get())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// The ONNX model file. Relative paths are resolved against the
    /// directory of the config file.
    pub model_file: PathBuf,

    /// Side length of the square network input.
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Number of classes the model predicts.
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: R64,

    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: R64,

    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    #[serde(default)]
    pub backend: InferenceBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBackend {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthConfig {
    /// How the depth samples inside a box are reduced to one value.
    #[serde(default)]
    pub reduction: DepthReduction,

    /// Depth in meters that maps to white in the depth window.
    #[serde(default = "default_max_display_depth")]
    pub max_display_depth: R64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            reduction: DepthReduction::default(),
            max_display_depth: default_max_display_depth(),
        }
    }
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_sampling_period_ms() -> NonZeroU64 {
    NonZeroU64::new(200).unwrap()
}

fn default_qos_depth() -> usize {
    10
}

fn default_input_size() -> u32 {
    640
}

fn default_num_classes() -> usize {
    80
}

fn default_confidence_threshold() -> R64 {
    r64(0.25)
}

fn default_nms_threshold() -> R64 {
    r64(0.45)
}

fn default_max_detections() -> usize {
    300
}

fn default_max_display_depth() -> R64 {
    r64(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let text = r#"{
            version: "0.1.0",
            image_topic: "/image_raw",
            detector: { model_file: "yolo11n.onnx" },
        }"#;
        let config: Config = json5::from_str(text).unwrap();

        assert_eq!(config.namespace, "/");
        assert_eq!(config.sampling_period(), Duration::from_millis(200));
        assert_eq!(config.qos_depth, 10);
        assert!(config.depth_topic.is_none());
        assert!(config.labels.is_none());
        assert!(!config.headless);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.detector.num_classes, 80);
        assert_eq!(config.detector.backend, InferenceBackend::Cpu);
        assert_eq!(config.depth.reduction, DepthReduction::Mean);
        assert_eq!(config.depth.max_display_depth, r64(10.0));
    }

    #[test]
    fn full_depth_config() {
        let text = r#"{
            version: "0.1.0",
            namespace: "/robot",
            image_topic: "/zed/zed_node/rgb_raw/image_rect_color",
            depth_topic: "/zed/zed_node/depth/depth_registered",
            output_topic: "detections",
            sampling_period_ms: 100,
            labels: ["person", "bicycle"],
            headless: true,
            detector: {
                model_file: "/opt/models/yolo11n.onnx",
                confidence_threshold: 0.5,
                backend: "cuda",
            },
            depth: { reduction: "median", max_display_depth: 5.0 },
        }"#;
        let config: Config = json5::from_str(text).unwrap();

        assert_eq!(
            config.depth_topic.as_deref(),
            Some("/zed/zed_node/depth/depth_registered")
        );
        assert_eq!(config.sampling_period(), Duration::from_millis(100));
        assert_eq!(config.labels.unwrap().len(), 2);
        assert!(config.headless);
        assert_eq!(config.detector.confidence_threshold, r64(0.5));
        assert_eq!(config.detector.backend, InferenceBackend::Cuda);
        assert_eq!(config.depth.reduction, DepthReduction::Median);
    }

    #[test]
    fn zero_sampling_period_is_rejected() {
        let text = r#"{
            version: "0.1.0",
            image_topic: "/image_raw",
            sampling_period_ms: 0,
            detector: { model_file: "yolo11n.onnx" },
        }"#;
        assert!(json5::from_str::<Config>(text).is_err());
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let text = r#"{
            version: "2.0.0",
            image_topic: "/image_raw",
            detector: { model_file: "yolo11n.onnx" },
        }"#;
        assert!(json5::from_str::<Config>(text).is_err());
    }
}
