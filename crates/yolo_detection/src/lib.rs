//! Object detection on camera frames with optional per-object distance
//! estimation from registered depth frames.
//!
//! The crate contains everything that does not need a ROS runtime. The
//! node crates subscribe to image topics, feed decoded frames into a
//! [`FrameCache`] and drive a [`Sampler`] with [`sampling::run`].

pub mod annotate;
pub mod cache;
pub mod config;
pub mod depth;
pub mod detection;
pub mod detector;
pub mod display;
pub mod frame;
pub mod labels;
pub mod rate_meter;
pub mod sampling;

pub use crate::{
    annotate::Annotator,
    cache::{FrameCache, Snapshot},
    config::Config,
    depth::{estimate_distance, DepthReduction, Distance},
    detection::{BBox, Detection},
    detector::{Detector, YoloDetector},
    display::{Display, HeadlessDisplay, HighguiDisplay},
    frame::{decode_color, decode_depth, ColorFrame, DepthFrame, FrameHeader, ImageView},
    labels::LabelResolver,
    rate_meter::RateMeter,
    sampling::{handle_outcome, DetectedObject, Mode, Sampler, TickOutcome, TickReport},
};
