//! Per-box distance estimation on registered depth frames.

use crate::{detection::BBox, frame::DepthFrame};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthReduction {
    #[default]
    Mean,
    Median,
}

impl DepthReduction {
    /// Reduces finite samples to one value. Returns NaN on empty input.
    fn reduce(self, samples: &mut [f32]) -> f32 {
        if samples.is_empty() {
            return f32::NAN;
        }

        match self {
            Self::Mean => {
                let sum: f64 = samples.iter().map(|&value| value as f64).sum();
                (sum / samples.len() as f64) as f32
            }
            Self::Median => {
                samples.sort_unstable_by(f32::total_cmp);
                let mid = samples.len() / 2;
                if samples.len() % 2 == 1 {
                    samples[mid]
                } else {
                    ((samples[mid - 1] as f64 + samples[mid] as f64) / 2.0) as f32
                }
            }
        }
    }
}

/// Estimates the distance to the object inside `bbox`.
///
/// The box is clamped to the depth frame and only finite samples are
/// kept. Returns NaN when the region holds no finite sample.
pub fn estimate_distance(depth: &DepthFrame, bbox: &BBox, reduction: DepthReduction) -> f32 {
    let region = bbox.clamp(depth.width(), depth.height());

    let mut samples: Vec<f32> = region
        .pixels()
        .map(|(row, col)| depth.sample(row, col))
        .filter(|value| value.is_finite())
        .collect();

    reduction.reduce(&mut samples)
}

/// Formats a distance estimate for console output.
#[derive(Debug, Clone, Copy)]
pub struct Distance(pub f32);

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() {
            write!(f, "{:.2}", self.0)
        } else {
            write!(f, "no estimate")
        }
    }
}
