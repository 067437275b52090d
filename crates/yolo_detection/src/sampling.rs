//! The fixed-rate sampling loop.
//!
//! Frames arrive at whatever rate the camera publishes and land in the
//! [`FrameCache`]. The [`Sampler`] wakes up once per period, takes the
//! latest frames, runs the detector on the color frame and, in the
//! depth-aware mode, estimates a distance for every detection.

use crate::{
    annotate::Annotator,
    cache::{FrameCache, Snapshot},
    depth::{estimate_distance, DepthReduction, Distance},
    detection::Detection,
    detector::Detector,
    display::{Display, HeadlessDisplay},
    frame::{ColorFrame, DepthFrame, FrameHeader},
    labels::LabelResolver,
};
use anyhow::Result;
use flume::RecvTimeoutError;
use log::{debug, error, info, warn};
use opencv::{core::CV_8U, prelude::*};
use std::{
    fmt,
    io::Write,
    ops::ControlFlow,
    sync::Arc,
    time::{Duration, Instant},
};

const DEPTH_WINDOW: &str = "Depth Image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Detection on color frames only.
    Color,
    /// Detection on color frames with distances from registered depth
    /// frames.
    ColorDepth,
}

impl Mode {
    pub fn requires_depth(self) -> bool {
        matches!(self, Self::ColorDepth)
    }

    pub fn detection_window(self) -> &'static str {
        match self {
            Self::Color => "Object Detection",
            Self::ColorDepth => "Detection Results",
        }
    }
}

/// A detection with its resolved label and distance.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub detection: Detection,
    pub label: String,
    /// Distance in meters. `None` in color-only mode, NaN when the box
    /// covers no valid depth sample.
    pub distance: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    /// Header of the color frame the detections belong to.
    pub header: FrameHeader,
    pub objects: Vec<DetectedObject>,
    /// The user pressed a quit key in a GUI window.
    pub quit_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingFrames {
    pub color: bool,
    pub depth: bool,
}

impl fmt::Display for MissingFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.color, self.depth) {
            (true, true) => write!(f, "color and depth images are missing"),
            (true, false) => write!(f, "color image is missing"),
            (false, true) => write!(f, "depth image is missing"),
            (false, false) => write!(f, "no image is missing"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Required frames were not received yet. Nothing ran.
    Skipped(MissingFrames),
    Processed(TickReport),
}

/// Runs one detection pass per tick on the latest cached frames.
pub struct Sampler {
    cache: Arc<FrameCache>,
    mode: Mode,
    detector: Box<dyn Detector>,
    labels: LabelResolver,
    reduction: DepthReduction,
    annotator: Option<Annotator>,
    display: Box<dyn Display>,
    max_display_depth: f64,
}

impl Sampler {
    /// Creates a headless sampler with COCO labels and mean depth
    /// reduction.
    pub fn new(cache: Arc<FrameCache>, mode: Mode, detector: Box<dyn Detector>) -> Self {
        Self {
            cache,
            mode,
            detector,
            labels: LabelResolver::default(),
            reduction: DepthReduction::default(),
            annotator: None,
            display: Box::new(HeadlessDisplay),
            max_display_depth: 10.0,
        }
    }

    pub fn with_labels(mut self, labels: LabelResolver) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_reduction(mut self, reduction: DepthReduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Draws detections with `annotator` and presents frames on
    /// `display` on every processed tick.
    pub fn with_display(mut self, annotator: Annotator, display: Box<dyn Display>) -> Self {
        self.annotator = Some(annotator);
        self.display = display;
        self
    }

    /// Sets the depth in meters that maps to white in the depth window.
    pub fn with_max_display_depth(mut self, meters: f64) -> Self {
        self.max_display_depth = meters;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        let Snapshot { color, depth } = self.cache.latest();

        let (color, depth) = match (color, depth) {
            (Some(color), _) if !self.mode.requires_depth() => (color, None),
            (Some(color), Some(depth)) => (color, Some(depth)),
            (color, depth) => {
                return Ok(TickOutcome::Skipped(MissingFrames {
                    color: color.is_none(),
                    depth: self.mode.requires_depth() && depth.is_none(),
                }));
            }
        };

        let detections = self.detector.detect(&color.image)?;

        let objects: Vec<DetectedObject> = detections
            .into_iter()
            .map(|detection| {
                let distance = depth
                    .as_deref()
                    .map(|depth| estimate_distance(depth, &detection.bbox, self.reduction));
                let label = self.labels.resolve(detection.class_id).into_owned();

                DetectedObject {
                    detection,
                    label,
                    distance,
                }
            })
            .collect();

        // A display failure must not drop the estimates
        let quit_requested = match self.present(&color, depth.as_deref(), &objects) {
            Ok(quit) => quit,
            Err(err) => {
                error!("Failed to display detections: {:#}", err);
                false
            }
        };

        Ok(TickOutcome::Processed(TickReport {
            header: color.header.clone(),
            objects,
            quit_requested,
        }))
    }

    /// Shows the annotated frame and the depth frame. Returns true if
    /// a quit key was pressed.
    fn present(
        &mut self,
        color: &ColorFrame,
        depth: Option<&DepthFrame>,
        objects: &[DetectedObject],
    ) -> Result<bool> {
        if self.display.is_headless() {
            return Ok(false);
        }

        let mut canvas = color.image.try_clone()?;
        if let Some(annotator) = &self.annotator {
            annotator.draw(&mut canvas, objects)?;
        }

        if let Some(depth) = depth {
            let mut gray = Mat::default();
            depth
                .image()
                .convert_to(&mut gray, CV_8U, 255.0 / self.max_display_depth, 0.0)?;
            self.display.show(DEPTH_WINDOW, &gray)?;
        }
        self.display.show(self.mode.detection_window(), &canvas)?;

        let quit = match self.display.poll_key()? {
            Some(key) => self.display.is_quit_key(key),
            None => false,
        };
        Ok(quit)
    }
}

/// Applies the per-tick policy to the outcome of [`Sampler::tick`].
///
/// Skipped and failed ticks are logged and never stop the loop. In the
/// depth-aware mode one distance line per detection is written to
/// `out`. Processed reports are then handed to `on_report`. The loop
/// only breaks when the user asked to quit.
pub fn handle_outcome<W, F>(
    outcome: Result<TickOutcome>,
    mode: Mode,
    out: &mut W,
    on_report: F,
) -> ControlFlow<()>
where
    W: Write,
    F: FnOnce(&TickReport),
{
    let report = match outcome {
        Ok(TickOutcome::Processed(report)) => report,
        Ok(TickOutcome::Skipped(missing)) => {
            warn!("Skipping detection: {}", missing);
            return ControlFlow::Continue(());
        }
        Err(err) => {
            error!("Detection failed: {:#}", err);
            return ControlFlow::Continue(());
        }
    };

    if mode.requires_depth() {
        for object in &report.objects {
            let distance = Distance(object.distance.unwrap_or(f32::NAN));
            if let Err(err) = writeln!(out, "{}: Estimated depth value: {}", object.label, distance)
            {
                warn!("Unable to write the distance estimate: {}", err);
            }
        }
    }

    on_report(&report);

    if report.quit_requested {
        info!("Quit key pressed");
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

/// Calls `tick` once per `period` until it breaks or a stop signal
/// arrives on `stop`.
///
/// Ticks never overlap. A tick that overruns the period delays the
/// next one, and missed ticks are not made up.
pub fn run<F>(period: Duration, stop: &flume::Receiver<()>, mut tick: F)
where
    F: FnMut() -> ControlFlow<()>,
{
    let mut until = Instant::now() + period;

    loop {
        match stop.recv_deadline(until) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("Sampling loop received a stop signal");
                break;
            }
        }

        let start = Instant::now();
        if tick().is_break() {
            break;
        }

        let now = Instant::now();
        let elapsed = now - start;
        if elapsed > period {
            warn!(
                "Sampling tick took {:?}, longer than the {:?} period",
                elapsed, period
            );
        }

        until += period;
        if until < now {
            until = now;
        }
    }
}
