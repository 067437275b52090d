//! ROS glue shared by the detection node binaries.

pub mod convert;

use anyhow::{Context as _, Result};
use async_std::task::spawn_blocking;
use clap::Parser;
use futures::{future, prelude::*};
use r2r::{
    log_error, log_info, log_warn, sensor_msgs::msg::Image, vision_msgs::msg::Detection2DArray,
    Context, Node, QosProfile,
};
use serde_loader::Json5Path;
use flume::TrySendError;
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use yolo_detection::{
    decode_color, decode_depth, sampling, Annotator, Config, Display, FrameCache, HeadlessDisplay,
    HighguiDisplay, LabelResolver, Mode, RateMeter, Sampler, YoloDetector,
};

#[derive(Debug, Parser)]
pub struct Opts {
    /// The JSON5 config file.
    #[clap(long)]
    pub config: PathBuf,

    /// Run without GUI windows.
    #[clap(long)]
    pub headless: bool,
}

/// Loads the config, wires subscriptions to the frame cache and runs the
/// sampler until it quits or the process is interrupted.
pub async fn run(mode: Mode, node_name: &str) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let mut config: Config = Json5Path::open_and_take(&opts.config)
        .with_context(|| format!("unable to load config {}", opts.config.display()))?;
    if let Some(dir) = opts.config.parent() {
        config.detector.model_file = dir.join(&config.detector.model_file);
    }
    let headless = opts.headless || config.headless;

    let depth_topic = match mode {
        Mode::Color => None,
        Mode::ColorDepth => Some(
            config
                .depth_topic
                .clone()
                .context("depth_topic must be set for the depth-aware detector")?,
        ),
    };

    let ctx = Context::create()?;
    let mut node = Node::create(ctx, node_name, &config.namespace)?;
    let qos = QosProfile::default()
        .best_effort()
        .volatile()
        .keep_last(config.qos_depth);

    let labels = LabelResolver::new(config.labels.clone());
    log_info!(
        env!("CARGO_PKG_NAME"),
        "Class labels: {:?}",
        labels.names()
    );
    let detector = YoloDetector::new(&config.detector)?;
    log_info!(
        env!("CARGO_PKG_NAME"),
        "Loaded model {}",
        config.detector.model_file.display()
    );

    // Frame cache shared by the subscriptions and the sampler
    let cache = Arc::new(FrameCache::new());
    let color_meter = Arc::new(RateMeter::new_secs());
    let depth_meter = Arc::new(RateMeter::new_secs());

    let color_future = {
        let cache = cache.clone();
        let meter = color_meter.clone();
        let sub = node.subscribe::<Image>(&config.image_topic, qos.clone())?;

        sub.for_each(move |msg| {
            meter.bump();
            let frame = decode_color(&convert::image_view(&msg), convert::frame_header(&msg.header));
            if let Err(err) = cache.update_color(frame) {
                log_error!(env!("CARGO_PKG_NAME"), "Failed to convert image: {:#}", err);
            }
            future::ready(())
        })
        .boxed()
    };

    let depth_future = match &depth_topic {
        Some(topic) => {
            let cache = cache.clone();
            let meter = depth_meter.clone();
            let sub = node.subscribe::<Image>(topic, qos.clone())?;

            sub.for_each(move |msg| {
                meter.bump();
                let frame =
                    decode_depth(&convert::image_view(&msg), convert::frame_header(&msg.header));
                if let Err(err) = cache.update_depth(frame) {
                    log_error!(
                        env!("CARGO_PKG_NAME"),
                        "Failed to convert depth image: {:#}",
                        err
                    );
                }
                future::ready(())
            })
            .boxed()
        }
        None => future::ready(()).boxed(),
    };

    let tick_meter = Arc::new(RateMeter::new_secs());

    let rate_printing_future = {
        let mut meters = vec![(config.image_topic.clone(), color_meter)];
        if let Some(topic) = &depth_topic {
            meters.push((topic.clone(), depth_meter));
        }
        let tick_meter = tick_meter.clone();

        async move {
            let topic_prints = meters.iter().map(|(topic, meter)| {
                meter.rate_stream().for_each(move |rate| async move {
                    log_info!(env!("CARGO_PKG_NAME"), "{} rate {} msgs/s", topic, rate);
                })
            });
            let tick_print = tick_meter.rate_stream().for_each(|rate| async move {
                log_info!(env!("CARGO_PKG_NAME"), "inference rate {} frames/s", rate);
            });

            futures::join!(future::join_all(topic_prints), tick_print);
        }
    };

    // Detections are handed from the sampler thread to the publisher
    let (det_tx, det_rx) = flume::bounded::<Detection2DArray>(2);
    let publish_future = match &config.output_topic {
        Some(topic) => {
            let publisher = node.create_publisher::<Detection2DArray>(topic, QosProfile::default())?;
            det_rx
                .into_stream()
                .for_each(move |msg| {
                    if let Err(err) = publisher.publish(&msg) {
                        log_error!(
                            env!("CARGO_PKG_NAME"),
                            "Failed to publish detections: {}",
                            err
                        );
                    }
                    future::ready(())
                })
                .boxed()
        }
        None => {
            drop(det_rx);
            future::ready(()).boxed()
        }
    };
    let publish_enabled = config.output_topic.is_some();

    // Stop the sampler on Ctrl-C
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let display: Box<dyn Display> = if headless {
        Box::new(HeadlessDisplay)
    } else {
        Box::new(HighguiDisplay::default())
    };
    let mut sampler = Sampler::new(cache, mode, Box::new(detector))
        .with_labels(labels)
        .with_reduction(config.depth.reduction)
        .with_max_display_depth(config.depth.max_display_depth.raw())
        .with_display(Annotator::default(), display);

    let period = config.sampling_period();
    let sampler_future = spawn_blocking(move || {
        sampling::run(period, &stop_rx, || {
            let outcome = sampler.tick();
            sampling::handle_outcome(outcome, mode, &mut io::stdout(), |report| {
                tick_meter.bump();
                if !publish_enabled {
                    return;
                }

                match det_tx.try_send(convert::detection_array(report)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log_warn!(
                            env!("CARGO_PKG_NAME"),
                            "Publisher is lagging, dropped detections"
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        log_error!(
                            env!("CARGO_PKG_NAME"),
                            "Detection publisher has stopped"
                        );
                    }
                }
            })
        });
    });

    // Spin the ROS node
    let spin_future = spawn_blocking(move || loop {
        node.spin_once(Duration::from_millis(100));
    });

    let background = future::join5(
        color_future,
        depth_future,
        rate_printing_future,
        spin_future,
        publish_future,
    )
    .boxed();

    // The sampler decides when the node stops
    future::select(sampler_future, background).await;

    log_info!(env!("CARGO_PKG_NAME"), "Shutting down");
    Ok(())
}
