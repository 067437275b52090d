//! Single-slot storage for the most recent color and depth frames.

use crate::frame::{ColorFrame, DepthFrame};
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};

/// Holds the latest color frame and the latest depth frame.
///
/// Writers replace the slot contents unconditionally. Both slots sit
/// behind one lock so that [`FrameCache::latest`] never observes a
/// half-updated pair.
#[derive(Debug, Default)]
pub struct FrameCache {
    slots: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    color: Option<Arc<ColorFrame>>,
    depth: Option<Arc<DepthFrame>>,
}

/// The cache contents at the time of a read.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub color: Option<Arc<ColorFrame>>,
    pub depth: Option<Arc<DepthFrame>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_color_frame(&self, frame: ColorFrame) {
        self.lock().color = Some(Arc::new(frame));
    }

    pub fn set_depth_frame(&self, frame: DepthFrame) {
        self.lock().depth = Some(Arc::new(frame));
    }

    /// Stores a decoded color frame. On a decode error the previous
    /// frame is kept and the error is returned to the caller.
    pub fn update_color(&self, decoded: Result<ColorFrame>) -> Result<()> {
        self.set_color_frame(decoded?);
        Ok(())
    }

    /// Stores a decoded depth frame. On a decode error the previous
    /// frame is kept and the error is returned to the caller.
    pub fn update_depth(&self, decoded: Result<DepthFrame>) -> Result<()> {
        self.set_depth_frame(decoded?);
        Ok(())
    }

    pub fn latest(&self) -> Snapshot {
        let slots = self.lock();
        Snapshot {
            color: slots.color.clone(),
            depth: slots.depth.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameHeader;
    use anyhow::anyhow;
    use opencv::{
        core::{Scalar, CV_8UC3},
        prelude::*,
    };
    use std::{thread, time::Duration};

    fn color_frame(seq: u64) -> ColorFrame {
        ColorFrame {
            image: Mat::new_rows_cols_with_default(2, 2, CV_8UC3, Scalar::all(seq as f64)).unwrap(),
            header: FrameHeader {
                stamp: Duration::from_millis(seq),
                frame_id: seq.to_string(),
            },
        }
    }

    fn depth_frame(seq: u64) -> DepthFrame {
        let header = FrameHeader {
            stamp: Duration::from_millis(seq),
            frame_id: seq.to_string(),
        };
        DepthFrame::from_samples(1, 1, &[seq as f32], header).unwrap()
    }

    #[test]
    fn empty_cache() {
        let snapshot = FrameCache::new().latest();
        assert!(snapshot.color.is_none());
        assert!(snapshot.depth.is_none());
    }

    #[test]
    fn last_write_wins() {
        let cache = FrameCache::new();
        (1..=5).for_each(|seq| cache.set_color_frame(color_frame(seq)));

        let snapshot = cache.latest();
        let color = snapshot.color.unwrap();
        assert_eq!(color.header.frame_id, "5");
        assert_eq!(color.header.stamp, Duration::from_millis(5));
        assert!(snapshot.depth.is_none());
    }

    #[test]
    fn slots_are_independent() {
        let cache = FrameCache::new();
        cache.set_depth_frame(depth_frame(7));
        cache.set_color_frame(color_frame(1));
        cache.set_color_frame(color_frame(2));

        let snapshot = cache.latest();
        assert_eq!(snapshot.color.unwrap().header.frame_id, "2");
        assert_eq!(snapshot.depth.unwrap().sample(0, 0), 7.0);
    }

    #[test]
    fn decode_failure_keeps_previous_frame() {
        let cache = FrameCache::new();
        cache.update_color(Ok(color_frame(1))).unwrap();

        let result = cache.update_color(Err(anyhow!("unsupported color encoding")));
        assert!(result.is_err());
        assert_eq!(cache.latest().color.unwrap().header.frame_id, "1");

        let result = cache.update_depth(Err(anyhow!("unsupported depth encoding")));
        assert!(result.is_err());
        assert!(cache.latest().depth.is_none());
    }

    #[test]
    fn snapshot_outlives_later_writes() {
        let cache = FrameCache::new();
        cache.set_color_frame(color_frame(1));
        let snapshot = cache.latest();
        cache.set_color_frame(color_frame(2));

        assert_eq!(snapshot.color.unwrap().header.frame_id, "1");
        assert_eq!(cache.latest().color.unwrap().header.frame_id, "2");
    }

    #[test]
    fn concurrent_writers() {
        let cache = Arc::new(FrameCache::new());

        let color_writer = {
            let cache = cache.clone();
            thread::spawn(move || (0..100).for_each(|seq| cache.set_color_frame(color_frame(seq))))
        };
        let depth_writer = {
            let cache = cache.clone();
            thread::spawn(move || (0..100).for_each(|seq| cache.set_depth_frame(depth_frame(seq))))
        };
        color_writer.join().unwrap();
        depth_writer.join().unwrap();

        let snapshot = cache.latest();
        assert_eq!(snapshot.color.unwrap().header.frame_id, "99");
        assert_eq!(snapshot.depth.unwrap().header().frame_id, "99");
    }
}
