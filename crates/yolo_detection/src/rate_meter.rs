use futures::prelude::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering::*},
    time::Duration,
};

/// Counts events and reports them as a rate per second.
pub struct RateMeter {
    interval: Duration,
    count: AtomicUsize,
}

impl RateMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            count: AtomicUsize::new(0),
        }
    }

    pub fn new_secs() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn bump(&self) {
        self.count.fetch_add(1, SeqCst);
    }

    /// Resets the counter and returns the rate since the last reset.
    pub fn take_rate(&self) -> f64 {
        let count = self.count.swap(0, SeqCst);
        count as f64 / self.interval.as_secs_f64()
    }

    /// Yields the rate once per interval.
    pub fn rate_stream(&self) -> impl Stream<Item = f64> + '_ {
        async_std::stream::interval(self.interval).map(|()| self.take_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_over_interval() {
        let meter = RateMeter::new(Duration::from_millis(500));
        (0..3).for_each(|_| meter.bump());

        assert_eq!(meter.take_rate(), 6.0);
        assert_eq!(meter.take_rate(), 0.0);
    }

    #[async_std::test]
    async fn stream_reports_bumps() {
        let meter = RateMeter::new(Duration::from_millis(10));
        meter.bump();
        meter.bump();

        let rate = meter.rate_stream().next().await.unwrap();
        assert!((rate - 200.0).abs() < 1e-6);
    }
}
