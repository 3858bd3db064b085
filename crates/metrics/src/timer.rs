use std::time::Instant;

use prometheus_exporter::prometheus::Histogram;

/// Timer to measure and record the duration of an event.
///
/// The timer can be stopped and observed at most once manually. If it is
/// dropped without being stopped, the measurement is discarded rather than
/// recorded.
#[must_use = "Timer should be kept in a variable otherwise it cannot observe duration"]
#[derive(Debug)]
pub struct DiscardOnDropHistogramTimer {
    /// A histogram for automatic recording of observations.
    histogram: Histogram,
    /// Whether the timer has already been observed once.
    observed: bool,
    /// Starting instant for the timer.
    start: Instant,
}

impl DiscardOnDropHistogramTimer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            observed: false,
            start: Instant::now(),
        }
    }

    /// Observe and record timer duration (in seconds).
    pub fn observe_duration(self) {
        self.stop_and_record();
    }

    /// Observe, record and return timer duration (in seconds).
    pub fn stop_and_record(self) -> f64 {
        let mut timer = self;
        timer.observe(true)
    }

    /// Observe and return timer duration (in seconds), without recording to
    /// the attached histogram.
    pub fn stop_and_discard(self) -> f64 {
        let mut timer = self;
        timer.observe(false)
    }

    fn observe(&mut self, record: bool) -> f64 {
        let elapsed = Instant::now().saturating_duration_since(self.start);
        let nanos = f64::from(elapsed.subsec_nanos()) / 1e9;
        let seconds = elapsed.as_secs() as f64 + nanos;
        self.observed = true;
        if record {
            self.histogram.observe(seconds);
        }
        seconds
    }
}

impl Drop for DiscardOnDropHistogramTimer {
    fn drop(&mut self) {
        if !self.observed {
            self.observe(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use prometheus_exporter::prometheus::{core::Collector, Histogram, HistogramOpts};

    use super::DiscardOnDropHistogramTimer;

    fn sample_count(histogram: &Histogram) -> u64 {
        let mut metric_families = histogram.collect();
        let metric_family = metric_families.pop().unwrap();
        let metric = metric_family.get_metric().first().unwrap().clone();
        metric.get_histogram().get_sample_count()
    }

    #[test]
    fn test_stop_and_record() {
        let opts = HistogramOpts::new("test_stop_and_record", "testing");
        let histogram = Histogram::with_opts(opts).unwrap();

        let timer = DiscardOnDropHistogramTimer::new(histogram.clone());
        thread::sleep(Duration::from_millis(100));
        let time = timer.stop_and_record();
        assert!(time >= 0.1);
        assert_eq!(sample_count(&histogram), 1);
    }

    #[test]
    fn test_stop_and_discard() {
        let opts = HistogramOpts::new("test_stop_and_discard", "testing");
        let histogram = Histogram::with_opts(opts).unwrap();

        let timer = DiscardOnDropHistogramTimer::new(histogram.clone());
        thread::sleep(Duration::from_millis(100));
        let time = timer.stop_and_discard();
        assert!(time >= 0.1);
        assert_eq!(sample_count(&histogram), 0);
    }

    #[test]
    fn test_discard_through_drop() {
        let opts = HistogramOpts::new("test_discard_through_drop", "testing");
        let histogram = Histogram::with_opts(opts).unwrap();

        {
            let _timer = DiscardOnDropHistogramTimer::new(histogram.clone());
            thread::sleep(Duration::from_millis(100));
        }
        assert_eq!(sample_count(&histogram), 0);
    }
}
