//! Progress hooks for [`crate::process_periods_with_progress`].
//!
//! The core reports one step per period. Rendering is left to the caller;
//! the CLI plugs in an `indicatif` bar, tests and library users get
//! [`NullProgress`].

/// Receives per-period progress from the overlap run.
pub trait ProgressCallback: Send + Sync {
    /// Number of periods about to be processed.
    fn set_total(&self, total: u64);

    /// Marks `delta` more periods as done.
    fn inc(&self, delta: u64);

    /// Names the period currently being processed.
    fn set_message(&self, msg: String);

    /// Called once after the last period with a closing summary.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProcessOptions, periods, process_periods_with_progress};
    use deforest_overlap_models::{Attributes, Feature, Layer};
    use geo::{Geometry, polygon};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, total: u64) {
            self.events.lock().unwrap().push(format!("total {total}"));
        }
        fn inc(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("inc {delta}"));
        }
        fn set_message(&self, msg: String) {
            self.events.lock().unwrap().push(msg);
        }
        fn finish(&self, msg: String) {
            self.events.lock().unwrap().push(format!("finish {msg}"));
        }
    }

    #[test]
    fn reports_one_step_per_period() {
        let recorder = Recorder::default();
        let farm = Layer::new(vec![Feature::new(
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 100.0, y: 0.0),
                (x: 100.0, y: 100.0),
                (x: 0.0, y: 100.0)
            ]),
            Attributes::new(),
        )]);

        process_periods_with_progress(
            &Layer::default(),
            &farm,
            &ProcessOptions::default(),
            &recorder,
        )
        .unwrap();

        let events = recorder.events.into_inner().unwrap();
        let periods = periods::all_periods();
        assert_eq!(events.first().map(String::as_str), Some("total 4"));
        assert_eq!(
            events.iter().filter(|e| e.as_str() == "inc 1").count(),
            periods.len()
        );
        assert_eq!(events.last().map(String::as_str), Some("finish 0 intersection rows"));
    }
}
