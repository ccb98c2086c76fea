#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `deforest` binary.
//!
//! [`IndicatifProgress::steps_bar`] draws the one-step-per-period bar of an
//! overlap run and adapts it to the overlap crate's [`ProgressCallback`].
//! [`init_logger`] is the usual `pretty_env_logger` behind
//! `indicatif-log-bridge` setup, with one difference: when `RUST_LOG` is
//! unset it falls back to [`DEFAULT_LOG_FILTER`], which shows the run's own
//! `info` messages (loaded layers, period rows, written files) and only
//! warnings from dependencies.

use std::sync::Arc;

use deforest_overlap::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is unset. Targets match by prefix, so
/// `deforest` covers the binary and every `deforest_*` crate.
pub const DEFAULT_LOG_FILTER: &str = "warn,deforest=info";

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Creates a bar for a fixed number of steps (one per period).
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let filters = log_filters(std::env::var("RUST_LOG").ok());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .build();
    let level = logger.filter();

    // Already set when several tests initialize it
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

fn log_filters(rust_log: Option<String>) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}
