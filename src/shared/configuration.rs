// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Central configuration object for the crash reporter: a single validated
//! value, built once via a constructor that rejects inconsistent
//! combinations rather than leaving them to be discovered at signal time.

use crate::shared::constants::{
    ANR_ADJUSTED_THRESHOLD, ANR_MIN_THRESHOLD_WARN, ANR_NORMAL_THRESHOLD, DEFAULT_MAX_PER_MINUTE,
    DEFAULT_SAMPLE_RATE,
};
use anyhow::{ensure, Context};
use std::time::Duration;

/// Root configuration for a `CrashReporter` instance.
///
/// Constructed once at `initialize()` time and shared (read-only, via
/// `Arc`) by every component.
#[derive(Debug, Clone)]
pub struct CrashReporterConfiguration {
    /// `<base>` in `POST <base>/api/crashes`.
    pub endpoint_base_url: String,
    /// Whether ANR detection is installed at all.
    pub enable_anr_detection: bool,
    /// Normal (non-power-save) ANR threshold.
    pub anr_normal_threshold: Duration,
    /// Power-save / low-battery ANR threshold.
    pub anr_adjusted_threshold: Duration,
    /// Fraction of non-fatal, non-duplicate crashes actually sent.
    pub sample_rate: f64,
    /// Cap on pending-crash resend throughput.
    pub max_resend_per_minute: u32,
    /// Install the native (POSIX signal) handler. Unix-only; ignored elsewhere.
    pub enable_native_signal_handler: bool,
    /// Create a dedicated alternate signal stack for the native handler.
    pub create_alt_stack: bool,
    /// Actually use the alternate stack when installing handlers.
    pub use_alt_stack: bool,
    /// Signals the native handler should be installed for.
    pub native_signals: Vec<libc::c_int>,
}

impl CrashReporterConfiguration {
    /// Builds and validates a configuration.
    ///
    /// PRECONDITIONS:
    ///     None.
    /// Returns an error if `create_alt_stack` is requested without
    /// `use_alt_stack` (an allocated-but-unused altstack is always a
    /// mistake), or if `sample_rate` is outside `[0, 1]`.
    pub fn new(endpoint_base_url: impl Into<String>) -> anyhow::Result<Self> {
        let cfg = Self {
            endpoint_base_url: endpoint_base_url.into(),
            enable_anr_detection: true,
            anr_normal_threshold: ANR_NORMAL_THRESHOLD,
            anr_adjusted_threshold: ANR_ADJUSTED_THRESHOLD,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_resend_per_minute: DEFAULT_MAX_PER_MINUTE,
            enable_native_signal_handler: cfg!(feature = "native-signals"),
            create_alt_stack: true,
            use_alt_stack: true,
            native_signals: crate::native::default_signals(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !(self.create_alt_stack && !self.use_alt_stack),
            "Cannot create an altstack without using it"
        );
        ensure!(
            (0.0..=1.0).contains(&self.sample_rate),
            "sample_rate must be within [0, 1], got {}",
            self.sample_rate
        );
        ensure!(
            self.max_resend_per_minute > 0,
            "max_resend_per_minute must be positive"
        );
        Ok(())
    }

    /// Sets the ANR threshold used when the device is in the normal power
    /// state. Warns (via `tracing`) if the caller asks for something below
    /// one second, but does not reject it outright: a host doing deliberate
    /// stress-testing may want an aggressive threshold.
    pub fn set_anr_threshold(&mut self, threshold: Duration) {
        if threshold < ANR_MIN_THRESHOLD_WARN {
            tracing::warn!(
                threshold_ms = threshold.as_millis() as u64,
                "ANR threshold set below 1000ms; this will be noisy"
            );
        }
        self.anr_normal_threshold = threshold;
    }

    pub fn ingest_url(&self) -> anyhow::Result<http::Uri> {
        format!("{}{}", self.endpoint_base_url.trim_end_matches('/'), crate::shared::constants::INGEST_PATH)
            .parse::<http::Uri>()
            .context("invalid endpoint_base_url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_altstack_without_use() {
        let mut cfg = CrashReporterConfiguration::new("https://example.com").unwrap();
        cfg.create_alt_stack = true;
        cfg.use_alt_stack = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_sample_rate() {
        let mut cfg = CrashReporterConfiguration::new("https://example.com").unwrap();
        cfg.sample_rate = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builds_ingest_url() {
        let cfg = CrashReporterConfiguration::new("https://ingest.example.com").unwrap();
        assert_eq!(
            cfg.ingest_url().unwrap().to_string(),
            "https://ingest.example.com/api/crashes"
        );
    }
}
