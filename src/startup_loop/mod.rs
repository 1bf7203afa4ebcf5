// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Startup / Loop Detector: a persisted key/value marker file plus a
//! rolling crash counter, consulted by the Exception Handler on every crash
//! to decide whether the app is in a startup crash loop and reporting itself
//! should be disabled as a safety brake.

use crate::shared::constants::{
    CRASH_LOOP_THRESHOLD, CRASH_LOOP_WINDOW, SAFETY_BRAKE_CRASH_THRESHOLD,
    SAFETY_BRAKE_UPTIME_WINDOW, STARTUP_CRASH_WINDOW, STARTUP_STATE_FILE,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    app_started: bool,
    #[serde(default)]
    app_started_time: i64,
    #[serde(default)]
    startup_crash_count: u32,
    #[serde(default)]
    last_crash_time: i64,
    #[serde(default)]
    crash_loop_window_start: i64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            app_started: false,
            app_started_time: 0,
            startup_crash_count: 0,
            last_crash_time: 0,
            crash_loop_window_start: 0,
        }
    }
}

pub struct StartupLoopDetector {
    path: PathBuf,
    /// Whether `app_started` was still set when this session loaded — i.e.
    /// the *previous* session never reached `mark_initialized`.
    crashed_on_startup_at_load: bool,
    state: Mutex<State>,
}

impl StartupLoopDetector {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let path = cache_dir.as_ref().join(STARTUP_STATE_FILE);
        let state = load_or_default(&path);
        let crashed_on_startup_at_load = state.app_started;
        Ok(Self {
            path,
            crashed_on_startup_at_load,
            state: Mutex::new(state),
        })
    }

    pub fn mark_started(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.app_started = true;
        state.app_started_time = now_ms();
        self.persist(&state)
    }

    pub fn mark_initialized(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.app_started = false;
        self.persist(&state)
    }

    /// Bumps `last_crash_time`, and if within [`STARTUP_CRASH_WINDOW`] of
    /// `app_started_time`, bumps `startup_crash_count`. Returns the updated
    /// count.
    pub fn record_crash(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_ms();
        state.last_crash_time = now;

        if state.crash_loop_window_start == 0
            || now.saturating_sub(state.crash_loop_window_start)
                > CRASH_LOOP_WINDOW.as_millis() as i64
        {
            state.crash_loop_window_start = now;
            state.startup_crash_count = 0;
        }

        if now.saturating_sub(state.app_started_time) < STARTUP_CRASH_WINDOW.as_millis() as i64 {
            state.startup_crash_count += 1;
        }

        let count = state.startup_crash_count;
        self.persist(&state)?;
        Ok(count)
    }

    /// True if `app_started` was still set when this session loaded, meaning
    /// the previous run crashed before reaching `mark_initialized`.
    pub fn did_crash_on_startup(&self) -> bool {
        self.crashed_on_startup_at_load
    }

    /// True when `startup_crash_count >= 3` within the rolling 60-second
    /// crash-loop window.
    pub fn is_in_crash_loop(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.startup_crash_count >= CRASH_LOOP_THRESHOLD
    }

    /// True when `startup_crash_count >= 5` and uptime is under
    /// [`SAFETY_BRAKE_UPTIME_WINDOW`] — the Exception Handler disables
    /// further reporting entirely when this holds.
    pub fn should_trip_safety_brake(&self, uptime_ms: i64) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.startup_crash_count >= SAFETY_BRAKE_CRASH_THRESHOLD
            && uptime_ms < SAFETY_BRAKE_UPTIME_WINDOW.as_millis() as i64
    }

    fn persist(&self, state: &State) -> Result<()> {
        persist(&self.path, state)
    }
}

fn load_or_default(path: &Path) -> State {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => State::default(),
    }
}

fn persist(path: &Path, state: &State) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating startup state directory {parent:?}"))?;
    }
    let json = serde_json::to_string(state).context("serializing startup state")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("writing temp startup state file {tmp_path:?}"))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming startup state into place at {path:?}"))?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_not_crashed_on_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detector = StartupLoopDetector::new(dir.path()).expect("new");
        assert!(!detector.did_crash_on_startup());
    }

    #[test]
    fn unfinished_startup_is_detected_on_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let detector = StartupLoopDetector::new(dir.path()).expect("new");
            detector.mark_started().expect("mark_started");
        }
        let reloaded = StartupLoopDetector::new(dir.path()).expect("reload");
        assert!(reloaded.did_crash_on_startup());
    }

    #[test]
    fn mark_initialized_clears_the_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let detector = StartupLoopDetector::new(dir.path()).expect("new");
            detector.mark_started().expect("mark_started");
            detector.mark_initialized().expect("mark_initialized");
        }
        let reloaded = StartupLoopDetector::new(dir.path()).expect("reload");
        assert!(!reloaded.did_crash_on_startup());
    }

    #[test]
    fn record_crash_counts_within_startup_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detector = StartupLoopDetector::new(dir.path()).expect("new");
        detector.mark_started().expect("mark_started");
        let count = detector.record_crash().expect("record_crash");
        assert_eq!(count, 1);
    }

    #[test]
    fn is_in_crash_loop_trips_at_threshold() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detector = StartupLoopDetector::new(dir.path()).expect("new");
        detector.mark_started().expect("mark_started");
        for _ in 0..3 {
            detector.record_crash().expect("record_crash");
        }
        assert!(detector.is_in_crash_loop());
    }

    #[test]
    fn safety_brake_requires_both_count_and_uptime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detector = StartupLoopDetector::new(dir.path()).expect("new");
        detector.mark_started().expect("mark_started");
        for _ in 0..5 {
            detector.record_crash().expect("record_crash");
        }
        assert!(detector.should_trip_safety_brake(1_000));
        assert!(!detector.should_trip_safety_brake(120_000));
    }
}
