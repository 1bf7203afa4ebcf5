// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! ANR Watchdog: a daemon thread that periodically checks whether the
//! UI-equivalent thread has serviced a ping recently, and hands a detected
//! block to a caller-supplied callback (the Orchestrator wires this to the
//! Validation Engine and the persist/send path).
//!
//! Abstracts "post a tiny task to the UI thread" behind [`UiThreadProber`]
//! per `spec.md` §9's "shared-thread dispatch" redesign note, so a host
//! without a single UI thread can substitute an equivalent liveness
//! primitive.

use crate::crash_info::ProcessImportance;
use crate::device_state::DeviceStateOracle;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Posts a task to whatever the host considers its "UI-equivalent" thread.
/// The default [`ImmediateProber`] runs tasks synchronously on the calling
/// (watchdog) thread — correct behavior for a host with no distinct UI
/// thread, and good enough for tests that don't simulate unresponsiveness.
pub trait UiThreadProber: Send + Sync {
    fn post(&self, task: Box<dyn FnOnce() + Send>);
}

pub struct ImmediateProber;

impl UiThreadProber for ImmediateProber {
    fn post(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// A detected, not-yet-validated block handed to the Orchestrator's ANR
/// path for validation and (if valid) persistence/send.
#[derive(Debug, Clone)]
pub struct AnrEvent {
    pub blocked_duration_ms: u64,
    pub captured_process_importance: ProcessImportance,
    pub captured_screen_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Running,
    Paused,
    Stopped,
}

impl WatchdogState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WatchdogState::Running,
            1 => WatchdogState::Paused,
            _ => WatchdogState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WatchdogState::Running => 0,
            WatchdogState::Paused => 1,
            WatchdogState::Stopped => 2,
        }
    }
}

struct Shared {
    last_ping: AtomicI64,
    state: AtomicU8,
    last_report: Mutex<Option<Instant>>,
}

/// Background daemon thread implementing the `Running`/`Paused`/`Stopped`
/// state machine from `spec.md` §4.8.
pub struct AnrWatchdog {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    poke: Arc<std::sync::Condvar>,
    poke_mutex: Arc<Mutex<()>>,
}

impl AnrWatchdog {
    pub fn state(&self) -> WatchdogState {
        WatchdogState::from_u8(self.shared.state.load(SeqCst))
    }

    /// Starts the watchdog thread. `oracle` supplies power-save/battery for
    /// the adjusted-sleep-interval decision; `prober` posts the ping task;
    /// `on_candidate` receives every threshold-exceeding block (already
    /// cooldown-gated) for the caller to validate and act on.
    pub fn start(
        oracle: Arc<dyn DeviceStateOracle>,
        prober: Arc<dyn UiThreadProber>,
        normal_sleep: Duration,
        adjusted_sleep: Duration,
        cooldown: Duration,
        on_candidate: Arc<dyn Fn(AnrEvent) + Send + Sync>,
    ) -> Self {
        let shared = Arc::new(Shared {
            last_ping: AtomicI64::new(now_ms()),
            state: AtomicU8::new(WatchdogState::Running.as_u8()),
            last_report: Mutex::new(None),
        });
        let poke_mutex = Arc::new(Mutex::new(()));
        let poke = Arc::new(std::sync::Condvar::new());

        let loop_shared = shared.clone();
        let loop_poke_mutex = poke_mutex.clone();
        let loop_poke = poke.clone();
        let handle = std::thread::Builder::new()
            .name("anr-watchdog".to_string())
            .spawn(move || {
                run_loop(
                    loop_shared,
                    oracle,
                    prober,
                    normal_sleep,
                    adjusted_sleep,
                    cooldown,
                    on_candidate,
                    loop_poke_mutex,
                    loop_poke,
                )
            })
            .expect("spawning the ANR watchdog thread");

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
            poke,
            poke_mutex,
        }
    }

    /// Cooperative pause for long operations: `last_ping` is frozen (not
    /// reset) until `resume` re-primes it, so a paused window never itself
    /// reads as a block.
    pub fn pause(&self) {
        self.shared.state.store(WatchdogState::Paused.as_u8(), SeqCst);
    }

    pub fn resume(&self) {
        self.shared.last_ping.store(now_ms(), SeqCst);
        self.shared.state.store(WatchdogState::Running.as_u8(), SeqCst);
        self.wake();
    }

    /// Stops the watchdog thread. Terminal: a stopped watchdog cannot be
    /// restarted, a fresh one must be constructed via `start`.
    pub fn stop(&self) {
        self.shared.state.store(WatchdogState::Stopped.as_u8(), SeqCst);
        self.wake();
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    fn wake(&self) {
        let _guard = self.poke_mutex.lock().unwrap_or_else(|e| e.into_inner());
        self.poke.notify_all();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    shared: Arc<Shared>,
    oracle: Arc<dyn DeviceStateOracle>,
    prober: Arc<dyn UiThreadProber>,
    normal_sleep: Duration,
    adjusted_sleep: Duration,
    cooldown: Duration,
    on_candidate: Arc<dyn Fn(AnrEvent) + Send + Sync>,
    poke_mutex: Arc<Mutex<()>>,
    poke: Arc<std::sync::Condvar>,
) {
    loop {
        if WatchdogState::from_u8(shared.state.load(SeqCst)) == WatchdogState::Stopped {
            return;
        }

        let adjusted = oracle.power_save() || oracle.battery_fraction() < 0.05;
        let sleep_for = if adjusted { adjusted_sleep } else { normal_sleep };

        {
            let guard = poke_mutex.lock().unwrap_or_else(|e| e.into_inner());
            let _ = poke.wait_timeout(guard, sleep_for).unwrap_or_else(|e| e.into_inner());
        }

        match WatchdogState::from_u8(shared.state.load(SeqCst)) {
            WatchdogState::Stopped => return,
            WatchdogState::Paused => continue,
            WatchdogState::Running => {}
        }

        let shared_for_ping = shared.clone();
        prober.post(Box::new(move || {
            shared_for_ping.last_ping.store(now_ms(), SeqCst);
        }));

        let last_ping = shared.last_ping.load(SeqCst);
        let now = now_ms();
        let blocked_ms = now.saturating_sub(last_ping).max(0) as u64;
        let threshold_ms = sleep_for.as_millis() as u64;
        if blocked_ms <= threshold_ms {
            continue;
        }

        let mut last_report = shared.last_report.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reported_at) = *last_report {
            if reported_at.elapsed() < cooldown {
                continue;
            }
        }

        let event = AnrEvent {
            blocked_duration_ms: blocked_ms,
            captured_process_importance: oracle.process_importance(),
            captured_screen_on: oracle.screen_on(),
        };
        *last_report = Some(Instant::now());
        drop(last_report);

        on_candidate(event);
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::SystemDeviceStateOracle;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn starts_in_running_state() {
        let oracle = Arc::new(SystemDeviceStateOracle::new());
        let prober = Arc::new(ImmediateProber);
        let watchdog = AnrWatchdog::start(
            oracle,
            prober,
            Duration::from_millis(50),
            Duration::from_millis(80),
            Duration::from_millis(20),
            Arc::new(|_| {}),
        );
        assert_eq!(watchdog.state(), WatchdogState::Running);
        watchdog.stop();
        assert_eq!(watchdog.state(), WatchdogState::Stopped);
    }

    #[test]
    fn pause_then_resume_transitions_correctly() {
        let oracle = Arc::new(SystemDeviceStateOracle::new());
        let prober = Arc::new(ImmediateProber);
        let watchdog = AnrWatchdog::start(
            oracle,
            prober,
            Duration::from_millis(50),
            Duration::from_millis(80),
            Duration::from_millis(20),
            Arc::new(|_| {}),
        );
        watchdog.pause();
        assert_eq!(watchdog.state(), WatchdogState::Paused);
        watchdog.resume();
        assert_eq!(watchdog.state(), WatchdogState::Running);
        watchdog.stop();
    }

    /// A prober that never calls back simulates a permanently blocked UI
    /// thread: `last_ping` is never refreshed so the watchdog should detect
    /// the block on its next wake.
    struct StuckProber;
    impl UiThreadProber for StuckProber {
        fn post(&self, _task: Box<dyn FnOnce() + Send>) {}
    }

    #[test]
    fn detects_a_stuck_ui_thread_and_reports_once() {
        let oracle = Arc::new(SystemDeviceStateOracle::new());
        let prober = Arc::new(StuckProber);
        let reports = Arc::new(AtomicUsize::new(0));
        let reports_clone = reports.clone();
        let watchdog = AnrWatchdog::start(
            oracle,
            prober,
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(500),
            Arc::new(move |_event| {
                reports_clone.fetch_add(1, SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(120));
        watchdog.stop();
        assert!(reports.load(SeqCst) >= 1);
    }

    #[test]
    fn cooldown_prevents_a_report_storm() {
        let oracle = Arc::new(SystemDeviceStateOracle::new());
        let prober = Arc::new(StuckProber);
        let reports = Arc::new(StdMutex::new(Vec::new()));
        let reports_clone = reports.clone();
        let watchdog = AnrWatchdog::start(
            oracle,
            prober,
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(1000),
            Arc::new(move |event| {
                reports_clone.lock().unwrap().push(event.blocked_duration_ms);
            }),
        );
        std::thread::sleep(Duration::from_millis(150));
        watchdog.stop();
        assert_eq!(reports.lock().unwrap().len(), 1);
    }
}
