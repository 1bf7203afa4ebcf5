// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator: wires every other component together, owns the process-wide
//! lifecycle, and is the crate's single embedding surface.
//!
//! `CrashReporter` is the explicit capability object `spec.md` §9 asks for in
//! place of the source's ambient globals — every other module in this crate
//! is handed to it as an owned or `Arc`-shared collaborator, not reached for
//! through a global. The free functions below exist alongside it only
//! because `spec.md` §6 describes a host calling bare functions
//! (`initialize`, `mark_app_initialized`, ...); they are a thin, optional
//! convenience layer over a single hidden `Arc<CrashReporter>`, mirroring how
//! `datadog-crashtracker`'s `collector::api` exposes free functions
//! (`init`/`reconfigure`/`on_fork`) against its own hidden
//! `AtomicPtr`-backed global state. A host that wants more than one
//! `CrashReporter` (e.g. a test harness) should hold the `Arc<CrashReporter>`
//! `initialize` returns and call methods on it directly instead.

use crate::anr::validation::validate_on_error;
use crate::anr::watchdog::{ImmediateProber, UiThreadProber};
use crate::anr::{validate, AnrEvent, AnrWatchdog, ValidationInput, WatchdogState};
use crate::breadcrumbs::BreadcrumbRing;
use crate::crash_info::{
    self, CpuInfo, CrashRecord, DeviceStateSnapshot, ExceptionKind, MemoryInfo, MemoryPressure,
    NetworkSnapshot, ProcessImportance, ProcessInfo, Severity, ThreadSnapshot,
};
use crate::crash_store::CrashStore;
use crate::device_state::{self, DeviceStateOracle, SystemDeviceStateOracle};
use crate::exception_handler::{self, ExceptionHandler, RecentLogTail, ThreadRegistry};
use crate::fingerprint_store::FingerprintStore;
use crate::grouping;
use crate::native::{self, parser::ParsedNativeCrash, NativeCrashType};
use crate::operation_tracker::OperationTracker;
use crate::sender::{Sender, WorkerGuard};
use crate::shared::configuration::CrashReporterConfiguration;
use crate::shared::constants::{ANR_NETWORK_LOSS_WINDOW, ANR_REPORT_COOLDOWN, NATIVE_CRASH_TRAILER_FILE};
use crate::shared::AppInfo;
use crate::startup_loop::StartupLoopDetector;
use crate::trackers::{MemoryTracker, NetworkTracker};
use std::collections::HashMap;
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering::SeqCst};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Everything a host must supply once at startup that this crate has no way
/// to derive itself: the two directories it is allowed to write under, and
/// the static app identity folded into every `CrashRecord`.
#[derive(Debug, Clone)]
pub struct CrashReporterContext {
    /// App-private, non-world-readable directory. Backs the Crash Store's
    /// `crashes/pending` and `crashes/sent`, the native-crash trailer, and
    /// the Startup/Loop Detector's state file.
    pub private_dir: PathBuf,
    /// App cache directory (may be cleared by the OS under pressure). Backs
    /// only the Fingerprint Store — losing it early just means a duplicate
    /// crash gets reported again, not data loss.
    pub cache_dir: PathBuf,
    pub app_info: AppInfo,
}

impl CrashReporterContext {
    pub fn new(
        private_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        app_info: AppInfo,
    ) -> Self {
        Self {
            private_dir: private_dir.into(),
            cache_dir: cache_dir.into(),
            app_info,
        }
    }
}

/// The crash reporter instance. Constructed once via [`CrashReporter::initialize`]
/// and shared via `Arc` between the host, the panic hook, and the ANR
/// watchdog's callback.
pub struct CrashReporter {
    context: CrashReporterContext,
    config: Mutex<CrashReporterConfiguration>,
    oracle: Arc<dyn DeviceStateOracle>,
    breadcrumbs: Arc<BreadcrumbRing>,
    memory_tracker: Arc<MemoryTracker>,
    network_tracker: Arc<NetworkTracker>,
    operation_tracker: Arc<OperationTracker>,
    thread_registry: Arc<ThreadRegistry>,
    recent_log_tail: Arc<RecentLogTail>,
    crash_store: Arc<CrashStore>,
    startup_loop: Arc<StartupLoopDetector>,
    sender: Sender,
    worker_guard: WorkerGuard,
    exception_handler: Arc<ExceptionHandler>,
    watchdog: Mutex<Option<AnrWatchdog>>,
    weak_self: Mutex<Weak<CrashReporter>>,
    initialized: AtomicBool,
}

impl CrashReporter {
    /// Runs the eight-step bring-up sequence from `spec.md` §4.12. Not
    /// idempotent itself — call the module-level [`initialize`] free
    /// function (or hold the returned `Arc` yourself) if you need "calling
    /// twice is a no-op" semantics.
    pub fn initialize(
        context: CrashReporterContext,
        config: CrashReporterConfiguration,
    ) -> anyhow::Result<Arc<Self>> {
        // Step 1: instantiate Crash Store, Device State Oracle,
        // Startup/Loop Detector, Fingerprint Store.
        let crash_store = Arc::new(CrashStore::new(&context.private_dir)?);
        let oracle: Arc<dyn DeviceStateOracle> = Arc::new(SystemDeviceStateOracle::new());
        let startup_loop = Arc::new(StartupLoopDetector::new(&context.private_dir)?);
        let fingerprint_store = Arc::new(FingerprintStore::new(&context.cache_dir)?);

        // Step 2: log startup-crash / crash-loop detection for visibility.
        if startup_loop.did_crash_on_startup() {
            tracing::warn!("previous session did not reach mark_app_initialized before exiting");
        }
        if startup_loop.is_in_crash_loop() {
            tracing::error!("app appears to be in a startup crash loop");
        }

        // Step 3: mark started, initialize memory and network trackers.
        startup_loop.mark_started()?;
        let memory_tracker = Arc::new(MemoryTracker::new());
        let network_tracker = Arc::new(NetworkTracker::new());
        let breadcrumbs = Arc::new(BreadcrumbRing::new());
        let operation_tracker = Arc::new(OperationTracker::new());
        let thread_registry = Arc::new(ThreadRegistry::new());
        let recent_log_tail = Arc::new(RecentLogTail::new());

        let (sender, worker_guard) =
            Sender::new(config.clone(), crash_store.clone(), fingerprint_store)?;

        let exception_handler = Arc::new(ExceptionHandler::new(
            context.app_info.clone(),
            oracle.clone(),
            breadcrumbs.clone(),
            memory_tracker.clone(),
            network_tracker.clone(),
            operation_tracker.clone(),
            thread_registry.clone(),
            recent_log_tail.clone(),
            crash_store.clone(),
            startup_loop.clone(),
            sender.clone(),
            context.cache_dir.clone(),
        ));

        // Step 4: install Exception Handler and Native Signal Handler.
        exception_handler::install(exception_handler.clone());
        thread_registry.register_current_thread();

        if config.enable_native_signal_handler {
            let trailer_path = context.private_dir.join(NATIVE_CRASH_TRAILER_FILE);
            if let Err(e) = native::install(&trailer_path, &config.native_signals, config.use_alt_stack) {
                tracing::warn!(error = %e, "failed to install the native signal handler");
            }
        }

        let reporter = Arc::new(Self {
            context,
            config: Mutex::new(config.clone()),
            oracle,
            breadcrumbs,
            memory_tracker,
            network_tracker,
            operation_tracker,
            thread_registry,
            recent_log_tail,
            crash_store,
            startup_loop,
            sender,
            worker_guard,
            exception_handler,
            watchdog: Mutex::new(None),
            weak_self: Mutex::new(Weak::new()),
            initialized: AtomicBool::new(true),
        });
        *reporter.weak_self.lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(&reporter);

        // Step 5: reprocess a native-crash trailer left by the previous session.
        reporter.reprocess_native_trailer();

        // Step 6: call send_all_pending on the Sender.
        if let Err(e) = reporter.sender.send_all_pending(config.max_resend_per_minute) {
            tracing::warn!(error = %e, "send_all_pending failed during startup");
        }

        // Step 7: if enabled, build the Validation Engine and start the watchdog.
        if config.enable_anr_detection {
            Self::spawn_watchdog(&reporter);
        }

        // Step 8: a screen-state listener is exposed as `on_screen_state_changed`
        // below; registering it with the host platform is the embedder's job.
        // It is deliberately informational-only — see that method's doc comment.

        Ok(reporter)
    }

    /// Convenience constructor for a host that only wants to supply the
    /// endpoint and accept every other default, matching `spec.md` §6's
    /// `initialize(context, endpoint, enable_anr_detection=true)` (Rust has
    /// no default arguments, so the fully configurable path is
    /// [`CrashReporter::initialize`] and this is the common-case shortcut).
    pub fn initialize_default(
        context: CrashReporterContext,
        endpoint_base_url: impl Into<String>,
    ) -> anyhow::Result<Arc<Self>> {
        Self::initialize(context, CrashReporterConfiguration::new(endpoint_base_url)?)
    }

    fn reprocess_native_trailer(&self) {
        let trailer_path = self.context.private_dir.join(NATIVE_CRASH_TRAILER_FILE);
        let parsed = match native::parser::parse_trailer_file(&trailer_path) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read the native crash trailer");
                return;
            }
        };

        // No Exception Handler ran for a native crash (the signal killed the
        // process), so the loop detector never saw it; fold it in now.
        if let Err(e) = self.startup_loop.record_crash() {
            tracing::warn!(error = %e, "failed to record the native crash against the startup/loop detector");
        }
        let is_startup_crash = self.startup_loop.did_crash_on_startup();
        let is_crash_loop = self.startup_loop.is_in_crash_loop();

        if self.startup_loop.should_trip_safety_brake(self.oracle.uptime_ms()) {
            tracing::error!(
                "crash-loop safety brake tripped; discarding the reprocessed native crash trailer"
            );
            native::parser::delete_trailer_file(&trailer_path);
            return;
        }

        let mut record = self.build_native_crash_record(parsed, is_startup_crash, is_crash_loop);
        let crashed_on_ui_thread = record.thread_name == "main";
        record.fingerprint = grouping::compute_fingerprint(&record);
        record.issue_title = grouping::compute_issue_title(&record);
        record.severity = grouping::compute_severity(&record, crashed_on_ui_thread, false);
        record.fatal = grouping::is_fatal(&record, crashed_on_ui_thread, false);

        if let Err(e) = self.crash_store.save(&record) {
            tracing::error!(error = %e, uuid = %record.uuid, "failed to persist the reprocessed native crash record");
        }

        match self.sender.send(&record) {
            Ok(true) => native::parser::delete_trailer_file(&trailer_path),
            Ok(false) => {
                tracing::warn!("failed to send the reprocessed native crash; trailer kept for next session")
            }
            Err(e) => {
                tracing::warn!(error = %e, "error sending the reprocessed native crash; trailer kept for next session")
            }
        }
    }

    fn build_native_crash_record(
        &self,
        parsed: ParsedNativeCrash,
        is_startup_crash: bool,
        is_crash_loop: bool,
    ) -> CrashRecord {
        let thread_name = parsed.thread_name.clone();
        let stack_trace = if parsed.stack_lines.is_empty() {
            "<no stack trace captured>".to_string()
        } else {
            parsed.stack_lines.join("\n")
        };
        let message = format!(
            "{} at {}",
            parsed.signal_name,
            parsed.fault_address.clone().unwrap_or_else(|| "unknown address".to_string())
        );
        let native_info = parsed.into_native_crash_info();

        let mut threads = vec![ThreadSnapshot {
            name: thread_name.clone(),
            crashed: true,
            stack_trace: stack_trace.clone(),
        }];
        threads.extend(self.thread_registry.snapshot_others(&thread_name));

        CrashRecord {
            schema_version: crash_info::current_schema_version().to_string(),
            uuid: Uuid::new_v4(),
            timestamp_ms: now_ms(),
            exception_kind: ExceptionKind::NativeSignal,
            message,
            stack_trace,
            thread_name,
            device: device_state::system_device_snapshot(),
            app: self.context.app_info.to_snapshot(),
            device_state: self.device_state_snapshot(),
            network: self.network_snapshot(),
            memory: MemoryInfo {
                heap_used_bytes: 0,
                heap_max_bytes: 0,
                native_heap_used_bytes: 0,
                native_heap_max_bytes: 0,
            },
            cpu: self.cpu_info(),
            process: self.process_info(),
            threads,
            breadcrumbs: self.breadcrumbs.snapshot(),
            memory_events: self.memory_tracker.snapshot(),
            custom_data: self.operation_tracker.as_custom_data(),
            environment: self.breadcrumbs.environment(),
            fingerprint: String::new(),
            issue_title: String::new(),
            severity: Severity::Medium,
            fatal: true,
            is_anr: false,
            anr_duration_ms: None,
            anr_validation: None,
            is_startup_crash,
            is_crash_loop,
            crash_loop_count: 0,
            native: Some(native_info),
            recent_log_tail: self.recent_log_tail.snapshot(),
        }
    }

    fn spawn_watchdog(reporter: &Arc<Self>) {
        let weak = Arc::downgrade(reporter);
        let on_candidate: Arc<dyn Fn(AnrEvent) + Send + Sync> = Arc::new(move |event| {
            if let Some(reporter) = weak.upgrade() {
                reporter.handle_anr_event(event);
            }
        });
        let (normal, adjusted) = {
            let config = reporter.config.lock().unwrap_or_else(|e| e.into_inner());
            (config.anr_normal_threshold, config.anr_adjusted_threshold)
        };
        let prober: Arc<dyn UiThreadProber> = Arc::new(ImmediateProber);
        let watchdog = AnrWatchdog::start(
            reporter.oracle.clone(),
            prober,
            normal,
            adjusted,
            ANR_REPORT_COOLDOWN,
            on_candidate,
        );
        *reporter.watchdog.lock().unwrap_or_else(|e| e.into_inner()) = Some(watchdog);
    }

    /// `AnrWatchdog` has no live-reconfigure API: its sleep interval doubles
    /// as the block-duration threshold (see `anr::watchdog::run_loop`), so a
    /// changed threshold can only take effect by stopping the running
    /// watchdog and starting a fresh one against the new config.
    fn restart_watchdog_if_running(&self) {
        let was_running = {
            let guard = self.watchdog.lock().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().map(|w| w.state() != WatchdogState::Stopped).unwrap_or(false)
        };
        if !was_running {
            return;
        }
        if let Some(old) = self.watchdog.lock().unwrap_or_else(|e| e.into_inner()).take() {
            old.stop();
        }
        let weak_self = self.weak_self.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(reporter) = weak_self.upgrade() {
            Self::spawn_watchdog(&reporter);
        }
    }

    fn handle_anr_event(&self, event: AnrEvent) {
        let input = ValidationInput {
            blocked_duration_ms: event.blocked_duration_ms,
            captured_process_importance: event.captured_process_importance,
            captured_screen_on: event.captured_screen_on,
            time_since_network_loss: self.network_tracker.time_since_loss(),
        };
        let (normal, adjusted) = {
            let config = self.config.lock().unwrap_or_else(|e| e.into_inner());
            (config.anr_normal_threshold, config.anr_adjusted_threshold)
        };
        let oracle = self.oracle.clone();
        let validation = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            validate(&input, oracle.as_ref(), ANR_NETWORK_LOSS_WINDOW, normal, adjusted)
        }))
        .unwrap_or_else(|_| validate_on_error(&input));

        if !validation.valid {
            tracing::info!(
                reason = %validation.reason,
                confidence = validation.confidence,
                "ANR candidate rejected by the validation engine"
            );
            return;
        }

        let mut record = self.build_anr_record(event.blocked_duration_ms, validation);
        let crashed_on_ui_thread = true;
        record.fingerprint = grouping::compute_fingerprint(&record);
        record.issue_title = grouping::compute_issue_title(&record);
        record.severity = grouping::compute_severity(&record, crashed_on_ui_thread, false);
        record.fatal = grouping::is_fatal(&record, crashed_on_ui_thread, false);

        if let Err(e) = self.crash_store.save(&record) {
            tracing::error!(error = %e, uuid = %record.uuid, "failed to persist the ANR record");
        }
        self.sender.process(record.clone(), record.fatal);
    }

    fn build_anr_record(
        &self,
        blocked_duration_ms: u64,
        validation: crate::crash_info::AnrValidation,
    ) -> CrashRecord {
        let thread_name = "main".to_string();
        // No platform thread-suspend bridge is available to this crate; see
        // `exception_handler::ThreadRegistry`'s doc comment for why only
        // opted-in thread names, not live stacks, are available here.
        let stack_trace =
            "<live stack unavailable without a platform thread-suspend bridge>".to_string();
        let mut threads = vec![ThreadSnapshot {
            name: thread_name.clone(),
            crashed: true,
            stack_trace: stack_trace.clone(),
        }];
        threads.extend(self.thread_registry.snapshot_others(&thread_name));

        CrashRecord {
            schema_version: crash_info::current_schema_version().to_string(),
            uuid: Uuid::new_v4(),
            timestamp_ms: now_ms(),
            exception_kind: ExceptionKind::Anr,
            message: format!("ANR: UI thread blocked for {blocked_duration_ms}ms"),
            stack_trace,
            thread_name,
            device: device_state::system_device_snapshot(),
            app: self.context.app_info.to_snapshot(),
            device_state: self.device_state_snapshot(),
            network: self.network_snapshot(),
            memory: MemoryInfo {
                heap_used_bytes: 0,
                heap_max_bytes: 0,
                native_heap_used_bytes: 0,
                native_heap_max_bytes: 0,
            },
            cpu: self.cpu_info(),
            process: self.process_info(),
            threads,
            breadcrumbs: self.breadcrumbs.snapshot(),
            memory_events: self.memory_tracker.snapshot(),
            custom_data: self.operation_tracker.as_custom_data(),
            environment: self.breadcrumbs.environment(),
            fingerprint: String::new(),
            issue_title: String::new(),
            severity: Severity::Medium,
            fatal: false,
            is_anr: true,
            anr_duration_ms: Some(blocked_duration_ms),
            anr_validation: Some(validation),
            is_startup_crash: false,
            is_crash_loop: false,
            crash_loop_count: 0,
            native: None,
            recent_log_tail: self.recent_log_tail.snapshot(),
        }
    }

    fn device_state_snapshot(&self) -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            battery_fraction: self.oracle.battery_fraction(),
            charging: false,
            memory_available_bytes: 0,
            memory_total_bytes: 0,
            storage_available_bytes: 0,
            storage_total_bytes: 0,
            screen_on: self.oracle.screen_on(),
            orientation: self.oracle.orientation(),
            low_memory: matches!(
                self.oracle.memory_pressure(),
                MemoryPressure::High | MemoryPressure::Critical
            ),
        }
    }

    fn network_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            connected: self.network_tracker.connected(),
            vpn_active: self.oracle.vpn_active(),
            proxy_active: self.oracle.proxy_active(),
            recent_transitions: self.network_tracker.recent_transitions(),
        }
    }

    fn cpu_info(&self) -> CpuInfo {
        CpuInfo {
            core_count: std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1),
            app_cpu_usage_percent: 0.0,
        }
    }

    fn process_info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: std::process::id(),
            name: self.context.app_info.package_id.clone(),
            importance: self.oracle.process_importance(),
            foreground: matches!(self.oracle.process_importance(), ProcessImportance::Foreground),
        }
    }

    // --- Embedding surface (`spec.md` §6 / SPEC_FULL.md §4.13) ---
    //
    // Every method here wraps its body in `catch_unwind`, matching `spec.md`
    // §7's "Fatal-to-core: none" literally: a panic inside the reporter must
    // never propagate across this boundary into the host.

    /// Signals that critical app initialization has completed, clearing the
    /// Startup/Loop Detector's "crashed before finishing startup" flag for
    /// future sessions.
    pub fn mark_app_initialized(&self) {
        catch_unwind_logged("mark_app_initialized", || {
            if let Err(e) = self.startup_loop.mark_initialized() {
                tracing::warn!(error = %e, "failed to mark the app as initialized");
            }
        });
    }

    /// Sets the normal-power-state ANR threshold. Restarts the watchdog
    /// thread if one is currently running, since its sleep interval and the
    /// threshold it compares against are the same value.
    pub fn set_anr_threshold(&self, threshold_ms: u64) {
        catch_unwind_logged("set_anr_threshold", || {
            let threshold = Duration::from_millis(threshold_ms);
            {
                let mut config = self.config.lock().unwrap_or_else(|e| e.into_inner());
                config.set_anr_threshold(threshold);
            }
            self.restart_watchdog_if_running();
        });
    }

    pub fn pause_anr_detection(&self) {
        catch_unwind_logged("pause_anr_detection", || {
            if let Some(watchdog) = self.watchdog.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                watchdog.pause();
            }
        });
    }

    pub fn resume_anr_detection(&self) {
        catch_unwind_logged("resume_anr_detection", || {
            if let Some(watchdog) = self.watchdog.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                watchdog.resume();
            }
        });
    }

    /// Drains `pending/`, re-running every record through the Sender's
    /// dedup/sampling decision, and returns how many were processed.
    pub fn send_pending_crashes_now(&self) -> usize {
        catch_unwind_logged("send_pending_crashes_now", || {
            let max_per_minute = self.config.lock().unwrap_or_else(|e| e.into_inner()).max_resend_per_minute;
            match self.sender.send_all_pending(max_per_minute) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "send_pending_crashes_now failed");
                    0
                }
            }
        })
        .unwrap_or(0)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(SeqCst)
    }

    pub fn pending_crash_count(&self) -> usize {
        catch_unwind_logged("pending_crash_count", || match self.crash_store.list_pending() {
            Ok(ids) => ids.len(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pending crashes");
                0
            }
        })
        .unwrap_or(0)
    }

    /// Raises the signal for `kind` on the calling thread — for test
    /// harnesses that want to exercise the native crash path end-to-end.
    /// This deliberately terminates the process if the native handler is
    /// installed and does its job; it is not a simulation.
    pub fn trigger_native_crash(&self, kind: u8) {
        catch_unwind_logged("trigger_native_crash", || match NativeCrashType::from_test_harness_value(kind) {
            Some(t) => unsafe {
                libc::raise(t.signal());
            },
            None => tracing::warn!(kind, "trigger_native_crash: unrecognized test-harness value"),
        });
    }

    /// Entry point for a host-language bridge reporting an exception it
    /// caught on its own side. The thread name is derived from the calling
    /// thread since the embedding surface (`spec.md` §6) does not pass one.
    pub fn handle_managed_exception(
        &self,
        kind: ExceptionKind,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
        fatal: bool,
        custom_data: HashMap<String, String>,
    ) -> Option<CrashRecord> {
        let message = message.into();
        let stack_trace = stack_trace.into();
        let thread_name = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        catch_unwind_logged("handle_managed_exception", move || {
            self.exception_handler
                .handle_managed_exception(kind, message, stack_trace, thread_name, fatal, custom_data)
        })
        .flatten()
    }

    /// Informational-only screen-state hook. Per `spec.md` §4.12 step 8, this
    /// must never pause ANR detection: a real ANR can begin with the screen
    /// on and continue after it turns off, and only the Validation Engine
    /// (which reads the screen state captured *at detection time*) decides
    /// whether that is a false positive.
    pub fn on_screen_state_changed(&self, screen_on: bool) {
        catch_unwind_logged("on_screen_state_changed", || {
            tracing::debug!(screen_on, "screen state changed (informational only)");
        });
    }

    /// Registers the calling thread so its name (not a live stack — see
    /// `exception_handler::ThreadRegistry`) appears in future crash records
    /// built while it is alive.
    pub fn register_current_thread(&self) {
        self.thread_registry.register_current_thread();
    }

    pub fn unregister_current_thread(&self) {
        self.thread_registry.unregister_current_thread();
    }

    pub fn breadcrumbs(&self) -> &Arc<BreadcrumbRing> {
        &self.breadcrumbs
    }

    pub fn memory_tracker(&self) -> &Arc<MemoryTracker> {
        &self.memory_tracker
    }

    pub fn network_tracker(&self) -> &Arc<NetworkTracker> {
        &self.network_tracker
    }

    pub fn operation_tracker(&self) -> &Arc<OperationTracker> {
        &self.operation_tracker
    }

    /// Stops the watchdog, flushes and joins the Sender's worker thread,
    /// and uninstalls both handlers. Idempotent: calling it twice is a
    /// harmless no-op the second time.
    pub fn shutdown(&self) {
        catch_unwind_logged("shutdown", || {
            if !self.initialized.swap(false, SeqCst) {
                return;
            }
            if let Some(watchdog) = self.watchdog.lock().unwrap_or_else(|e| e.into_inner()).take() {
                watchdog.stop();
            }
            self.sender.flush_batch();
            self.worker_guard.shutdown();
            exception_handler::uninstall();
            if self.config.lock().unwrap_or_else(|e| e.into_inner()).enable_native_signal_handler {
                native::uninstall();
            }
            self.thread_registry.unregister_current_thread();
        });
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn catch_unwind_logged<T>(entry_point: &str, f: impl FnOnce() -> T) -> Option<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_payload_message(payload.as_ref());
            tracing::error!(
                entry_point,
                panic = %message,
                "panic caught at the crash reporter's public boundary; fatal-to-core: none"
            );
            None
        }
    }
}

fn panic_payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// --- Free-function embedding surface over hidden global state ---

static REPORTER: AtomicPtr<CrashReporter> = AtomicPtr::new(ptr::null_mut());

/// Clones the currently installed reporter, if any, without disturbing the
/// stored reference count.
fn current() -> Option<Arc<CrashReporter>> {
    let ptr = REPORTER.load(SeqCst);
    if ptr.is_null() {
        return None;
    }
    // SAFETY: `ptr` is only ever populated from `Arc::into_raw` in
    // `initialize`/`shutdown` below, and is never freed out from under a
    // live reporter except by `shutdown`, which takes ownership via `swap`.
    let borrowed = unsafe { Arc::from_raw(ptr) };
    let cloned = borrowed.clone();
    std::mem::forget(borrowed);
    Some(cloned)
}

/// Initializes the process-wide crash reporter. Calling this again replaces
/// the previous instance (its resources are dropped once the last `Arc`
/// clone goes away) rather than erroring, matching the teacher's `init`
/// being safe to call again after a `reconfigure`-shaped need.
pub fn initialize(
    context: CrashReporterContext,
    config: CrashReporterConfiguration,
) -> anyhow::Result<Arc<CrashReporter>> {
    let reporter = CrashReporter::initialize(context, config)?;
    let new_ptr = Arc::into_raw(reporter.clone()) as *mut CrashReporter;
    let old_ptr = REPORTER.swap(new_ptr, SeqCst);
    if !old_ptr.is_null() {
        // SAFETY: see `current`.
        unsafe { drop(Arc::from_raw(old_ptr)) };
    }
    Ok(reporter)
}

pub fn initialize_default(
    context: CrashReporterContext,
    endpoint_base_url: impl Into<String>,
) -> anyhow::Result<Arc<CrashReporter>> {
    initialize(context, CrashReporterConfiguration::new(endpoint_base_url)?)
}

pub fn mark_app_initialized() {
    if let Some(reporter) = current() {
        reporter.mark_app_initialized();
    }
}

pub fn set_anr_threshold(threshold_ms: u64) {
    if let Some(reporter) = current() {
        reporter.set_anr_threshold(threshold_ms);
    }
}

pub fn pause_anr_detection() {
    if let Some(reporter) = current() {
        reporter.pause_anr_detection();
    }
}

pub fn resume_anr_detection() {
    if let Some(reporter) = current() {
        reporter.resume_anr_detection();
    }
}

pub fn send_pending_crashes_now() -> usize {
    current().map(|r| r.send_pending_crashes_now()).unwrap_or(0)
}

pub fn is_initialized() -> bool {
    current().map(|r| r.is_initialized()).unwrap_or(false)
}

pub fn pending_crash_count() -> usize {
    current().map(|r| r.pending_crash_count()).unwrap_or(0)
}

pub fn trigger_native_crash(kind: u8) {
    if let Some(reporter) = current() {
        reporter.trigger_native_crash(kind);
    }
}

pub fn handle_managed_exception(
    kind: ExceptionKind,
    message: impl Into<String>,
    stack_trace: impl Into<String>,
    fatal: bool,
    custom_data: HashMap<String, String>,
) -> Option<CrashRecord> {
    current().and_then(|r| r.handle_managed_exception(kind, message, stack_trace, fatal, custom_data))
}

pub fn on_screen_state_changed(screen_on: bool) {
    if let Some(reporter) = current() {
        reporter.on_screen_state_changed(screen_on);
    }
}

/// Tears down and forgets the process-wide reporter. A no-op if none is
/// installed.
pub fn shutdown() {
    let old_ptr = REPORTER.swap(ptr::null_mut(), SeqCst);
    if !old_ptr.is_null() {
        // SAFETY: see `current`.
        let reporter = unsafe { Arc::from_raw(old_ptr) };
        reporter.shutdown();
    }
}
