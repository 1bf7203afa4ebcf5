// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Exception Handler: assembles a complete `CrashRecord` from an unhandled
//! managed exception (either a native Rust panic on any worker thread, or
//! an exception a host-language bridge reports via
//! [`ExceptionHandler::handle_managed_exception`]), persists it
//! synchronously, and attempts an immediate best-effort send.
//!
//! Capturing "every other live worker thread's stack" (`spec.md` §4.7 step
//! 3) requires a platform facility this crate deliberately treats as an
//! external collaborator (`spec.md` §1's "the foreign-function bridge to the
//! embedding runtime" is explicitly out of scope): a managed runtime such as
//! the JVM or a Swift/ObjC bridge can enumerate and suspend other threads,
//! a bare Rust process cannot do so safely on stable without the same kind
//! of signal-based suspension the native handler already uses for the whole
//! process. [`ThreadRegistry`] therefore records *names* of threads that
//! opt in via [`ThreadRegistry::register_current_thread`], and the handler
//! reports those with a placeholder trace; only the panicking/reporting
//! thread gets a real captured backtrace.

use crate::breadcrumbs::BreadcrumbRing;
use crate::crash_info::{
    CrashRecord, DeviceStateSnapshot, ExceptionKind, MemoryInfo, NetworkSnapshot, ProcessInfo,
    ThreadSnapshot,
};
use crate::crash_store::CrashStore;
use crate::device_state::DeviceStateOracle;
use crate::grouping::{self};
use crate::operation_tracker::OperationTracker;
use crate::sender::Sender;
use crate::shared::app_info::AppInfo;
use crate::shared::constants::RECENT_LOG_TAIL_CAPACITY;
use crate::startup_loop::StartupLoopDetector;
use crate::trackers::{MemoryTracker, NetworkTracker};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::PanicHookInfo;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Registry of worker-thread names that have opted in to being listed
/// alongside the crashing thread. Cheap, `Send + Sync`, no unwinding of
/// threads that haven't registered themselves.
#[derive(Default)]
pub struct ThreadRegistry {
    names: Mutex<HashSet<String>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the calling thread's current name (or a numeric fallback)
    /// so it shows up in the `threads` list of any subsequent crash record.
    pub fn register_current_thread(&self) {
        let name = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("thread-{:?}", std::thread::current().id()));
        self.names.lock().unwrap_or_else(|e| e.into_inner()).insert(name);
    }

    pub fn unregister_current_thread(&self) {
        if let Some(name) = std::thread::current().name() {
            self.names.lock().unwrap_or_else(|e| e.into_inner()).remove(name);
        }
    }

    pub(crate) fn snapshot_others(&self, exclude: &str) -> Vec<ThreadSnapshot> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|name| name.as_str() != exclude)
            .map(|name| ThreadSnapshot {
                name: name.clone(),
                crashed: false,
                stack_trace: "<live stack unavailable without a platform thread-suspend bridge>"
                    .to_string(),
            })
            .collect()
    }
}

/// Bounded tail of recent log lines, folded into `CrashRecord::recent_log_tail`.
#[derive(Default)]
pub struct RecentLogTail {
    lines: Mutex<VecDeque<String>>,
}

impl RecentLogTail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() >= RECENT_LOG_TAIL_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect()
    }
}

/// Everything the Exception Handler needs to assemble, persist, and send a
/// `CrashRecord`, collected behind one `Arc` so it can be shared between the
/// Orchestrator (normal operation), the panic hook (statically reachable
/// global), and `handle_managed_exception` (bridge callers).
pub struct ExceptionHandler {
    app_info: AppInfo,
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
    cache_dir: std::path::PathBuf,
}

#[allow(clippy::too_many_arguments)]
impl ExceptionHandler {
    pub fn new(
        app_info: AppInfo,
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
        cache_dir: std::path::PathBuf,
    ) -> Self {
        Self {
            app_info,
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
            cache_dir,
        }
    }

    /// Entry point for a host-language bridge reporting an exception it
    /// caught on its own side (`spec.md` §6's `handle_managed_exception`).
    /// Also the path a native Rust panic hook funnels into.
    ///
    /// Returns the persisted, optimized `CrashRecord` on success, or `None`
    /// if the safety brake tripped (no record is built or persisted in that
    /// case — `spec.md` §4.5).
    pub fn handle_managed_exception(
        &self,
        kind: ExceptionKind,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
        thread_name: impl Into<String>,
        fatal: bool,
        custom_data: HashMap<String, String>,
    ) -> Option<CrashRecord> {
        // Step 1: record_crash() on the Startup/Loop Detector.
        if let Err(e) = self.startup_loop.record_crash() {
            tracing::warn!(error = %e, "failed to record crash against the startup/loop detector");
        }

        // Step 2: safety brake.
        let uptime_ms = self.oracle.uptime_ms();
        if self.startup_loop.should_trip_safety_brake(uptime_ms) {
            tracing::error!(
                uptime_ms,
                "crash-loop safety brake tripped; disabling reporting for this session"
            );
            return None;
        }

        let thread_name = thread_name.into();
        let stack_trace = stack_trace.into();
        let is_startup_crash = self.startup_loop.did_crash_on_startup();
        let is_crash_loop = self.startup_loop.is_in_crash_loop();

        // Step 3 & 4: build the record from every live collaborator.
        let mut record = self.build_record(
            kind,
            message.into(),
            stack_trace,
            thread_name,
            fatal,
            custom_data,
            is_startup_crash,
            is_crash_loop,
        );

        // Step 5: Grouping computes fingerprint, title, severity.
        let crashed_on_ui_thread = record.thread_name == "main";
        record.fingerprint = grouping::compute_fingerprint(&record);
        record.issue_title = grouping::compute_issue_title(&record);
        record.severity = grouping::compute_severity(&record, crashed_on_ui_thread, false);
        record.fatal = grouping::is_fatal(&record, crashed_on_ui_thread, false);

        // Step 6: persist synchronously before returning.
        if let Err(e) = self.crash_store.save(&record) {
            tracing::error!(error = %e, uuid = %record.uuid, "failed to persist crash record");
        }

        // Step 7: best-effort immediate send, non-blocking on the result.
        self.sender.process(record.clone(), record.fatal);

        Some(record)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        kind: ExceptionKind,
        message: String,
        stack_trace: String,
        thread_name: String,
        fatal: bool,
        mut custom_data: HashMap<String, String>,
        is_startup_crash: bool,
        is_crash_loop: bool,
    ) -> CrashRecord {
        custom_data.extend(self.operation_tracker.as_custom_data());

        let device_state = DeviceStateSnapshot {
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
                crate::crash_info::MemoryPressure::High | crate::crash_info::MemoryPressure::Critical
            ),
        };

        let network = NetworkSnapshot {
            connected: self.network_tracker.connected(),
            vpn_active: self.oracle.vpn_active(),
            proxy_active: self.oracle.proxy_active(),
            recent_transitions: self.network_tracker.recent_transitions(),
        };

        let mut threads = vec![ThreadSnapshot {
            name: thread_name.clone(),
            crashed: true,
            stack_trace: stack_trace.clone(),
        }];
        threads.extend(self.thread_registry.snapshot_others(&thread_name));

        CrashRecord {
            schema_version: crate::crash_info::current_schema_version().to_string(),
            uuid: Uuid::new_v4(),
            timestamp_ms: now_ms(),
            exception_kind: kind,
            message,
            stack_trace,
            thread_name,
            device: crate::device_state::system_device_snapshot(),
            app: self.app_info.to_snapshot(),
            device_state,
            network,
            memory: MemoryInfo {
                heap_used_bytes: 0,
                heap_max_bytes: 0,
                native_heap_used_bytes: 0,
                native_heap_max_bytes: 0,
            },
            cpu: crate::crash_info::CpuInfo {
                core_count: std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1),
                app_cpu_usage_percent: 0.0,
            },
            process: ProcessInfo {
                pid: std::process::id(),
                name: self.app_info.package_id.clone(),
                importance: self.oracle.process_importance(),
                foreground: matches!(
                    self.oracle.process_importance(),
                    crate::crash_info::ProcessImportance::Foreground
                ),
            },
            threads,
            breadcrumbs: self.breadcrumbs.snapshot(),
            memory_events: self.memory_tracker.snapshot(),
            custom_data,
            environment: self.breadcrumbs.environment(),
            fingerprint: String::new(),
            issue_title: String::new(),
            severity: crate::crash_info::Severity::Medium,
            fatal,
            is_anr: false,
            anr_duration_ms: None,
            anr_validation: None,
            is_startup_crash,
            is_crash_loop,
            crash_loop_count: 0,
            native: None,
            recent_log_tail: self.recent_log_tail.snapshot(),
        }
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// --- Panic hook integration ---
//
// Mirrors the teacher's `register_panic_hook`/`PREVIOUS_PANIC_HOOK` pattern
// (`datadog-crashtracker`'s `collector::crash_handler`): the previous hook
// is stashed behind an `AtomicPtr` so it can be chained after our own
// reporting runs, and installing twice is a no-op.

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync>;
static PREVIOUS_PANIC_HOOK: AtomicPtr<PanicHook> = AtomicPtr::new(ptr::null_mut());
static HANDLER: AtomicPtr<ExceptionHandler> = AtomicPtr::new(ptr::null_mut());

/// Installs a `std::panic::set_hook` that funnels any Rust panic on any
/// thread through [`ExceptionHandler::handle_managed_exception`], then
/// chains to whatever hook was previously installed (`spec.md` §4.7 step 8).
/// Idempotent: a second call while already installed is a no-op.
pub fn install(handler: Arc<ExceptionHandler>) {
    if !HANDLER.load(SeqCst).is_null() {
        return;
    }
    let handler_ptr = Arc::into_raw(handler) as *mut ExceptionHandler;
    HANDLER.store(handler_ptr, SeqCst);

    let old_hook = std::panic::take_hook();
    let old_hook_ptr = Box::into_raw(Box::new(old_hook));
    PREVIOUS_PANIC_HOOK.store(old_hook_ptr, SeqCst);

    std::panic::set_hook(Box::new(|info| {
        let handler_ptr = HANDLER.load(SeqCst);
        if !handler_ptr.is_null() {
            // SAFETY: only ever populated from `Arc::into_raw` in `install`,
            // and not cleared until `uninstall` (which panics-in-flight
            // cannot race with, since uninstall is an ordinary call).
            let handler = unsafe { &*handler_ptr };
            let message = panic_message(info);
            let thread_name = std::thread::current()
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            let stack_trace = format!("{}", std::backtrace::Backtrace::force_capture());
            handler.handle_managed_exception(
                ExceptionKind::UnhandledException,
                message,
                stack_trace,
                thread_name,
                true,
                HashMap::new(),
            );
        }
        call_previous_hook(info);
    }));
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    match info.location() {
        Some(loc) => format!("{payload} ({}:{}:{})", loc.file(), loc.line(), loc.column()),
        None => payload,
    }
}

fn call_previous_hook(info: &PanicHookInfo<'_>) {
    let old_hook_ptr = PREVIOUS_PANIC_HOOK.load(SeqCst);
    if !old_hook_ptr.is_null() {
        // SAFETY: only ever populated from `Box::into_raw` in `install`.
        let old_hook = unsafe { &*old_hook_ptr };
        old_hook(info);
    }
}

/// Restores the previously installed panic hook and clears the stashed
/// handler. Not safe to call concurrently with an in-flight panic.
pub fn uninstall() {
    let handler_ptr = HANDLER.swap(ptr::null_mut(), SeqCst);
    if !handler_ptr.is_null() {
        // SAFETY: this can only come from `Arc::into_raw` in `install`.
        unsafe { drop(Arc::from_raw(handler_ptr)) };
    }

    let old_hook_ptr = PREVIOUS_PANIC_HOOK.swap(ptr::null_mut(), SeqCst);
    if !old_hook_ptr.is_null() {
        // SAFETY: this can only come from `Box::into_raw` in `install`.
        let old_hook = unsafe { Box::from_raw(old_hook_ptr) };
        std::panic::set_hook(old_hook);
    } else {
        let _ = std::panic::take_hook();
    }
}

pub fn is_installed() -> bool {
    !HANDLER.load(SeqCst).is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::SystemDeviceStateOracle;
    use crate::fingerprint_store::FingerprintStore;
    use crate::shared::configuration::CrashReporterConfiguration;

    fn test_handler(dir: &std::path::Path) -> (Arc<ExceptionHandler>, crate::sender::WorkerGuard) {
        let crash_store = Arc::new(CrashStore::new(dir).unwrap());
        let fingerprint_store = Arc::new(FingerprintStore::new(dir).unwrap());
        let config = CrashReporterConfiguration::new("https://example.invalid").unwrap();
        let (sender, guard) = Sender::new(config, crash_store.clone(), fingerprint_store).unwrap();
        let startup_loop = Arc::new(StartupLoopDetector::new(dir).unwrap());
        startup_loop.mark_started().unwrap();

        let app_info = AppInfo {
            package_id: "com.example.app".to_string(),
            version_name: "1.0.0".to_string(),
            version_code: 1,
            first_install_time_ms: None,
            last_update_time_ms: None,
        };

        let handler = Arc::new(ExceptionHandler::new(
            app_info,
            Arc::new(SystemDeviceStateOracle::new()),
            Arc::new(BreadcrumbRing::new()),
            Arc::new(MemoryTracker::new()),
            Arc::new(NetworkTracker::new()),
            Arc::new(OperationTracker::new()),
            Arc::new(ThreadRegistry::new()),
            Arc::new(RecentLogTail::new()),
            crash_store,
            startup_loop,
            sender,
            dir.to_path_buf(),
        ));
        (handler, guard)
    }

    #[test]
    fn handles_exception_and_persists_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _guard) = test_handler(dir.path());

        let record = handler
            .handle_managed_exception(
                ExceptionKind::UnhandledException,
                "NullPointerException: oops",
                "com.example.Foo.bar(Foo.kt:1)",
                "main",
                true,
                HashMap::new(),
            )
            .expect("not brake-tripped");

        assert_eq!(record.severity, crate::crash_info::Severity::Critical);
        assert!(handler.crash_store.load(&record.uuid).unwrap().is_some());
    }

    #[test]
    fn safety_brake_suppresses_the_record_after_repeated_early_crashes() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _guard) = test_handler(dir.path());

        for _ in 0..4 {
            handler.handle_managed_exception(
                ExceptionKind::UnhandledException,
                "boom",
                "trace",
                "main",
                true,
                HashMap::new(),
            );
        }
        let tripped = handler.handle_managed_exception(
            ExceptionKind::UnhandledException,
            "boom again",
            "trace",
            "main",
            true,
            HashMap::new(),
        );
        assert!(tripped.is_none());
    }

    #[test]
    fn thread_registry_excludes_the_crashing_thread_by_name() {
        let registry = Arc::new(ThreadRegistry::new());
        let worker_registry = registry.clone();
        std::thread::Builder::new()
            .name("worker-1".to_string())
            .spawn(move || worker_registry.register_current_thread())
            .unwrap()
            .join()
            .unwrap();
        let others = registry.snapshot_others("main");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].name, "worker-1");
    }

    #[test]
    fn panic_hook_install_uninstall_round_trip() {
        uninstall();
        assert!(!is_installed());
        let dir = tempfile::tempdir().unwrap();
        let (handler, _guard) = test_handler(dir.path());
        install(handler);
        assert!(is_installed());
        uninstall();
        assert!(!is_installed());
    }
}
