// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Constants shared across the crash-reporting pipeline: persisted file
//! names, the native-crash trailer schema markers, and the small set of
//! timing/size constants the rest of the crate is built against.
//!
//! Keeping these in one place means the on-disk layout and the trailer-file
//! schema each have a single source of truth that the rest of the crate
//! imports rather than re-deriving.

use std::time::Duration;

// --- Persisted state layout, relative to the app's private directory ---

/// Directory holding crash payloads awaiting delivery.
pub const PENDING_DIR: &str = "crashes/pending";
/// Directory holding delivered crash payloads, retained for a bounded window.
pub const SENT_DIR: &str = "crashes/sent";
/// Single-file native-crash trailer written by the signal handler.
pub const NATIVE_CRASH_TRAILER_FILE: &str = "crashes/native_crash.txt";
/// Fingerprint store file, relative to the cache directory (not the private directory).
pub const FINGERPRINT_STORE_FILE: &str = "crash_fingerprints.json";
/// Startup/loop detector key-value file, relative to the private directory.
pub const STARTUP_STATE_FILE: &str = "crash_startup_state.json";

// --- Native-crash trailer schema ---
//
// The signal handler writes exactly these section headers, in this order,
// using only async-signal-safe `write()` calls. The Orchestrator parses the
// same markers back out on the next session.

pub const TRAILER_HEADER: &str = "NATIVE CRASH TRAILER v1";
pub const TRAILER_BEGIN_REGISTERS: &str = "REGISTERS:";
pub const TRAILER_BEGIN_STACKTRACE: &str = "STACK TRACE:";
pub const TRAILER_BEGIN_MEMORY_DUMP: &str = "MEMORY DUMP:";

// --- Size bounds ---

pub const BREADCRUMB_RING_CAPACITY: usize = 100;
pub const MAX_OUTGOING_BREADCRUMBS: usize = 20;
pub const MAX_OUTGOING_STACK_LINES: usize = 100;
pub const MAX_OUTGOING_THREADS: usize = 5;
pub const MAX_MEMORY_EVENTS: usize = 10;
pub const MAX_CUSTOM_DATA_KEYS: usize = 20;
pub const MAX_STRING_LEN: usize = 4000;
pub const MAX_MEMORY_DUMP_CHARS: usize = 1000;
pub const NATIVE_STACK_FRAME_LIMIT: usize = 128;
pub const NATIVE_MEMORY_DUMP_RADIUS: usize = 256;
pub const RECENT_LOG_TAIL_CAPACITY: usize = 50;

// --- Timing constants ---

pub const FINGERPRINT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const SENT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const STARTUP_CRASH_WINDOW: Duration = Duration::from_secs(5);
pub const CRASH_LOOP_WINDOW: Duration = Duration::from_secs(60);
pub const CRASH_LOOP_THRESHOLD: u32 = 3;
pub const SAFETY_BRAKE_CRASH_THRESHOLD: u32 = 5;
pub const SAFETY_BRAKE_UPTIME_WINDOW: Duration = Duration::from_secs(60);

pub const ANR_NORMAL_THRESHOLD: Duration = Duration::from_secs(15);
pub const ANR_ADJUSTED_THRESHOLD: Duration = Duration::from_secs(20);
pub const ANR_WATCHDOG_NORMAL_SLEEP: Duration = Duration::from_secs(15);
pub const ANR_WATCHDOG_ADJUSTED_SLEEP: Duration = Duration::from_secs(20);
pub const ANR_REPORT_COOLDOWN: Duration = Duration::from_secs(30);
pub const ANR_NETWORK_LOSS_WINDOW: Duration = Duration::from_secs(30);
pub const ANR_MIN_THRESHOLD_WARN: Duration = Duration::from_secs(1);

pub const DEFAULT_SAMPLE_RATE: f64 = 0.15;
pub const SENDER_BATCH_CAPACITY: usize = 100;
pub const SENDER_FLUSH_SIZE: usize = 10;
pub const SENDER_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const SENDER_RETRY_BACKOFFS_MS: [u64; 3] = [5_000, 10_000, 20_000];
pub const SENDER_RETRY_BACKOFF_CAP_MS: u64 = 60_000;
pub const SENDER_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_PER_MINUTE: u32 = 10;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const INGEST_PATH: &str = "/api/crashes";
pub const USER_AGENT: &str = concat!("crashtracker-core/", env!("CARGO_PKG_VERSION"));
