// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! A crash-reporting core for mobile applications: capture, validation,
//! deduplication, durable persistence, and dispatch of crash events to a
//! remote ingestion endpoint.
//!
//! Architecturally, it consists of three kinds of collaborators wired
//! together by the [`orchestrator`]:
//! 1. Crash *sources* — the [`native`] signal handler, the [`exception_handler`]
//!    unhandled-exception hook, and the [`anr`] watchdog — each of which turns a
//!    fault into a [`crash_info::CrashRecord`].
//! 2. Crash *shaping* — [`grouping`] computes a fingerprint, title and
//!    severity, then shrinks and scrubs the record for transport.
//! 3. Crash *durability* — the [`crash_store`] persists records before any
//!    network attempt, the [`fingerprint_store`] remembers what has already
//!    been reported, and the [`sender`] retries with backoff until the
//!    ingestion endpoint acknowledges.
//!
//! The [`device_state`] oracle, [`breadcrumbs`] ring, [`trackers`] (memory
//! and network), [`operation_tracker`], and [`startup_loop`] detector are
//! read-mostly collaborators consulted while building a record.
//!
//! Safety note: the native signal-handler path (`native::signal_handler`) is
//! not ordinary Rust code — it runs in a fault context and is constrained to
//! async-signal-safe operations only. See its module documentation before
//! touching it.

pub mod anr;
pub mod breadcrumbs;
pub mod crash_info;
pub mod crash_store;
pub mod device_state;
pub mod exception_handler;
pub mod fingerprint_store;
pub mod grouping;
pub mod native;
pub mod operation_tracker;
pub mod orchestrator;
pub mod sender;
pub mod shared;
pub mod startup_loop;
pub mod trackers;

pub use crash_info::CrashRecord;
pub use orchestrator::{
    handle_managed_exception, initialize, initialize_default, is_initialized,
    mark_app_initialized, on_screen_state_changed, pause_anr_detection, pending_crash_count,
    resume_anr_detection, send_pending_crashes_now, set_anr_threshold, shutdown,
    trigger_native_crash, CrashReporter, CrashReporterContext,
};
pub use shared::configuration::CrashReporterConfiguration;
