// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Grouping & Cost Control: fingerprinting, severity/fatality assignment,
//! the sampling/dedup send decision, and payload optimization (shrinking +
//! scrubbing) applied to every outgoing `CrashRecord`.
//!
//! This module is pure over its inputs (plus, for the send decision, the
//! Fingerprint Store and an in-session dedup set) so every rule in
//! `spec.md` §4.10 is independently unit-testable.

mod optimize;
mod scrub;

pub use optimize::optimize_payload;
pub use scrub::scrub_string;

use crate::crash_info::{CrashRecord, ExceptionKind, Severity};
use crate::fingerprint_store::FingerprintStore;
use crate::shared::constants::DEFAULT_SAMPLE_RATE;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// Outcome of `Grouping::decide` — what the Sender should do with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum SendDecision {
    /// Fingerprint already reported (persistently or this session); bump an
    /// in-memory counter only, no payload leaves the process.
    IncrementOnly,
    /// Non-fatal, not a duplicate, sampled out by `sample_rate`.
    Skip,
    /// Fatal (or the Fingerprint Store has no record of it yet) — send now.
    SendImmediately,
    /// Non-fatal, not sampled out — batch it for the next flush.
    AddToBatch,
}

/// Computes the fingerprint for a record: SHA-256 over the exception kind
/// plus the top five stack frames (class+method, file:line stripped),
/// truncated to the leading 8 bytes and hex-encoded to 16 characters.
pub fn compute_fingerprint(record: &CrashRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.exception_kind.to_string().as_bytes());
    for frame in record.top_frames(5) {
        hasher.update(b"|");
        hasher.update(normalize_frame(frame).as_bytes());
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Strips a trailing `(file:line)` / `(file.kt:NN)` annotation, keeping the
/// class+method portion that identifies the call site independent of which
/// line it currently sits on.
fn normalize_frame(frame: &str) -> String {
    match frame.rfind('(') {
        Some(idx) => frame[..idx].trim_end().to_string(),
        None => frame.trim().to_string(),
    }
}

/// Builds the issue title: `"<TypeName> at <TopFrame>"`.
pub fn compute_issue_title(record: &CrashRecord) -> String {
    let top_frame = record
        .top_frames(1)
        .first()
        .map(|f| normalize_frame(f))
        .unwrap_or_else(|| "<unknown>".to_string());
    format!("{} at {}", record.exception_kind.type_name(), top_frame)
}

/// Families treated as "null-dereference-like or illegal-state" for the
/// `High` severity bucket. Matched case-insensitively against the message.
const HIGH_SEVERITY_MESSAGE_MARKERS: &[&str] = &[
    "nullpointerexception",
    "illegalstateexception",
    "indexoutofbounds",
    "npe:",
];

/// Assigns severity per `spec.md` §4.10. Does not look at `record.severity`
/// for anything other than the "already marked Critical" escalation rule —
/// everything else is derived fresh from the record's other fields.
pub fn compute_severity(
    record: &CrashRecord,
    crashed_on_ui_thread: bool,
    out_of_memory: bool,
) -> Severity {
    let message_lower = record.message.to_lowercase();
    let is_critical = crashed_on_ui_thread
        || matches!(record.exception_kind, ExceptionKind::NativeSignal)
        || out_of_memory
        || record.is_anr
        || record.native.is_some()
        || record.severity == Severity::Critical;

    if is_critical {
        return Severity::Critical;
    }

    let is_high = HIGH_SEVERITY_MESSAGE_MARKERS
        .iter()
        .any(|marker| message_lower.contains(marker));
    if is_high {
        return Severity::High;
    }

    Severity::Medium
}

/// A record is fatal if native, its signal name starts with `SIG`, it
/// crashed on the UI thread, it is an out-of-memory, an ANR, a startup
/// crash, or already `Critical`.
pub fn is_fatal(
    record: &CrashRecord,
    crashed_on_ui_thread: bool,
    out_of_memory: bool,
) -> bool {
    let native_sig_prefixed = record
        .native
        .as_ref()
        .map(|n| n.signal_name.starts_with("SIG"))
        .unwrap_or(false);
    matches!(record.exception_kind, ExceptionKind::NativeSignal)
        || native_sig_prefixed
        || crashed_on_ui_thread
        || out_of_memory
        || record.is_anr
        || record.is_startup_crash
        || record.severity == Severity::Critical
}

/// Tracks fingerprints reported during the current process lifetime, as a
/// cheap first check before consulting the (disk-backed) `FingerprintStore`.
#[derive(Default)]
pub struct SessionDedup {
    seen: Mutex<HashSet<String>>,
}

impl SessionDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this is the first time `fingerprint` has been seen
    /// this session, and records it as seen either way.
    fn mark_and_check_first(&self, fingerprint: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(fingerprint.to_string())
    }

    #[cfg(test)]
    fn contains(&self, fingerprint: &str) -> bool {
        self.seen.lock().unwrap().contains(fingerprint)
    }
}

/// Decides what the Sender should do with `record`, per `spec.md` §4.10's
/// four-step decision table. `sampler` is injected so tests can pin the RNG.
pub fn decide(
    record: &CrashRecord,
    fatal: bool,
    fingerprint_store: &FingerprintStore,
    session_dedup: &SessionDedup,
    sample_rate: f64,
    sampler: impl FnOnce() -> f64,
) -> SendDecision {
    let fp = &record.fingerprint;

    if fingerprint_store.was_recently_reported(fp) {
        return SendDecision::IncrementOnly;
    }

    let first_time_this_session = session_dedup.mark_and_check_first(fp);
    if !first_time_this_session {
        return SendDecision::IncrementOnly;
    }

    if !fatal && sampler() < (1.0 - sample_rate) {
        return SendDecision::Skip;
    }

    let _ = fingerprint_store.mark_as_reported(fp);
    if fatal {
        SendDecision::SendImmediately
    } else {
        SendDecision::AddToBatch
    }
}

/// Default sample rate (`0.15`) used when a caller doesn't override it via
/// `CrashReporterConfiguration`.
pub fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}
