// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Operation Tracker: a small piece of context a host can set before
//! starting a risky unit of work (e.g. "syncing_cart", "decoding_image_42")
//! so the Exception Handler can fold "what was the app doing" into a crash
//! record without the host having to thread that context through every
//! call site itself. Modeled as explicit state owned by the Orchestrator
//! rather than the source's ambient global, per `spec.md` §9.

use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct State {
    current_operation: Option<String>,
    last_successful: Option<String>,
    last_failed: Option<String>,
    last_failure_reason: Option<String>,
}

pub struct OperationTracker {
    state: Mutex<State>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn begin(&self, operation: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current_operation = Some(operation.into());
    }

    /// Marks the in-progress operation (if any) as successfully completed.
    pub fn mark_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_successful = state.current_operation.take();
    }

    pub fn mark_failure(&self, reason: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_failed = state.current_operation.take();
        state.last_failure_reason = Some(reason.into());
    }

    /// Renders the current context as `custom_data` entries for a
    /// `CrashRecord`. Keys prefixed `op.` so they sort together and don't
    /// collide with host-supplied custom data.
    pub fn as_custom_data(&self) -> std::collections::HashMap<String, String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = std::collections::HashMap::new();
        if let Some(op) = &state.current_operation {
            out.insert("op.current".to_string(), op.clone());
        }
        if let Some(op) = &state.last_successful {
            out.insert("op.last_successful".to_string(), op.clone());
        }
        if let Some(op) = &state.last_failed {
            out.insert("op.last_failed".to_string(), op.clone());
        }
        if let Some(reason) = &state.last_failure_reason {
            out.insert("op.last_failure_reason".to_string(), reason.clone());
        }
        out
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_then_success_clears_current_and_records_last_successful() {
        let tracker = OperationTracker::new();
        tracker.begin("sync_cart");
        tracker.mark_success();
        let data = tracker.as_custom_data();
        assert_eq!(data.get("op.last_successful").map(String::as_str), Some("sync_cart"));
        assert!(!data.contains_key("op.current"));
    }

    #[test]
    fn begin_then_failure_records_last_failed_and_reason() {
        let tracker = OperationTracker::new();
        tracker.begin("decode_image_42");
        tracker.mark_failure("corrupt header");
        let data = tracker.as_custom_data();
        assert_eq!(data.get("op.last_failed").map(String::as_str), Some("decode_image_42"));
        assert_eq!(
            data.get("op.last_failure_reason").map(String::as_str),
            Some("corrupt header")
        );
    }

    #[test]
    fn no_operation_yields_empty_context() {
        let tracker = OperationTracker::new();
        assert!(tracker.as_custom_data().is_empty());
    }
}
