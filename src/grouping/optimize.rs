// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Payload optimization: the deterministic shrink pass applied to every
//! outgoing `CrashRecord` (both on first send and on every resend attempt,
//! per `spec.md` §4.11). Caps collection sizes, truncates long strings,
//! scrubs secret-shaped text, and removes null/empty fields from the
//! serialized form per `spec.md` §4.11/§8: `CrashRecord`'s
//! `skip_serializing_if` attributes drop empty `Option`/collection fields on
//! their own, but `message`/`stack_trace`/`thread_name`/`issue_title` are
//! required (non-`Option`) strings on the wire schema, so an empty one is
//! replaced with a placeholder here rather than omitted; empty `custom_data`
//! and breadcrumb-data values, which have no such wire requirement, are
//! dropped outright.

use super::scrub::scrub_string;
use crate::crash_info::CrashRecord;
use crate::shared::constants::{
    MAX_CUSTOM_DATA_KEYS, MAX_MEMORY_DUMP_CHARS, MAX_MEMORY_EVENTS, MAX_OUTGOING_BREADCRUMBS,
    MAX_OUTGOING_STACK_LINES, MAX_OUTGOING_THREADS, MAX_STRING_LEN,
};

const TRUNCATION_SUFFIX: &str = "[truncated]";
const ELLIPSIS_ANNOTATION: &str = "\n... (truncated)";
const EMPTY_MESSAGE_PLACEHOLDER: &str = "<no message>";
const EMPTY_STACK_TRACE_PLACEHOLDER: &str = "<no stack trace captured>";
const EMPTY_THREAD_NAME_PLACEHOLDER: &str = "<unknown>";
const EMPTY_ISSUE_TITLE_PLACEHOLDER: &str = "<untitled>";

/// Applies every shrink/scrub rule in place and returns the optimized
/// record. Idempotent: running it twice on its own output is a no-op beyond
/// the second pass re-scrubbing (harmless, since scrubbed text has nothing
/// left to match).
pub fn optimize_payload(mut record: CrashRecord) -> CrashRecord {
    cap_stack_trace(&mut record.stack_trace);
    cap_threads(&mut record);
    record.breadcrumbs = tail(std::mem::take(&mut record.breadcrumbs), MAX_OUTGOING_BREADCRUMBS);
    record.network.recent_transitions =
        tail(std::mem::take(&mut record.network.recent_transitions), MAX_MEMORY_EVENTS);
    record.memory_events = tail(std::mem::take(&mut record.memory_events), MAX_MEMORY_EVENTS);

    cap_custom_data(&mut record);
    scrub_record_strings(&mut record);
    truncate_long_strings(&mut record);
    cap_memory_dump(&mut record);
    strip_or_placeholder_empty_strings(&mut record);

    record
}

/// Removes empty-string `custom_data`/breadcrumb-data entries outright, and
/// substitutes a placeholder for the handful of required top-level string
/// fields an empty value would otherwise leave in the serialized payload.
fn strip_or_placeholder_empty_strings(record: &mut CrashRecord) {
    if record.message.is_empty() {
        record.message = EMPTY_MESSAGE_PLACEHOLDER.to_string();
    }
    if record.stack_trace.is_empty() {
        record.stack_trace = EMPTY_STACK_TRACE_PLACEHOLDER.to_string();
    }
    if record.thread_name.is_empty() {
        record.thread_name = EMPTY_THREAD_NAME_PLACEHOLDER.to_string();
    }
    if record.issue_title.is_empty() {
        record.issue_title = EMPTY_ISSUE_TITLE_PLACEHOLDER.to_string();
    }

    record.custom_data.retain(|_, v| !v.is_empty());
    for breadcrumb in &mut record.breadcrumbs {
        breadcrumb.data.retain(|_, v| !v.is_empty());
    }
}

fn cap_stack_trace(stack_trace: &mut String) {
    let lines: Vec<&str> = stack_trace.lines().collect();
    if lines.len() <= MAX_OUTGOING_STACK_LINES {
        return;
    }
    let mut kept = lines[..MAX_OUTGOING_STACK_LINES].join("\n");
    kept.push_str(ELLIPSIS_ANNOTATION);
    *stack_trace = kept;
}

/// Caps the thread list at [`MAX_OUTGOING_THREADS`], keeping the crashing
/// thread first and prioritizing `main`/the UI thread next.
fn cap_threads(record: &mut CrashRecord) {
    if record.threads.len() <= MAX_OUTGOING_THREADS {
        return;
    }
    let mut threads = std::mem::take(&mut record.threads);
    threads.sort_by_key(|t| {
        if t.crashed {
            0
        } else if t.name == "main" || t.name.eq_ignore_ascii_case("ui") {
            1
        } else {
            2
        }
    });
    threads.truncate(MAX_OUTGOING_THREADS);
    record.threads = threads;
}

fn cap_custom_data(record: &mut CrashRecord) {
    if record.custom_data.len() <= MAX_CUSTOM_DATA_KEYS {
        return;
    }
    let mut keys: Vec<String> = record.custom_data.keys().cloned().collect();
    keys.sort();
    keys.truncate(MAX_CUSTOM_DATA_KEYS);
    let kept: std::collections::HashMap<String, String> = keys
        .into_iter()
        .filter_map(|k| record.custom_data.remove(&k).map(|v| (k.clone(), v)))
        .collect();
    record.custom_data = kept;
}

fn tail<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    if items.len() > max {
        let start = items.len() - max;
        items.drain(..start);
    }
    items
}

fn scrub_record_strings(record: &mut CrashRecord) {
    record.message = scrub_string(&record.message);
    record.stack_trace = scrub_string(&record.stack_trace);
    for thread in &mut record.threads {
        thread.stack_trace = scrub_string(&thread.stack_trace);
    }
    for breadcrumb in &mut record.breadcrumbs {
        breadcrumb.message = scrub_string(&breadcrumb.message);
        for value in breadcrumb.data.values_mut() {
            *value = scrub_string(value);
        }
    }
    for value in record.custom_data.values_mut() {
        *value = scrub_string(value);
    }
    for line in &mut record.recent_log_tail {
        *line = scrub_string(line);
    }
    for event in &mut record.memory_events {
        event.description = scrub_string(&event.description);
    }
}

fn truncate_one(s: &mut String) {
    if s.chars().count() > MAX_STRING_LEN {
        let mut truncated: String = s.chars().take(MAX_STRING_LEN).collect();
        truncated.push_str(TRUNCATION_SUFFIX);
        *s = truncated;
    }
}

fn truncate_long_strings(record: &mut CrashRecord) {
    truncate_one(&mut record.message);
    truncate_one(&mut record.stack_trace);
    truncate_one(&mut record.issue_title);
    for thread in &mut record.threads {
        truncate_one(&mut thread.stack_trace);
    }
    for breadcrumb in &mut record.breadcrumbs {
        truncate_one(&mut breadcrumb.message);
    }
    for value in record.custom_data.values_mut() {
        truncate_one(value);
    }
    for line in &mut record.recent_log_tail {
        truncate_one(line);
    }
    for event in &mut record.memory_events {
        truncate_one(&mut event.description);
    }
}

fn cap_memory_dump(record: &mut CrashRecord) {
    if let Some(native) = record.native.as_mut() {
        if let Some(dump) = native.memory_dump_tail.as_mut() {
            if dump.len() > MAX_MEMORY_DUMP_CHARS {
                let truncated: String = dump.chars().take(MAX_MEMORY_DUMP_CHARS).collect();
                *dump = truncated;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash_info::test_utils::minimal_crash_record;
    use crate::crash_info::{Breadcrumb, BreadcrumbLevel, MemoryEvent, MemoryWarningLevel, ThreadSnapshot};
    use std::collections::HashMap;

    #[test]
    fn caps_stack_trace_at_100_lines() {
        let mut record = minimal_crash_record();
        record.stack_trace = (0..150).map(|i| format!("frame {i}")).collect::<Vec<_>>().join("\n");
        let optimized = optimize_payload(record);
        let lines: Vec<&str> = optimized.stack_trace.lines().collect();
        assert!(lines.len() <= MAX_OUTGOING_STACK_LINES + 1);
        assert!(optimized.stack_trace.contains("truncated"));
    }

    #[test]
    fn leaves_short_stack_trace_untouched() {
        let record = minimal_crash_record();
        let original = record.stack_trace.clone();
        let optimized = optimize_payload(record);
        assert_eq!(optimized.stack_trace, original);
    }

    #[test]
    fn caps_threads_with_crashed_thread_first() {
        let mut record = minimal_crash_record();
        record.threads = (0..10)
            .map(|i| ThreadSnapshot {
                name: format!("worker-{i}"),
                crashed: i == 7,
                stack_trace: "frame".into(),
            })
            .collect();
        let optimized = optimize_payload(record);
        assert_eq!(optimized.threads.len(), MAX_OUTGOING_THREADS);
        assert!(optimized.threads[0].crashed);
    }

    #[test]
    fn caps_breadcrumbs_keeping_the_tail() {
        let mut record = minimal_crash_record();
        record.breadcrumbs = (0..30)
            .map(|i| Breadcrumb {
                timestamp_ms: i,
                category: "nav".into(),
                level: BreadcrumbLevel::Info,
                message: format!("event {i}"),
                data: Default::default(),
            })
            .collect();
        let optimized = optimize_payload(record);
        assert_eq!(optimized.breadcrumbs.len(), MAX_OUTGOING_BREADCRUMBS);
        assert_eq!(optimized.breadcrumbs.last().unwrap().message, "event 29");
    }

    #[test]
    fn caps_custom_data_keys() {
        let mut record = minimal_crash_record();
        for i in 0..30 {
            record.custom_data.insert(format!("key{i:02}"), "v".into());
        }
        let optimized = optimize_payload(record);
        assert_eq!(optimized.custom_data.len(), MAX_CUSTOM_DATA_KEYS);
    }

    #[test]
    fn truncates_long_strings_with_suffix() {
        let mut record = minimal_crash_record();
        record.message = "x".repeat(5000);
        let optimized = optimize_payload(record);
        assert!(optimized.message.len() <= MAX_STRING_LEN + TRUNCATION_SUFFIX.len());
        assert!(optimized.message.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn caps_memory_events_keeping_the_tail() {
        let mut record = minimal_crash_record();
        record.memory_events = (0..15)
            .map(|i| MemoryEvent {
                timestamp_ms: i,
                level: MemoryWarningLevel::Moderate,
                description: format!("warning {i}"),
            })
            .collect();
        let optimized = optimize_payload(record);
        assert_eq!(optimized.memory_events.len(), MAX_MEMORY_EVENTS);
        assert_eq!(optimized.memory_events.last().unwrap().description, "warning 14");
    }

    #[test]
    fn scrubs_secrets_from_message_and_breadcrumbs() {
        let mut record = minimal_crash_record();
        record.message = "failed with password=supersecret123".into();
        record.breadcrumbs.push(Breadcrumb {
            timestamp_ms: 1,
            category: "auth".into(),
            level: BreadcrumbLevel::Info,
            message: "token=abcdef123456".into(),
            data: Default::default(),
        });
        let optimized = optimize_payload(record);
        assert!(!optimized.message.contains("supersecret123"));
        assert!(!optimized.breadcrumbs[0].message.contains("abcdef123456"));
    }

    #[test]
    fn empty_required_strings_get_a_placeholder_not_left_blank() {
        let mut record = minimal_crash_record();
        record.message = String::new();
        record.stack_trace = String::new();
        record.thread_name = String::new();
        record.issue_title = String::new();
        let optimized = optimize_payload(record);
        assert_eq!(optimized.message, EMPTY_MESSAGE_PLACEHOLDER);
        assert_eq!(optimized.stack_trace, EMPTY_STACK_TRACE_PLACEHOLDER);
        assert_eq!(optimized.thread_name, EMPTY_THREAD_NAME_PLACEHOLDER);
        assert_eq!(optimized.issue_title, EMPTY_ISSUE_TITLE_PLACEHOLDER);
    }

    #[test]
    fn empty_custom_data_and_breadcrumb_data_values_are_dropped() {
        let mut record = minimal_crash_record();
        record.custom_data.insert("populated".into(), "value".into());
        record.custom_data.insert("blank".into(), String::new());
        record.breadcrumbs.push(Breadcrumb {
            timestamp_ms: 1,
            category: "nav".into(),
            level: BreadcrumbLevel::Info,
            message: "tapped".into(),
            data: HashMap::from([
                ("screen".to_string(), "checkout".to_string()),
                ("note".to_string(), String::new()),
            ]),
        });
        let optimized = optimize_payload(record);
        assert_eq!(optimized.custom_data.len(), 1);
        assert_eq!(optimized.custom_data.get("populated").map(String::as_str), Some("value"));
        assert_eq!(optimized.breadcrumbs[0].data.len(), 1);
        assert!(optimized.breadcrumbs[0].data.contains_key("screen"));
    }
}
