// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use crate::crash_info::{MemoryEvent, MemoryWarningLevel};
use crate::shared::constants::MAX_MEMORY_EVENTS;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bounded ring of memory-pressure warnings, fed by whatever the host bridge
/// forwards from the platform's low-memory callback. Folded into a
/// `CrashRecord`'s `memory_events` field; the payload optimizer re-caps it
/// at send time regardless, this ring just avoids unbounded growth between
/// crashes.
pub struct MemoryTracker {
    events: Mutex<VecDeque<MemoryEvent>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(MAX_MEMORY_EVENTS)),
        }
    }

    pub fn record(&self, level: MemoryWarningLevel, description: impl Into<String>) {
        let event = MemoryEvent {
            timestamp_ms: now_ms(),
            level,
            description: description.into(),
        };
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() >= MAX_MEMORY_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<MemoryEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
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
    fn evicts_oldest_beyond_capacity() {
        let tracker = MemoryTracker::new();
        for i in 0..(MAX_MEMORY_EVENTS + 5) {
            tracker.record(MemoryWarningLevel::Moderate, format!("event {i}"));
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), MAX_MEMORY_EVENTS);
        assert_eq!(snapshot[0].description, "event 5");
    }
}
