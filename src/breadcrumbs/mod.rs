// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Breadcrumb / Context Ring: a bounded, insertion-ordered log of
//! user-observable events plus a sibling key/value tag store. Distinct from
//! the native signal handler's own state (`crate::native`), which must stay
//! async-signal-safe; this ring runs on ordinary app threads and is free to
//! take a short-held mutex.

use crate::crash_info::{Breadcrumb, BreadcrumbLevel};
use crate::shared::constants::BREADCRUMB_RING_CAPACITY;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

struct Inner {
    breadcrumbs: VecDeque<Breadcrumb>,
    tags: HashMap<String, String>,
    environment: Option<String>,
}

/// Concurrent FIFO of at most [`BREADCRUMB_RING_CAPACITY`] breadcrumbs.
/// `add` never panics and is bounded by a single short-held lock; on overflow
/// the oldest entry is evicted atomically with insertion.
pub struct BreadcrumbRing {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl BreadcrumbRing {
    pub fn new() -> Self {
        Self::with_capacity(BREADCRUMB_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                breadcrumbs: VecDeque::with_capacity(capacity),
                tags: HashMap::new(),
                environment: None,
            }),
            capacity,
        }
    }

    pub fn add(&self, category: impl Into<String>, level: BreadcrumbLevel, message: impl Into<String>) {
        self.add_with_data(category, level, message, HashMap::new());
    }

    pub fn add_with_data(
        &self,
        category: impl Into<String>,
        level: BreadcrumbLevel,
        message: impl Into<String>,
        data: HashMap<String, String>,
    ) {
        let breadcrumb = Breadcrumb {
            timestamp_ms: now_ms(),
            category: category.into(),
            level,
            message: message.into(),
            data,
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.breadcrumbs.len() >= self.capacity {
            inner.breadcrumbs.pop_front();
        }
        inner.breadcrumbs.push_back(breadcrumb);
    }

    /// A consistent, insertion-ordered copy for the caller to fold into a
    /// `CrashRecord`.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.breadcrumbs.iter().cloned().collect()
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tags.insert(key.into(), value.into());
    }

    pub fn remove_tag(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tags.remove(key);
    }

    pub fn tags_snapshot(&self) -> HashMap<String, String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tags.clone()
    }

    pub fn set_environment(&self, environment: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.environment = Some(environment.into());
    }

    pub fn environment(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.environment.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.breadcrumbs.clear();
    }
}

impl Default for BreadcrumbRing {
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
    fn evicts_oldest_on_overflow() {
        let ring = BreadcrumbRing::with_capacity(3);
        for i in 0..5 {
            ring.add("test", BreadcrumbLevel::Info, format!("msg-{i}"));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].message, "msg-2");
        assert_eq!(snapshot[2].message, "msg-4");
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let ring = BreadcrumbRing::with_capacity(10);
        ring.add("nav", BreadcrumbLevel::Info, "opened screen A");
        ring.add("nav", BreadcrumbLevel::Info, "opened screen B");
        let snapshot = ring.snapshot();
        assert_eq!(snapshot[0].message, "opened screen A");
        assert_eq!(snapshot[1].message, "opened screen B");
    }

    #[test]
    fn tags_and_environment_are_independent_of_breadcrumbs() {
        let ring = BreadcrumbRing::new();
        ring.set_tag("user_tier", "gold");
        ring.set_environment("production");
        ring.add("test", BreadcrumbLevel::Debug, "noop");
        assert_eq!(ring.tags_snapshot().get("user_tier").unwrap(), "gold");
        assert_eq!(ring.environment().unwrap(), "production");
        ring.remove_tag("user_tier");
        assert!(ring.tags_snapshot().get("user_tier").is_none());
    }
}
