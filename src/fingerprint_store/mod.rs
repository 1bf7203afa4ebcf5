// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Fingerprint Store: a persisted `fingerprint -> last_reported_ms`
//! map under the app's cache directory, used by the Sender to decide whether
//! a crash is a duplicate of one already reported in the last 7 days.

use crate::shared::constants::{FINGERPRINT_STORE_FILE, FINGERPRINT_TTL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    entries: HashMap<String, i64>,
}

pub struct FingerprintStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl FingerprintStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let path = cache_dir.as_ref().join(FINGERPRINT_STORE_FILE);
        let state = load_or_default(&path);
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// True if `fingerprint` was reported within [`FINGERPRINT_TTL`].
    pub fn was_recently_reported(&self, fingerprint: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.entries.get(fingerprint) {
            Some(&last_reported_ms) => {
                let age = now_ms().saturating_sub(last_reported_ms);
                age >= 0 && (age as u64) <= FINGERPRINT_TTL.as_millis() as u64
            }
            None => false,
        }
    }

    /// Records `fingerprint` as reported now and flushes to disk before
    /// returning.
    pub fn mark_as_reported(&self, fingerprint: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.insert(fingerprint.to_string(), now_ms());
        persist(&self.path, &state)
    }

    /// Removes entries older than [`FINGERPRINT_TTL`]; rewrites the file only
    /// if anything was actually removed.
    pub fn periodic_cleanup(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now_ms().saturating_sub(FINGERPRINT_TTL.as_millis() as i64);
        let before = state.entries.len();
        state.entries.retain(|_, &mut last_reported_ms| last_reported_ms >= cutoff);
        if state.entries.len() != before {
            persist(&self.path, &state)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_or_default(path: &Path) -> StoreFile {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => StoreFile::default(),
    }
}

fn persist(path: &Path, state: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating fingerprint store directory {parent:?}"))?;
    }
    let json = serde_json::to_string(state).context("serializing fingerprint store")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("writing temp fingerprint store file {tmp_path:?}"))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming fingerprint store into place at {path:?}"))?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[allow(dead_code)]
fn ttl() -> Duration {
    FINGERPRINT_TTL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_fingerprint_is_not_recently_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FingerprintStore::new(dir.path()).expect("new store");
        assert!(!store.was_recently_reported("abc123"));
    }

    #[test]
    fn marking_as_reported_persists_and_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FingerprintStore::new(dir.path()).expect("new store");
        store.mark_as_reported("abc123").expect("mark");
        assert!(store.was_recently_reported("abc123"));

        let reopened = FingerprintStore::new(dir.path()).expect("reopen");
        assert!(reopened.was_recently_reported("abc123"));
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(FINGERPRINT_STORE_FILE), b"{ not json").unwrap();
        let store = FingerprintStore::new(dir.path()).expect("new store");
        assert!(store.is_empty());
    }

    #[test]
    fn periodic_cleanup_removes_stale_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FingerprintStore::new(dir.path()).expect("new store");
        {
            let mut state = store.state.lock().unwrap();
            state.entries.insert("stale".to_string(), 0);
        }
        store.mark_as_reported("fresh").expect("mark");
        store.periodic_cleanup().expect("cleanup");
        assert!(!store.was_recently_reported("stale"));
        assert!(store.was_recently_reported("fresh"));
    }
}
