// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Crash Store: a directory-based queue of pending and sent crash
//! payloads. `save` persists before any network call is attempted, so the
//! store survives process death; `mark_sent` only renames, never rewrites.

use crate::crash_info::CrashRecord;
use crate::shared::constants::{PENDING_DIR, SENT_DIR, SENT_RETENTION};
use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub struct CrashStore {
    pending_dir: PathBuf,
    sent_dir: PathBuf,
}

impl CrashStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let pending_dir = root.as_ref().join(PENDING_DIR);
        let sent_dir = root.as_ref().join(SENT_DIR);
        std::fs::create_dir_all(&pending_dir)
            .with_context(|| format!("creating {pending_dir:?}"))?;
        std::fs::create_dir_all(&sent_dir).with_context(|| format!("creating {sent_dir:?}"))?;
        Ok(Self {
            pending_dir,
            sent_dir,
        })
    }

    fn pending_path(&self, id: &Uuid) -> PathBuf {
        self.pending_dir.join(format!("crash_{id}.json"))
    }

    fn sent_path(&self, id: &Uuid) -> PathBuf {
        self.sent_dir.join(format!("crash_{id}.json"))
    }

    /// Writes `pending/crash_<id>.json` via write-to-temp-then-rename, and
    /// fsyncs both the temp file and the containing directory so the rename
    /// itself is durable across a crash.
    pub fn save(&self, record: &CrashRecord) -> Result<()> {
        let final_path = self.pending_path(&record.uuid);
        let tmp_path = self.pending_dir.join(format!("crash_{}.json.tmp", record.uuid));
        let json = serde_json::to_vec_pretty(record).context("serializing crash record")?;

        let mut file =
            File::create(&tmp_path).with_context(|| format!("creating {tmp_path:?}"))?;
        use std::io::Write;
        file.write_all(&json)
            .with_context(|| format!("writing {tmp_path:?}"))?;
        file.sync_all()
            .with_context(|| format!("fsyncing {tmp_path:?}"))?;
        drop(file);

        std::fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming {tmp_path:?} to {final_path:?}"))?;
        sync_dir(&self.pending_dir);
        Ok(())
    }

    pub fn load(&self, id: &Uuid) -> Result<Option<CrashRecord>> {
        let path = self.pending_path(id);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {path:?}"))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {path:?}")),
        }
    }

    /// Renames `pending/crash_<id>.json` into `sent/`, preserving the
    /// original file's mtime. Returns `false` if no such pending crash
    /// exists.
    pub fn mark_sent(&self, id: &Uuid) -> Result<bool> {
        let from = self.pending_path(id);
        if !from.exists() {
            return Ok(false);
        }
        let to = self.sent_path(id);
        let metadata = std::fs::metadata(&from)?;
        let mtime = filetime_from_metadata(&metadata);
        std::fs::rename(&from, &to).with_context(|| format!("renaming {from:?} to {to:?}"))?;
        if let Some(mtime) = mtime {
            let _ = set_mtime(&to, mtime);
        }
        sync_dir(&self.sent_dir);
        Ok(true)
    }

    pub fn list_pending(&self) -> Result<Vec<Uuid>> {
        list_ids(&self.pending_dir)
    }

    /// Deletes files in `sent/` older than [`SENT_RETENTION`].
    pub fn cleanup_old_sent(&self) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(SENT_RETENTION)
            .unwrap_or(UNIX_EPOCH);
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.sent_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
            if modified < cutoff {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn delete(&self, id: &Uuid) -> Result<()> {
        let pending = self.pending_path(id);
        let sent = self.sent_path(id);
        if pending.exists() {
            std::fs::remove_file(&pending)?;
        }
        if sent.exists() {
            std::fs::remove_file(&sent)?;
        }
        Ok(())
    }

    pub fn delete_all(&self) -> Result<()> {
        for dir in [&self.pending_dir, &self.sent_dir] {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if entry.path().is_file() {
                    std::fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }
}

fn list_ids(dir: &Path) -> Result<Vec<Uuid>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(id) = name
            .strip_prefix("crash_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn sync_dir(dir: &Path) {
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
}

fn filetime_from_metadata(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    metadata.modified().ok()
}

fn set_mtime(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(mtime)
}
