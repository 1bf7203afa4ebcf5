// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Pull-style queries over device/process state. The trait exists so
//! Grouping, the ANR Validation Engine, and the Orchestrator never reach into
//! platform APIs directly — on a host embedding this crate the trait is
//! implemented by a thin shim over the platform SDK; `SystemDeviceStateOracle`
//! below is the best-effort desktop/CI fallback used by tests and by hosts
//! that have no richer signal to offer.

use crate::crash_info::{DeviceSnapshot, MemoryPressure, Orientation, ProcessImportance};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// All queries return safe defaults on failure; none may panic or block for
/// more than a few milliseconds, except [`DeviceStateOracle::disk_probe_ok`]
/// which performs one 1 MiB write+read.
pub trait DeviceStateOracle: Send + Sync {
    fn process_importance(&self) -> ProcessImportance;
    fn screen_on(&self) -> bool;
    fn power_save(&self) -> bool;
    fn battery_fraction(&self) -> f32;
    fn orientation(&self) -> Orientation;
    fn memory_pressure(&self) -> MemoryPressure;
    fn vpn_active(&self) -> bool;
    fn proxy_active(&self) -> bool;
    fn boot_time_ms(&self) -> i64;
    fn uptime_ms(&self) -> i64;
    fn timezone_id(&self) -> String;

    /// Writes and reads back 1 MiB under `cache_dir`, returning `false` (not
    /// erroring) on any I/O failure — a slow or failing disk is itself a
    /// signal, not a reason to crash the reporter.
    fn disk_probe_ok(&self, cache_dir: &Path) -> bool;
}

/// Default [`DeviceStateOracle`] backed by what a plain process can observe
/// without a host SDK bridge: process uptime, the real filesystem for the
/// disk probe, and conservative `Unknown`/safe-default answers for anything
/// that genuinely requires a platform API (battery, screen, radios).
pub struct SystemDeviceStateOracle {
    process_start: Instant,
    boot_time_ms: i64,
}

impl SystemDeviceStateOracle {
    pub fn new() -> Self {
        let boot_time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            process_start: Instant::now(),
            boot_time_ms,
        }
    }
}

impl Default for SystemDeviceStateOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateOracle for SystemDeviceStateOracle {
    fn process_importance(&self) -> ProcessImportance {
        ProcessImportance::Unknown
    }

    fn screen_on(&self) -> bool {
        true
    }

    fn power_save(&self) -> bool {
        false
    }

    fn battery_fraction(&self) -> f32 {
        1.0
    }

    fn orientation(&self) -> Orientation {
        Orientation::Unknown
    }

    fn memory_pressure(&self) -> MemoryPressure {
        MemoryPressure::Unknown
    }

    fn vpn_active(&self) -> bool {
        false
    }

    fn proxy_active(&self) -> bool {
        false
    }

    fn boot_time_ms(&self) -> i64 {
        self.boot_time_ms
    }

    fn uptime_ms(&self) -> i64 {
        self.process_start.elapsed().as_millis() as i64
    }

    fn timezone_id(&self) -> String {
        std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string())
    }

    fn disk_probe_ok(&self, cache_dir: &Path) -> bool {
        let probe_path: PathBuf = cache_dir.join(".crashtracker_disk_probe");
        let payload = vec![0xA5u8; 1024 * 1024];
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&probe_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
            drop(file);
            let mut file = std::fs::File::open(&probe_path)?;
            let mut buf = Vec::with_capacity(payload.len());
            file.read_to_end(&mut buf)?;
            if buf.len() != payload.len() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "short read during disk probe",
                ));
            }
            Ok(())
        })();
        let _ = std::fs::remove_file(&probe_path);
        result.is_ok()
    }
}

/// Builds the best-effort `DeviceSnapshot` a generic host (one without a
/// mobile SDK bridge supplying its own model/screen metrics) can offer:
/// real OS name/version via `os_info`, `LANG`-derived locale, and zeroed
/// screen metrics the host is expected to override.
pub fn system_device_snapshot() -> DeviceSnapshot {
    let info = os_info::get();
    DeviceSnapshot {
        model: "unknown".to_string(),
        os_version: format!("{} {}", info.os_type(), info.version()),
        locale: std::env::var("LANG").unwrap_or_else(|_| "en-US".to_string()),
        screen_width_px: 0,
        screen_height_px: 0,
        screen_density: 0.0,
    }
}

/// Duration guard used by callers who want to assert the oracle honors the
/// "single-digit milliseconds" budget in tests without timing every query.
pub fn assert_within_budget<T>(budget: Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    let elapsed = start.elapsed();
    if elapsed > budget {
        tracing::warn!(?elapsed, ?budget, "device state query exceeded its budget");
    }
    out
}
