// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Static app identity, supplied once by the host at `initialize(context, ...)`
//! time (`spec.md` §6) and carried unchanged into every `CrashRecord`'s
//! `app` field for the life of the process.

use crate::crash_info::AppSnapshot;

#[derive(Debug, Clone)]
pub struct AppInfo {
    pub package_id: String,
    pub version_name: String,
    pub version_code: i64,
    pub first_install_time_ms: Option<i64>,
    pub last_update_time_ms: Option<i64>,
}

impl AppInfo {
    pub fn to_snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            package_id: self.package_id.clone(),
            version_name: self.version_name.clone(),
            version_code: self.version_code,
            first_install_time_ms: self.first_install_time_ms,
            last_update_time_ms: self.last_update_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_snapshot_preserves_every_field() {
        let info = AppInfo {
            package_id: "com.example.app".to_string(),
            version_name: "2.0.0".to_string(),
            version_code: 200,
            first_install_time_ms: Some(1_000),
            last_update_time_ms: Some(2_000),
        };
        let snapshot = info.to_snapshot();
        assert_eq!(snapshot.package_id, "com.example.app");
        assert_eq!(snapshot.version_code, 200);
        assert_eq!(snapshot.first_install_time_ms, Some(1_000));
    }
}
