// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! The crash data model. A `CrashRecord` is the single value every
//! downstream subsystem (Grouping, Crash Store, Sender) agrees on; everything
//! upstream of it (native handler, exception handler, ANR watchdog) exists
//! only to build one.

pub mod anr;
pub mod breadcrumb;
pub mod native_crash;
pub mod severity;
pub mod snapshots;

pub use anr::{AnrFactors, AnrValidation, BlockingFactor};
pub use breadcrumb::{Breadcrumb, BreadcrumbLevel};
pub use native_crash::NativeCrashInfo;
pub use severity::{ExceptionKind, Severity};
pub use snapshots::{
    AppSnapshot, CpuInfo, DeviceSnapshot, DeviceStateSnapshot, MemoryEvent, MemoryInfo,
    MemoryPressure, MemoryWarningLevel, NetworkEvent, NetworkSnapshot, NetworkTransition,
    Orientation, ProcessImportance, ProcessInfo, ThreadSnapshot,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Bumped whenever a field is added, removed, or reinterpreted so a Sender
/// talking to an older or newer ingestion endpoint can tell the difference.
pub fn current_schema_version() -> &'static str {
    "1.0.0"
}

/// Everything known about one crash/ANR, ready to be fingerprinted, stored,
/// and sent. Optional fields use `#[serde(default)]` so a `CrashRecord`
/// persisted by an older build still deserializes under a newer schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrashRecord {
    #[serde(default = "current_schema_version_owned")]
    pub schema_version: String,
    pub uuid: Uuid,
    pub timestamp_ms: i64,

    pub exception_kind: ExceptionKind,
    pub message: String,
    pub stack_trace: String,
    pub thread_name: String,

    pub device: DeviceSnapshot,
    pub app: AppSnapshot,
    pub device_state: DeviceStateSnapshot,
    pub network: NetworkSnapshot,
    pub memory: MemoryInfo,
    pub cpu: CpuInfo,
    pub process: ProcessInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<ThreadSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_events: Vec<MemoryEvent>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    pub fingerprint: String,
    pub issue_title: String,
    pub severity: Severity,
    pub fatal: bool,

    #[serde(default)]
    pub is_anr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anr_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anr_validation: Option<AnrValidation>,

    #[serde(default)]
    pub is_startup_crash: bool,
    #[serde(default)]
    pub is_crash_loop: bool,
    #[serde(default)]
    pub crash_loop_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeCrashInfo>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_log_tail: Vec<String>,
}

fn current_schema_version_owned() -> String {
    current_schema_version().to_string()
}

impl CrashRecord {
    /// Number of frames Grouping reads to build the fingerprint and issue
    /// title; kept here because both the native trailer parser and the
    /// managed-exception path need the same split of `stack_trace`.
    pub fn top_frames(&self, n: usize) -> Vec<&str> {
        self.stack_trace.lines().take(n).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::crash_info::snapshots::{test_device_snapshot, test_device_state_snapshot};

    pub(crate) fn minimal_crash_record() -> CrashRecord {
        CrashRecord {
            schema_version: current_schema_version().to_string(),
            uuid: Uuid::nil(),
            timestamp_ms: 1_700_000_000_000,
            exception_kind: ExceptionKind::UnhandledException,
            message: "NullPointerException: attempt to invoke virtual method".to_string(),
            stack_trace: "com.example.Foo.bar(Foo.kt:42)\ncom.example.Foo.baz(Foo.kt:10)"
                .to_string(),
            thread_name: "main".to_string(),
            device: test_device_snapshot(),
            app: AppSnapshot {
                package_id: "com.example.app".to_string(),
                version_name: "1.2.3".to_string(),
                version_code: 123,
                first_install_time_ms: None,
                last_update_time_ms: None,
            },
            device_state: test_device_state_snapshot(),
            network: NetworkSnapshot {
                connected: true,
                vpn_active: false,
                proxy_active: false,
                recent_transitions: Vec::new(),
            },
            memory: MemoryInfo {
                heap_used_bytes: 50_000_000,
                heap_max_bytes: 256_000_000,
                native_heap_used_bytes: 10_000_000,
                native_heap_max_bytes: 128_000_000,
            },
            cpu: CpuInfo {
                core_count: 8,
                app_cpu_usage_percent: 12.5,
            },
            process: ProcessInfo {
                pid: 1234,
                name: "com.example.app".to_string(),
                importance: ProcessImportance::Foreground,
                foreground: true,
            },
            threads: Vec::new(),
            breadcrumbs: Vec::new(),
            memory_events: Vec::new(),
            custom_data: HashMap::new(),
            environment: Some("production".to_string()),
            fingerprint: "0".repeat(16),
            issue_title: "UnhandledException at com.example.Foo.bar".to_string(),
            severity: Severity::High,
            fatal: true,
            is_anr: false,
            anr_duration_ms: None,
            anr_validation: None,
            is_startup_crash: false,
            is_crash_loop: false,
            crash_loop_count: 0,
            native: None,
            recent_log_tail: Vec::new(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let record = minimal_crash_record();
        let json = serde_json::to_string(&record).expect("serialize");
        let back: CrashRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, back);
    }

    #[test]
    fn tolerates_missing_optional_fields_from_an_older_schema() {
        let record = minimal_crash_record();
        let mut value = serde_json::to_value(&record).expect("serialize");
        let obj = value.as_object_mut().expect("object");
        obj.remove("anr_validation");
        obj.remove("native");
        obj.remove("environment");
        let back: CrashRecord = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back.anr_validation, None);
        assert_eq!(back.native, None);
        assert_eq!(back.environment, None);
    }

    #[test]
    fn top_frames_splits_on_lines() {
        let record = minimal_crash_record();
        assert_eq!(record.top_frames(1), vec!["com.example.Foo.bar(Foo.kt:42)"]);
    }
}
