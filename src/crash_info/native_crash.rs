// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Native (signal-handler) fields folded into a `CrashRecord` when the
/// source was a POSIX signal. Absent on every other path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NativeCrashInfo {
    pub signal_name: String,
    pub signal_number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_address: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub registers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_dump_tail: Option<String>,
}
