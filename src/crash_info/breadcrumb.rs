// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BreadcrumbLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single user-observable event, as recorded into the Breadcrumb Ring
/// and later folded into a `CrashRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Breadcrumb {
    pub timestamp_ms: i64,
    pub category: String,
    pub level: BreadcrumbLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}
