// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Severity bucket assigned by Grouping. Ordered so that
/// `Severity::Critical > Severity::Low` in the derived `Ord`, which the
/// Sender relies on nowhere today but which keeps the type useful for future
/// triage sorting without another newtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        };
        f.write_str(s)
    }
}

/// Symbolic family of the exception that produced a `CrashRecord`. The rest
/// of the pipeline (native handler, exception handler, watchdog) only ever
/// produces the three named variants; anything else a host hands to
/// `handle_managed_exception` is preserved verbatim via `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ExceptionKind {
    NativeSignal,
    UnhandledException,
    Anr,
    Custom(String),
}

impl ExceptionKind {
    /// The last dotted segment, used by Grouping to build the issue title
    /// (the issue title is built as "`<TypeName> at <TopFrame>`").
    pub fn type_name(&self) -> &str {
        match self {
            ExceptionKind::NativeSignal => "NativeSignal",
            ExceptionKind::UnhandledException => "UnhandledException",
            ExceptionKind::Anr => "ANR",
            ExceptionKind::Custom(s) => s.rsplit('.').next().unwrap_or(s),
        }
    }
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}
