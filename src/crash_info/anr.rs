// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use crate::crash_info::snapshots::ProcessImportance;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why the ANR Validation Engine rejected (or accepted) a candidate ANR.
/// The string values are stable wire values asserted on directly by tests,
/// so they are a plain `&'static str`-backed enum rather than a `Display`
/// impl a reader might casually reformat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BlockingFactor {
    BackgroundApp,
    ScreenOffAtDetection,
    RecentNetworkLoss,
    BelowAdjustedThreshold,
}

impl BlockingFactor {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockingFactor::BackgroundApp => "BACKGROUND_APP",
            BlockingFactor::ScreenOffAtDetection => "SCREEN_OFF_AT_DETECTION",
            BlockingFactor::RecentNetworkLoss => "RECENT_NETWORK_LOSS",
            BlockingFactor::BelowAdjustedThreshold => "BELOW_ADJUSTED_THRESHOLD",
        }
    }
}

/// The factor snapshot consulted by each rejection step of ANR validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnrFactors {
    pub process_importance: ProcessImportance,
    pub screen_on: bool,
    pub network_lost: bool,
    pub power_save: bool,
    pub battery_fraction: f32,
    pub adjusted_threshold_ms: u64,
}

/// Output of the ANR Validation Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnrValidation {
    pub valid: bool,
    pub reason: String,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_factor: Option<BlockingFactor>,
    pub factors: AnrFactors,
}
