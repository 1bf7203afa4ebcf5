// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! ANR Validation Engine: a pure, five-step classifier over a data snapshot
//! plus the Device State Oracle's live reads. Kept free of any I/O itself
//! (beyond the Oracle reads it's handed) so every rejection factor in
//! `spec.md` §4.9 is independently testable with a crafted input.

use crate::crash_info::{AnrFactors, AnrValidation, BlockingFactor, ProcessImportance};
use crate::device_state::DeviceStateOracle;
use std::time::Duration;

/// The fixed confidence values from `spec.md` §4.9's decision table.
const CONFIDENCE_NOT_FOREGROUND: u8 = 99;
const CONFIDENCE_SCREEN_OFF: u8 = 95;
const CONFIDENCE_NETWORK_LOSS: u8 = 85;
const CONFIDENCE_BELOW_THRESHOLD: u8 = 80;
const CONFIDENCE_VALID: u8 = 99;
/// Used only when the engine hits an internal error — safer to over-report.
const CONFIDENCE_ON_ERROR: u8 = 50;

const POWER_SAVE_BATTERY_FRACTION: f32 = 0.05;

/// What the Watchdog captured *at detection time*, plus the measured block
/// duration. Everything else (power state, network recency, thresholds) is
/// read live from the Oracle and the caller-supplied network-loss tracker.
pub struct ValidationInput {
    pub blocked_duration_ms: u64,
    pub captured_process_importance: ProcessImportance,
    pub captured_screen_on: bool,
    /// How long ago a network loss was observed, if any — used for step 4
    /// ("recent loss within 30s").
    pub time_since_network_loss: Option<Duration>,
}

/// Runs the five-step rejection ladder against `input`, consulting `oracle`
/// for live power/battery state and `normal_threshold`/`adjusted_threshold`
/// for the duration comparison. Never panics; any internal inconsistency
/// (there is none reachable today, but the contract is load-bearing) falls
/// back to `valid=true, confidence=50` per `spec.md` §4.9.
pub fn validate(
    input: &ValidationInput,
    oracle: &dyn DeviceStateOracle,
    network_loss_window: Duration,
    normal_threshold: Duration,
    adjusted_threshold: Duration,
) -> AnrValidation {
    let power_save = oracle.power_save();
    let battery_fraction = oracle.battery_fraction();

    // Step 1: process importance.
    if !matches!(
        input.captured_process_importance,
        ProcessImportance::Foreground | ProcessImportance::Visible
    ) {
        return rejection(
            "process was not foreground or visible at detection time",
            CONFIDENCE_NOT_FOREGROUND,
            BlockingFactor::BackgroundApp,
            input,
            power_save,
            battery_fraction,
            normal_threshold,
        );
    }

    // Step 2: screen state.
    if !input.captured_screen_on {
        return rejection(
            "screen was off at detection time",
            CONFIDENCE_SCREEN_OFF,
            BlockingFactor::ScreenOffAtDetection,
            input,
            power_save,
            battery_fraction,
            normal_threshold,
        );
    }

    // Step 3: power adjustment — not a rejection, it decides the threshold
    // the remaining steps compare against.
    let use_adjusted = power_save || battery_fraction < POWER_SAVE_BATTERY_FRACTION;
    let threshold = if use_adjusted {
        adjusted_threshold
    } else {
        normal_threshold
    };

    // Step 4: recent network loss, only disqualifying if the block is also
    // short enough to plausibly be the device catching up from a transition.
    if let Some(since_loss) = input.time_since_network_loss {
        if since_loss <= network_loss_window && input.blocked_duration_ms < 20_000 {
            return rejection(
                "recent network loss coincides with a short block",
                CONFIDENCE_NETWORK_LOSS,
                BlockingFactor::RecentNetworkLoss,
                input,
                power_save,
                battery_fraction,
                threshold,
            );
        }
    }

    // Step 5: duration against the (possibly power-adjusted) threshold.
    if (input.blocked_duration_ms as u128) < threshold.as_millis() {
        return rejection(
            "block duration is under the adjusted threshold",
            CONFIDENCE_BELOW_THRESHOLD,
            BlockingFactor::BelowAdjustedThreshold,
            input,
            power_save,
            battery_fraction,
            threshold,
        );
    }

    AnrValidation {
        valid: true,
        reason: "no rejection factor matched".to_string(),
        confidence: CONFIDENCE_VALID,
        blocking_factor: None,
        factors: factors(input, power_save, battery_fraction, threshold),
    }
}

/// Used when the engine itself cannot be evaluated (e.g. the Oracle call
/// panicked and was caught upstream) — see `spec.md` §4.9 "On any internal
/// error, default to valid=true, confidence=50".
pub fn validate_on_error(input: &ValidationInput) -> AnrValidation {
    AnrValidation {
        valid: true,
        reason: "validation engine encountered an internal error".to_string(),
        confidence: CONFIDENCE_ON_ERROR,
        blocking_factor: None,
        factors: AnrFactors {
            process_importance: input.captured_process_importance,
            screen_on: input.captured_screen_on,
            network_lost: input.time_since_network_loss.is_some(),
            power_save: false,
            battery_fraction: 0.0,
            adjusted_threshold_ms: 0,
        },
    }
}

fn factors(
    input: &ValidationInput,
    power_save: bool,
    battery_fraction: f32,
    threshold: Duration,
) -> AnrFactors {
    AnrFactors {
        process_importance: input.captured_process_importance,
        screen_on: input.captured_screen_on,
        network_lost: input.time_since_network_loss.is_some(),
        power_save,
        battery_fraction,
        adjusted_threshold_ms: threshold.as_millis() as u64,
    }
}

#[allow(clippy::too_many_arguments)]
fn rejection(
    reason: &str,
    confidence: u8,
    blocking_factor: BlockingFactor,
    input: &ValidationInput,
    power_save: bool,
    battery_fraction: f32,
    threshold: Duration,
) -> AnrValidation {
    AnrValidation {
        valid: false,
        reason: reason.to_string(),
        confidence,
        blocking_factor: Some(blocking_factor),
        factors: factors(input, power_save, battery_fraction, threshold),
    }
}
