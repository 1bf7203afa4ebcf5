// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! ANR (Application Not Responding) detection: the Watchdog thread that
//! pings the UI-equivalent thread and the Validation Engine that decides
//! whether a detected block is a real ANR or a false positive.

pub mod validation;
pub mod watchdog;

pub use validation::{validate, ValidationInput};
pub use watchdog::{AnrEvent, AnrWatchdog, WatchdogState};
