// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

pub mod app_info;
pub mod constants;
pub mod configuration;

pub use app_info::AppInfo;
pub use configuration::CrashReporterConfiguration;
