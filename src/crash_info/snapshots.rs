// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time snapshots folded into a `CrashRecord`. Each type here is a
//! plain value: the components that *produce* these values (Device State
//! Oracle, process trackers, etc.) live in their own modules, but the shapes
//! they hand to Grouping/Crash Store are kept centrally so every subsystem
//! that populates one agrees on its layout.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ProcessImportance {
    Foreground,
    Visible,
    Service,
    Background,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MemoryPressure {
    Low,
    Moderate,
    High,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Orientation {
    Portrait,
    Landscape,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceSnapshot {
    pub model: String,
    pub os_version: String,
    pub locale: String,
    pub screen_width_px: u32,
    pub screen_height_px: u32,
    pub screen_density: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppSnapshot {
    pub package_id: String,
    pub version_name: String,
    pub version_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_install_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceStateSnapshot {
    pub battery_fraction: f32,
    pub charging: bool,
    pub memory_available_bytes: u64,
    pub memory_total_bytes: u64,
    pub storage_available_bytes: u64,
    pub storage_total_bytes: u64,
    pub screen_on: bool,
    pub orientation: Orientation,
    pub low_memory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NetworkTransition {
    Connected,
    Lost,
    TypeChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkEvent {
    pub timestamp_ms: i64,
    pub transition: NetworkTransition,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkSnapshot {
    pub connected: bool,
    pub vpn_active: bool,
    pub proxy_active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_transitions: Vec<NetworkEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryInfo {
    pub heap_used_bytes: u64,
    pub heap_max_bytes: u64,
    pub native_heap_used_bytes: u64,
    pub native_heap_max_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CpuInfo {
    pub core_count: u32,
    pub app_cpu_usage_percent: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub importance: ProcessImportance,
    pub foreground: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThreadSnapshot {
    pub name: String,
    pub crashed: bool,
    pub stack_trace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MemoryWarningLevel {
    Moderate,
    Low,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryEvent {
    pub timestamp_ms: i64,
    pub level: MemoryWarningLevel,
    pub description: String,
}

#[cfg(test)]
pub(crate) fn test_device_snapshot() -> DeviceSnapshot {
    DeviceSnapshot {
        model: "Pixel 9".to_string(),
        os_version: "15".to_string(),
        locale: "en-US".to_string(),
        screen_width_px: 1080,
        screen_height_px: 2400,
        screen_density: 2.625,
    }
}

#[cfg(test)]
pub(crate) fn test_device_state_snapshot() -> DeviceStateSnapshot {
    DeviceStateSnapshot {
        battery_fraction: 0.8,
        charging: false,
        memory_available_bytes: 2_000_000_000,
        memory_total_bytes: 8_000_000_000,
        storage_available_bytes: 10_000_000_000,
        storage_total_bytes: 128_000_000_000,
        screen_on: true,
        orientation: Orientation::Portrait,
        low_memory: false,
    }
}
