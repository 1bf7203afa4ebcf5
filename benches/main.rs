// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for the hot paths that run on every crash (fingerprinting,
//! payload optimization) and the ones that run on every app thread
//! (breadcrumb insertion). None of these touch the signal-handler path,
//! which is intentionally left unbenchmarked — it must stay allocation-free
//! and its cost is dominated by the kernel's signal delivery, not by
//! anything this crate controls.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crashtracker_core::breadcrumbs::BreadcrumbRing;
use crashtracker_core::crash_info::{
    AppSnapshot, BreadcrumbLevel, CpuInfo, CrashRecord, DeviceSnapshot, DeviceStateSnapshot,
    ExceptionKind, MemoryInfo, NetworkSnapshot, Orientation, ProcessImportance, ProcessInfo,
    Severity,
};
use crashtracker_core::grouping::{compute_fingerprint, compute_issue_title, optimize_payload};
use std::collections::HashMap;
use uuid::Uuid;

fn sample_record(stack_lines: usize, breadcrumbs: usize) -> CrashRecord {
    let mut stack_trace = String::new();
    for i in 0..stack_lines {
        stack_trace.push_str(&format!(
            "com.example.app.Worker{i}.run(Worker{i}.kt:{})\n",
            10 + i
        ));
    }

    let crumbs = (0..breadcrumbs)
        .map(|i| crashtracker_core::crash_info::Breadcrumb {
            timestamp_ms: 1_700_000_000_000 + i as i64,
            category: "lifecycle".to_string(),
            level: BreadcrumbLevel::Info,
            message: format!("user tapped button {i}"),
            data: HashMap::new(),
        })
        .collect();

    CrashRecord {
        schema_version: crashtracker_core::crash_info::current_schema_version().to_string(),
        uuid: Uuid::new_v4(),
        timestamp_ms: 1_700_000_000_000,
        exception_kind: ExceptionKind::UnhandledException,
        message: "NullPointerException: attempt to invoke virtual method 'x' on a null object \
                  reference, password=hunter2, contact ops@example.com"
            .to_string(),
        stack_trace,
        thread_name: "main".to_string(),
        device: DeviceSnapshot {
            model: "Pixel 9".to_string(),
            os_version: "15".to_string(),
            locale: "en-US".to_string(),
            screen_width_px: 1080,
            screen_height_px: 2400,
            screen_density: 2.625,
        },
        app: AppSnapshot {
            package_id: "com.example.app".to_string(),
            version_name: "1.2.3".to_string(),
            version_code: 123,
            first_install_time_ms: None,
            last_update_time_ms: None,
        },
        device_state: DeviceStateSnapshot {
            battery_fraction: 0.8,
            charging: false,
            memory_available_bytes: 2_000_000_000,
            memory_total_bytes: 8_000_000_000,
            storage_available_bytes: 10_000_000_000,
            storage_total_bytes: 128_000_000_000,
            screen_on: true,
            orientation: Orientation::Portrait,
            low_memory: false,
        },
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
        breadcrumbs: crumbs,
        memory_events: Vec::new(),
        custom_data: HashMap::new(),
        environment: Some("production".to_string()),
        fingerprint: "0".repeat(16),
        issue_title: String::new(),
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

fn bench_fingerprint(c: &mut Criterion) {
    let record = sample_record(20, 20);
    c.bench_function("compute_fingerprint", |b| {
        b.iter(|| black_box(compute_fingerprint(black_box(&record))))
    });
    c.bench_function("compute_issue_title", |b| {
        b.iter(|| black_box(compute_issue_title(black_box(&record))))
    });
}

fn bench_optimize_payload(c: &mut Criterion) {
    c.bench_function("optimize_payload_oversized", |b| {
        b.iter_batched(
            || sample_record(300, 50),
            |record| black_box(optimize_payload(black_box(record))),
            criterion::BatchSize::SmallInput,
        )
    });
    c.bench_function("optimize_payload_already_small", |b| {
        b.iter_batched(
            || sample_record(5, 5),
            |record| black_box(optimize_payload(black_box(record))),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_breadcrumb_ring(c: &mut Criterion) {
    let ring = BreadcrumbRing::new();
    c.bench_function("breadcrumb_ring_add_steady_state", |b| {
        // Fill past capacity first so every iteration measures the
        // evict-oldest-on-insert path, not the initial fill.
        for i in 0..200 {
            ring.add("lifecycle", BreadcrumbLevel::Info, format!("warmup {i}"));
        }
        b.iter(|| ring.add("lifecycle", BreadcrumbLevel::Info, black_box("tap")))
    });
    c.bench_function("breadcrumb_ring_snapshot", |b| {
        b.iter(|| black_box(ring.snapshot()))
    });
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_optimize_payload,
    bench_breadcrumb_ring
);
criterion_main!(benches);
