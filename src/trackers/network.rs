// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

use crate::crash_info::{NetworkEvent, NetworkTransition};
use crate::shared::constants::MAX_MEMORY_EVENTS;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

struct State {
    connected: bool,
    transitions: VecDeque<NetworkEvent>,
    lost_at: Option<Instant>,
}

/// Tracks connectivity transitions reported by the host bridge. Feeds
/// `network.connected`/`recent_transitions` on a `CrashRecord` and the
/// "time since a recent network loss" input the ANR Validation Engine's
/// step 4 consults.
pub struct NetworkTracker {
    state: Mutex<State>,
}

impl NetworkTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                connected: true,
                transitions: VecDeque::with_capacity(MAX_MEMORY_EVENTS),
                lost_at: None,
            }),
        }
    }

    pub fn record_connected(&self, description: impl Into<String>) {
        self.record(NetworkTransition::Connected, description, true, false);
    }

    pub fn record_lost(&self, description: impl Into<String>) {
        self.record(NetworkTransition::Lost, description, false, true);
    }

    pub fn record_type_changed(&self, description: impl Into<String>) {
        self.record(NetworkTransition::TypeChanged, description, true, false);
    }

    fn record(
        &self,
        transition: NetworkTransition,
        description: impl Into<String>,
        connected: bool,
        mark_loss: bool,
    ) {
        let event = NetworkEvent {
            timestamp_ms: now_ms(),
            transition,
            description: description.into(),
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.transitions.len() >= MAX_MEMORY_EVENTS {
            state.transitions.pop_front();
        }
        state.transitions.push_back(event);
        state.connected = connected;
        if mark_loss {
            state.lost_at = Some(Instant::now());
        }
    }

    pub fn connected(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).connected
    }

    pub fn recent_transitions(&self) -> Vec<NetworkEvent> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.transitions.iter().cloned().collect()
    }

    /// How long ago connectivity was last lost, or `None` if it never was
    /// (this process lifetime) or has since reconnected and lost again is
    /// not tracked separately — only the most recent loss matters to the
    /// Validation Engine's 30-second window.
    pub fn time_since_loss(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.lost_at.map(|at| at.elapsed())
    }
}

impl Default for NetworkTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
