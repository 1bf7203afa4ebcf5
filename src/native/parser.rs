// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Parses the `native_crash.txt` trailer the signal handler leaves behind,
//! turning the frozen on-disk schema back into structured fields the
//! orchestrator can fold into a `CrashRecord` on the next session's startup.

use crate::crash_info::NativeCrashInfo;
use crate::shared::constants::{
    TRAILER_BEGIN_MEMORY_DUMP, TRAILER_BEGIN_REGISTERS, TRAILER_BEGIN_STACKTRACE, TRAILER_HEADER,
};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNativeCrash {
    pub signal_name: String,
    pub signal_number: i32,
    pub fault_address: Option<String>,
    pub pid: u32,
    pub tid: i64,
    pub thread_name: String,
    pub registers: HashMap<String, String>,
    pub stack_lines: Vec<String>,
    pub memory_dump: Option<String>,
}

impl ParsedNativeCrash {
    pub fn into_native_crash_info(self) -> NativeCrashInfo {
        NativeCrashInfo {
            signal_name: self.signal_name,
            signal_number: self.signal_number,
            fault_address: self.fault_address,
            registers: self.registers,
            memory_dump_tail: self.memory_dump,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Registers,
    StackTrace,
    MemoryDump,
}

/// Reads and parses the trailer at `path`, if present. Returns `Ok(None)` if
/// the file does not exist (the common case: no native crash last session).
/// A present-but-malformed file is logged and treated the same as absent —
/// `native_crash.txt` malformed is a *local-recoverable* outcome.
pub fn parse_trailer_file(path: &Path) -> anyhow::Result<Option<ParsedNativeCrash>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match parse_trailer_contents(&contents) {
        Some(parsed) => Ok(Some(parsed)),
        None => {
            tracing::warn!(path = %path.display(), "native crash trailer is malformed, discarding");
            Ok(None)
        }
    }
}

/// Deletes the trailer file; used once its contents have been folded into a
/// persisted `CrashRecord` and (best-effort) sent.
pub fn delete_trailer_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete native crash trailer");
        }
    }
}

fn parse_trailer_contents(contents: &str) -> Option<ParsedNativeCrash> {
    let mut lines = contents.lines();
    let header = lines.next()?;
    if header.trim() != TRAILER_HEADER {
        return None;
    }

    let mut signal_name = None;
    let mut signal_number = None;
    let mut fault_address = None;
    let mut pid = None;
    let mut tid = None;
    let mut thread_name = None;
    let mut registers = HashMap::new();
    let mut stack_lines = Vec::new();
    let mut memory_lines = Vec::new();
    let mut section = Section::Header;

    for line in lines {
        if line == TRAILER_BEGIN_REGISTERS {
            section = Section::Registers;
            continue;
        }
        if line == TRAILER_BEGIN_STACKTRACE {
            section = Section::StackTrace;
            continue;
        }
        if line == TRAILER_BEGIN_MEMORY_DUMP {
            section = Section::MemoryDump;
            continue;
        }

        match section {
            Section::Header => {
                if let Some((key, value)) = line.split_once('=') {
                    match key {
                        "signal_name" => signal_name = Some(value.to_string()),
                        "signal_number" => signal_number = value.parse::<i32>().ok(),
                        "fault_address" => fault_address = Some(value.to_string()),
                        "pid" => pid = value.parse::<u32>().ok(),
                        "tid" => tid = value.parse::<i64>().ok(),
                        "thread_name" => thread_name = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
            Section::Registers => {
                if let Some((key, value)) = line.split_once('=') {
                    registers.insert(key.to_string(), value.to_string());
                }
            }
            Section::StackTrace => {
                if !line.is_empty() {
                    stack_lines.push(line.to_string());
                }
            }
            Section::MemoryDump => {
                if !line.is_empty() {
                    memory_lines.push(line.to_string());
                }
            }
        }
    }

    Some(ParsedNativeCrash {
        signal_name: signal_name?,
        signal_number: signal_number?,
        fault_address: fault_address.filter(|a| a != "0x0000000000000000"),
        pid: pid?,
        tid: tid.unwrap_or(0),
        thread_name: thread_name.unwrap_or_else(|| "unknown".to_string()),
        registers,
        stack_lines,
        memory_dump: if memory_lines.is_empty() {
            None
        } else {
            Some(memory_lines.join("\n"))
        },
    })
}
