// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Native (POSIX signal) crash capture: install/uninstall the handler and
//! parse the trailer file it leaves behind on the next session's startup.

#[cfg(unix)]
mod signal_handler;
pub mod parser;

#[cfg(unix)]
pub use signal_handler::{disable, enable, install, is_installed, uninstall};

#[cfg(not(unix))]
pub fn is_installed() -> bool {
    false
}

#[cfg(not(unix))]
pub fn enable() {}

#[cfg(not(unix))]
pub fn disable() {}

#[cfg(not(unix))]
pub fn install(
    _trailer_path: &std::path::Path,
    _signals: &[libc::c_int],
    _use_alt_stack: bool,
) -> anyhow::Result<()> {
    anyhow::bail!("native signal handling is not supported on this target")
}

#[cfg(not(unix))]
pub fn uninstall() {}

/// The six fatal signals this crate installs the handler for by default.
pub fn default_signals() -> Vec<libc::c_int> {
    vec![
        libc::SIGSEGV,
        libc::SIGABRT,
        libc::SIGFPE,
        libc::SIGILL,
        libc::SIGBUS,
        libc::SIGTRAP,
    ]
}

/// The `type: 0..=4` argument `trigger_native_crash` takes from a host test
/// harness (`spec.md` §6), mapped back to the signal it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive)]
pub enum NativeCrashType {
    Segv = 0,
    Abrt = 1,
    Fpe = 2,
    Ill = 3,
    Bus = 4,
}

impl NativeCrashType {
    pub fn signal(self) -> libc::c_int {
        match self {
            NativeCrashType::Segv => libc::SIGSEGV,
            NativeCrashType::Abrt => libc::SIGABRT,
            NativeCrashType::Fpe => libc::SIGFPE,
            NativeCrashType::Ill => libc::SIGILL,
            NativeCrashType::Bus => libc::SIGBUS,
        }
    }

    pub fn from_test_harness_value(value: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_signals_covers_the_documented_six() {
        let signals = default_signals();
        assert_eq!(signals.len(), 6);
        assert!(signals.contains(&libc::SIGSEGV));
        assert!(signals.contains(&libc::SIGABRT));
        assert!(signals.contains(&libc::SIGFPE));
        assert!(signals.contains(&libc::SIGILL));
        assert!(signals.contains(&libc::SIGBUS));
        assert!(signals.contains(&libc::SIGTRAP));
    }

    #[test]
    fn test_harness_value_maps_to_the_right_signal() {
        assert_eq!(
            NativeCrashType::from_test_harness_value(0).map(NativeCrashType::signal),
            Some(libc::SIGSEGV)
        );
        assert_eq!(
            NativeCrashType::from_test_harness_value(4).map(NativeCrashType::signal),
            Some(libc::SIGBUS)
        );
        assert_eq!(NativeCrashType::from_test_harness_value(99), None);
    }
}
