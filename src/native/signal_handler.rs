// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

//! The POSIX signal handler. Installed once at startup for the signals in
//! `default_signals()` (or a host-supplied subset), it writes a single
//! trailer file on the faulting thread before re-raising with the original
//! disposition so the platform can still terminate the process normally.
//!
//! The trailer is written with raw `open`/`write`/`close`, not `std::fs`:
//! the path is pre-converted to a `CString` at install time (ordinary,
//! non-signal context) so the handler itself never needs to allocate just to
//! open its output file. `dladdr` (reentrant on glibc/bionic) and
//! `process_vm_readv` (a single syscall, no allocation) are the other two
//! non-trivial calls the handler makes; none of the three is formally
//! guaranteed async-signal-safe by POSIX, but all three are what production
//! crash handlers reach for in practice.
//! <https://man7.org/linux/man-pages/man7/signal-safety.7.html>

use crate::shared::constants::{
    NATIVE_MEMORY_DUMP_RADIUS, NATIVE_STACK_FRAME_LIMIT, TRAILER_BEGIN_MEMORY_DUMP,
    TRAILER_BEGIN_REGISTERS, TRAILER_BEGIN_STACKTRACE, TRAILER_HEADER,
};
use anyhow::Context;
use libc::{c_int, c_void, siginfo_t, ucontext_t};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::ffi::CString;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering::SeqCst};
use std::ptr;

struct HandlerState {
    trailer_path: CString,
    prev_handlers: Vec<(Signal, SigAction)>,
}

/// Thin `std::io::Write` wrapper over a raw fd, so the trailer-writing code
/// below can keep using `write!`/`writeln!` without going through
/// `std::fs::File` (whose open path allocates a fresh `CString` per call).
struct RawFd(c_int);

impl Write for RawFd {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = unsafe { libc::write(self.0, buf.as_ptr() as *const c_void, buf.len()) };
        if n < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for RawFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

// Using mutexes inside a signal handler is not allowed; this is read once at
// install time (ordinary context) and read-only from the handler, so an
// `AtomicPtr` swap gives us the atomicity a `Mutex` can't.
static STATE: AtomicPtr<HandlerState> = AtomicPtr::new(ptr::null_mut());
static ENABLED: AtomicBool = AtomicBool::new(false);

/// True once `install` has run and has not since been undone by `uninstall`.
pub fn is_installed() -> bool {
    !STATE.load(SeqCst).is_null()
}

pub fn enable() {
    ENABLED.store(true, SeqCst);
}

pub fn disable() {
    ENABLED.store(false, SeqCst);
}

/// Installs the handler for `signals`, to write its trailer at
/// `trailer_path` on delivery. If `use_alt_stack`, a dedicated alternate
/// signal stack is allocated and requested via `SA_ONSTACK` so a
/// stack-overflow fault still has room to run the handler.
pub fn install(trailer_path: &Path, signals: &[c_int], use_alt_stack: bool) -> anyhow::Result<()> {
    if use_alt_stack {
        install_alt_stack()?;
    }

    let flags = if use_alt_stack {
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK
    } else {
        SaFlags::SA_SIGINFO
    };
    let action = SigAction::new(
        SigHandler::SigAction(handle_posix_sigaction),
        flags,
        SigSet::empty(),
    );

    let mut prev_handlers = Vec::with_capacity(signals.len());
    for &signum in signals {
        let signal = Signal::try_from(signum)
            .with_context(|| format!("signal {signum} is not a recognized POSIX signal"))?;
        // SAFETY: `handle_posix_sigaction` only touches the static state set
        // up below and async-signal-safe-in-practice syscalls.
        let prev = unsafe { signal::sigaction(signal, &action) }
            .with_context(|| format!("sigaction failed for {signal:?}"))?;
        prev_handlers.push((signal, prev));
    }

    let trailer_path = CString::new(trailer_path.as_os_str().as_bytes())
        .context("trailer path must not contain a NUL byte")?;
    let state = Box::new(HandlerState {
        trailer_path,
        prev_handlers,
    });
    let old = STATE.swap(Box::into_raw(state), SeqCst);
    if !old.is_null() {
        // SAFETY: this can only come from a `Box` above.
        unsafe { drop(Box::from_raw(old)) };
    }
    NUM_TIMES_CALLED.store(0, SeqCst);
    ENABLED.store(true, SeqCst);
    Ok(())
}

/// Restores every previously installed handler and clears the static state.
/// Not signal-safe; never call from within the handler itself.
pub fn uninstall() {
    disable();
    let old = STATE.swap(ptr::null_mut(), SeqCst);
    if old.is_null() {
        return;
    }
    // SAFETY: this can only come from a `Box` above.
    let state = unsafe { Box::from_raw(old) };
    for (signal, prev) in &state.prev_handlers {
        unsafe {
            let _ = signal::sigaction(*signal, prev);
        }
    }
}

/// Allocates a signal altstack with a guard page at the start, so a
/// stack-overflowing handler faults cleanly instead of corrupting whatever
/// mapping happens to sit below it.
fn install_alt_stack() -> anyhow::Result<()> {
    let page_size = page_size::get();
    let stack_size = std::cmp::max(libc::SIGSTKSZ, 16 * page_size);
    let map = unsafe {
        libc::mmap(
            ptr::null_mut(),
            stack_size + page_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    anyhow::ensure!(map != libc::MAP_FAILED, "failed to allocate an alternate signal stack");
    let guard_rc = unsafe { libc::mprotect(map, page_size, libc::PROT_NONE) };
    anyhow::ensure!(guard_rc == 0, "failed to guard-page the alternate signal stack");
    let stack_ptr = unsafe { map.add(page_size) };

    let ss = libc::stack_t {
        ss_sp: stack_ptr,
        ss_flags: 0,
        ss_size: stack_size,
    };
    let rc = unsafe { libc::sigaltstack(&ss, ptr::null_mut()) };
    anyhow::ensure!(rc == 0, "sigaltstack failed");
    Ok(())
}

extern "C" fn handle_posix_sigaction(signum: c_int, info: *mut siginfo_t, ucontext: *mut c_void) {
    handle_impl(signum, info, ucontext as *mut ucontext_t);
    chain_previous(signum, info, ucontext);
}

// One-time guard to guarantee at most one crash trailer per process. If a
// second fault arrives (e.g. the handler itself faults) we skip straight to
// chaining so the platform can still terminate us.
static NUM_TIMES_CALLED: AtomicU64 = AtomicU64::new(0);

fn handle_impl(signum: c_int, info: *const siginfo_t, ucontext: *const ucontext_t) {
    if !ENABLED.load(SeqCst) {
        return;
    }
    if NUM_TIMES_CALLED.fetch_add(1, SeqCst) > 0 {
        return;
    }

    let state_ptr = STATE.load(SeqCst);
    if state_ptr.is_null() {
        return;
    }
    // SAFETY: only ever a pointer from `install`'s `Box::into_raw`.
    let state = unsafe { &*state_ptr };
    write_trailer(state, signum, info, ucontext);
}

// Chaining depends on what kind of handler we're chaining to:
// https://www.gnu.org/software/libc/manual/html_node/Signal-Handling.html
// A default handler is restored then the signal is re-raised, which is the
// standard trick for getting the platform's default terminate-and-maybe-
// coredump behavior back after we're done. An ignored handler just returns.
fn chain_previous(signum: c_int, info: *mut siginfo_t, ucontext: *mut c_void) {
    let signal = match Signal::try_from(signum) {
        Ok(s) => s,
        Err(_) => {
            unsafe { libc::raise(signum) };
            return;
        }
    };
    let state_ptr = STATE.load(SeqCst);
    if state_ptr.is_null() {
        reraise_default(signum);
        return;
    }
    // SAFETY: only ever a pointer from `install`'s `Box::into_raw`.
    let state = unsafe { &*state_ptr };
    match state.prev_handlers.iter().find(|(s, _)| *s == signal) {
        Some((_, prev)) => match prev.handler() {
            SigHandler::SigDfl => {
                unsafe {
                    let _ = signal::sigaction(signal, prev);
                }
                unsafe { libc::raise(signum) };
            }
            SigHandler::SigIgn => (),
            SigHandler::Handler(f) => f(signum),
            SigHandler::SigAction(f) => f(signum, info, ucontext),
        },
        None => reraise_default(signum),
    }
}

fn reraise_default(signum: c_int) {
    if let Ok(signal) = Signal::try_from(signum) {
        unsafe {
            let _ = signal::sigaction(
                signal,
                &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty()),
            );
        }
    }
    unsafe {
        libc::raise(signum);
    }
}

fn signal_name(signum: c_int) -> &'static str {
    match signum {
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        libc::SIGFPE => "SIGFPE",
        libc::SIGILL => "SIGILL",
        libc::SIGBUS => "SIGBUS",
        libc::SIGTRAP => "SIGTRAP",
        _ => "UNKNOWN",
    }
}

fn write_trailer(
    state: &HandlerState,
    signum: c_int,
    info: *const siginfo_t,
    ucontext: *const ucontext_t,
) {
    let fd = unsafe {
        libc::open(
            state.trailer_path.as_ptr(),
            libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
            0o644,
        )
    };
    if fd < 0 {
        return;
    }
    let mut file = RawFd(fd);

    let _ = writeln!(file, "{TRAILER_HEADER}");
    let _ = writeln!(file, "signal_name={}", signal_name(signum));
    let _ = writeln!(file, "signal_number={signum}");

    let fault_addr: usize = if !info.is_null() {
        unsafe { (*info).si_addr() as usize }
    } else {
        0
    };
    let _ = writeln!(file, "fault_address=0x{fault_addr:016x}");
    let _ = writeln!(file, "pid={}", unsafe { libc::getpid() });
    let tid = current_tid();
    let _ = writeln!(file, "tid={tid}");
    // `pthread_getname_np` is not documented async-signal-safe; the numeric
    // fallback the schema allows is used unconditionally here.
    let _ = writeln!(file, "thread_name=thread-{tid}");

    write_registers(&mut file, ucontext);
    write_stack_trace(&mut file);
    write_memory_dump(&mut file, fault_addr);

    let _ = file.flush();
}

#[cfg(target_os = "linux")]
fn current_tid() -> i64 {
    unsafe { libc::syscall(libc::SYS_gettid) }
}

#[cfg(not(target_os = "linux"))]
fn current_tid() -> i64 {
    unsafe { libc::getpid() as i64 }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn write_registers(file: &mut RawFd, ucontext: *const ucontext_t) {
    let _ = writeln!(file, "{TRAILER_BEGIN_REGISTERS}");
    if ucontext.is_null() {
        return;
    }
    // Indices into `mcontext_t.gregs` per <sys/ucontext.h> on x86_64 Linux.
    let gregs = unsafe { (*ucontext).uc_mcontext.gregs };
    let named: [(&str, usize); 7] = [
        ("rip", libc::REG_RIP as usize),
        ("rsp", libc::REG_RSP as usize),
        ("rbp", libc::REG_RBP as usize),
        ("rax", libc::REG_RAX as usize),
        ("rbx", libc::REG_RBX as usize),
        ("rdi", libc::REG_RDI as usize),
        ("rsi", libc::REG_RSI as usize),
    ];
    for (name, idx) in named {
        let _ = writeln!(file, "{name}=0x{:016x}", gregs[idx] as u64);
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn write_registers(file: &mut RawFd, ucontext: *const ucontext_t) {
    let _ = writeln!(file, "{TRAILER_BEGIN_REGISTERS}");
    if ucontext.is_null() {
        return;
    }
    let mctx = unsafe { (*ucontext).uc_mcontext };
    let _ = writeln!(file, "pc=0x{:016x}", mctx.pc);
    let _ = writeln!(file, "sp=0x{:016x}", mctx.sp);
    let _ = writeln!(file, "pstate=0x{:016x}", mctx.pstate);
    // x0-x30: x30 (index 30) doubles as the link register on AArch64.
    for (i, reg) in mctx.regs.iter().enumerate().take(31) {
        let _ = writeln!(file, "x{i}=0x{reg:016x}");
    }
}

#[cfg(not(any(
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "aarch64")
)))]
fn write_registers(file: &mut RawFd, _ucontext: *const ucontext_t) {
    // No stable, async-signal-safe register layout is known for this
    // target; the registers section is left empty rather than guessed at.
    let _ = writeln!(file, "{TRAILER_BEGIN_REGISTERS}");
}

fn write_stack_trace(file: &mut RawFd) {
    let _ = writeln!(file, "{TRAILER_BEGIN_STACKTRACE}");
    let mut frame_no: u32 = 0;
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if frame_no as usize >= NATIVE_STACK_FRAME_LIMIT {
                return false;
            }
            let ip = frame.ip();
            write_frame_line(file, frame_no, ip as usize);
            frame_no += 1;
            true
        });
    }
}

fn write_frame_line(file: &mut RawFd, frame_no: u32, ip: usize) {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    // SAFETY: `dladdr` is reentrant on both glibc and bionic; it performs no
    // allocation and reads only already-mapped, immutable loader metadata.
    let resolved = unsafe { libc::dladdr(ip as *const c_void, &mut info) } != 0;

    let library = if resolved && !info.dli_fname.is_null() {
        unsafe { std::ffi::CStr::from_ptr(info.dli_fname) }
            .to_str()
            .unwrap_or("?")
    } else {
        "?"
    };
    if resolved && !info.dli_sname.is_null() {
        let symbol = unsafe { std::ffi::CStr::from_ptr(info.dli_sname) }
            .to_str()
            .unwrap_or("?");
        let offset = ip.saturating_sub(info.dli_saddr as usize);
        let _ = writeln!(file, "#{frame_no:03} pc 0x{ip:016x} {library} ({symbol}+0x{offset:x})");
    } else {
        let _ = writeln!(file, "#{frame_no:03} pc 0x{ip:016x} {library} (?+0x0)");
    }
}

fn write_memory_dump(file: &mut RawFd, fault_addr: usize) {
    let _ = writeln!(file, "{TRAILER_BEGIN_MEMORY_DUMP}");
    if fault_addr == 0 {
        return;
    }
    let start = fault_addr.saturating_sub(NATIVE_MEMORY_DUMP_RADIUS);
    let mut buf = [0u8; NATIVE_MEMORY_DUMP_RADIUS * 2];

    if !read_process_memory(start, &mut buf) {
        let _ = writeln!(file, "unreadable");
        return;
    }

    for (row, chunk) in buf.chunks(16).enumerate() {
        let _ = write!(file, "0x{:016x}:", start + row * 16);
        for byte in chunk {
            let _ = write!(file, " {byte:02x}");
        }
        let _ = writeln!(file);
    }
}

#[cfg(target_os = "linux")]
fn read_process_memory(addr: usize, buf: &mut [u8]) -> bool {
    let local = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut c_void,
        iov_len: buf.len(),
    };
    let remote = libc::iovec {
        iov_base: addr as *mut c_void,
        iov_len: buf.len(),
    };
    let pid = unsafe { libc::getpid() };
    let n = unsafe { libc::process_vm_readv(pid, &local, 1, &remote, 1, 0) };
    n == buf.len() as isize
}

#[cfg(not(target_os = "linux"))]
fn read_process_memory(_addr: usize, _buf: &mut [u8]) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::default_signals;

    #[test]
    fn install_and_uninstall_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let trailer = dir.path().join("native_crash.txt");
        install(&trailer, &default_signals(), false).expect("install");
        assert!(is_installed());
        uninstall();
        assert!(!is_installed());
    }

    #[test]
    fn signal_name_maps_known_signals() {
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
        assert_eq!(signal_name(libc::SIGABRT), "SIGABRT");
        assert_eq!(signal_name(9999), "UNKNOWN");
    }

    #[test]
    fn enable_disable_toggle_the_atomic_flag() {
        disable();
        assert!(!ENABLED.load(SeqCst));
        enable();
        assert!(ENABLED.load(SeqCst));
        disable();
    }
}
