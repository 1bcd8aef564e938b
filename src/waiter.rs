//! The wait/wake coordinator: a thin wrapper over Linux `FUTEX_WAIT` /
//! `FUTEX_WAKE`, used to block a producer or consumer on a 32-bit counter
//! shared across processes.

use std::sync::atomic::AtomicU32;

use log::trace;

use crate::error::{fatal, FatalError};

/// Blocks the calling thread while `*addr == expected`, otherwise returns
/// immediately.
///
/// A `FUTEX_WAIT` that fails with `EAGAIN` means the value had already
/// changed by the time the kernel checked it, indistinguishable from a
/// real wakeup for our purposes, since the caller always re-checks the
/// counter in a loop. `EINTR` is treated the same way: just re-enter the
/// caller's loop.
pub(crate) fn wait(addr: &AtomicU32, expected: u32) {
    trace!("futex wait: addr={:p} expected={expected}", addr);
    loop {
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                addr as *const AtomicU32,
                libc::FUTEX_WAIT,
                expected,
                std::ptr::null::<libc::timespec>(),
            )
        };
        if rc == 0 {
            return;
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => return,
            _ => fatal(FatalError::Wait(err)),
        }
    }
}

/// Wakes every waiter currently blocked on `addr`.
pub(crate) fn wake(addr: &AtomicU32) {
    trace!("futex wake: addr={:p}", addr);
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32,
            libc::FUTEX_WAKE,
            i32::MAX,
        )
    };
    if rc < 0 {
        fatal(FatalError::Wake(std::io::Error::last_os_error()));
    }
}
