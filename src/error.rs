use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to create or attach to a ring buffer's backing file.
///
/// This is the only error the public API ever hands back to a caller; every
/// other internal syscall failure is treated as [`FatalError`] and aborts the
/// process instead (see the module docs on [`crate::ring`]).
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open backing file {path}: {source}")]
    CannotOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("requested capacity {requested} exceeds the usable range (max {max})")]
    CapacityTooLarge { requested: u32, max: u32 },
}

/// Internal syscall failures that violate an assumption the core relies on.
///
/// Never returned from a public function. Each variant exists so panic sites
/// format consistently; the only consumer of this type is `panic!`.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("mmap failed: {0}")]
    Mmap(#[source] io::Error),

    #[error("munmap failed: {0}")]
    Munmap(#[source] io::Error),

    #[error("ftruncate failed: {0}")]
    Truncate(#[source] io::Error),

    #[error("futex wait failed: {0}")]
    Wait(#[source] io::Error),

    #[error("futex wake failed: {0}")]
    Wake(#[source] io::Error),
}

/// Panics with a [`FatalError`], matching the reference implementation's
/// policy of treating these as unrecoverable rather than threading a result
/// through every syscall call site.
pub(crate) fn fatal(err: FatalError) -> ! {
    panic!("ringspsc: fatal internal error: {err}");
}
