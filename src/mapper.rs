//! The address-space mapper: installs the shared header page and the
//! double-mapped data region described in the crate's top-level docs.
//!
//! The trick is to reserve one contiguous virtual range big enough for the
//! header plus two copies of the data region, then overlay two `MAP_FIXED`
//! shared mappings of the same file inside that reservation so the data
//! region aliases itself immediately past its own end. Any producer/consumer
//! window of up to `capacity` bytes starting anywhere in `[0, capacity)` is
//! then contiguous in virtual memory, wrap or no wrap.

use std::os::unix::io::RawFd;
use std::ptr;

use crate::error::{fatal, FatalError};
use crate::header::Header;

/// A temporary mapping of just the header page, used while two peers are
/// still negotiating `capacity` and before the file has necessarily grown to
/// its full size.
pub(crate) struct HeaderMapping {
    base: *mut u8,
    len: usize,
}

impl HeaderMapping {
    pub(crate) fn map(fd: RawFd, page_size: usize) -> Self {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            fatal(FatalError::Mmap(std::io::Error::last_os_error()));
        }
        Self {
            base: base.cast::<u8>(),
            len: page_size,
        }
    }

    pub(crate) fn header(&self) -> &Header {
        unsafe { Header::from_ptr(self.base) }
    }
}

impl Drop for HeaderMapping {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            fatal(FatalError::Munmap(std::io::Error::last_os_error()));
        }
    }
}

/// The full triple mapping: `page_size` bytes of header followed by two
/// back-to-back copies of the `capacity`-byte data region.
pub(crate) struct Mapping {
    base: *mut u8,
    page_size: usize,
    capacity: u32,
}

impl Mapping {
    /// Installs the reservation + two overlays described above.
    ///
    /// # Safety
    /// `fd` must refer to a file at least `page_size + capacity` bytes long.
    pub(crate) unsafe fn install(fd: RawFd, page_size: usize, capacity: u32) -> Self {
        let capacity_usize = capacity as usize;
        let total_len = page_size + 2 * capacity_usize;

        let reservation = libc::mmap(
            ptr::null_mut(),
            total_len,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if reservation == libc::MAP_FAILED {
            fatal(FatalError::Mmap(std::io::Error::last_os_error()));
        }
        let base = reservation.cast::<u8>();

        let primary_len = page_size + capacity_usize;
        let primary = libc::mmap(
            base.cast::<libc::c_void>(),
            primary_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_FIXED,
            fd,
            0,
        );
        if primary == libc::MAP_FAILED {
            fatal(FatalError::Mmap(std::io::Error::last_os_error()));
        }

        if capacity_usize > 0 {
            let mirror = libc::mmap(
                base.add(primary_len).cast::<libc::c_void>(),
                capacity_usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                page_size as libc::off_t,
            );
            if mirror == libc::MAP_FAILED {
                fatal(FatalError::Mmap(std::io::Error::last_os_error()));
            }
        }

        Self {
            base,
            page_size,
            capacity,
        }
    }

    pub(crate) fn header(&self) -> &Header {
        unsafe { Header::from_ptr(self.base) }
    }

    /// Returns a pointer to `len` bytes starting at ring offset `offset`,
    /// valid to dereference contiguously even when `offset + len` would
    /// otherwise wrap past `capacity`.
    pub(crate) fn data_ptr(&self, offset: u32) -> *mut u8 {
        unsafe { self.base.add(self.page_size + offset as usize) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        let total_len = self.page_size + 2 * self.capacity as usize;
        let rc = unsafe { libc::munmap(self.base.cast::<libc::c_void>(), total_len) };
        if rc != 0 {
            fatal(FatalError::Munmap(std::io::Error::last_os_error()));
        }
    }
}

unsafe impl Send for Mapping {}
