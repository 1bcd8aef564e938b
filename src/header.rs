use std::sync::atomic::AtomicU32;
use std::sync::OnceLock;

/// Conservative lower bound on the system page size, used only to compute
/// the static [`crate::config::MAX_CAPACITY`] constant at compile time. The
/// actual page size used for rounding and mapping is always queried at
/// runtime via [`page_size`].
pub(crate) const PAGE_RESERVE_UPPER_BOUND: u32 = 4096;

/// The shared control block at the start of the backing file.
///
/// Field order and width are fixed: five `u32` words, little-endian on every
/// platform this crate targets. Two processes that map the same file agree
/// on this layout purely by both linking this crate; there is no on-disk
/// magic number or version field because the buffer is not meant to outlive
/// the pair of processes that negotiated it.
#[repr(C)]
pub(crate) struct Header {
    pub capacity: AtomicU32,
    pub produced: AtomicU32,
    pub produced_waited: AtomicU32,
    pub consumed: AtomicU32,
    pub consumed_waited: AtomicU32,
}

impl Header {
    /// # Safety
    /// `ptr` must point to a live, page-sized shared mapping that will
    /// outlive the returned reference.
    pub(crate) unsafe fn from_ptr<'a>(ptr: *mut u8) -> &'a Header {
        &*ptr.cast::<Header>()
    }
}

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Queries (and caches) `sysconf(_SC_PAGESIZE)`.
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).expect("sysconf(_SC_PAGESIZE) returned a negative value")
    })
}

/// Rounds `size` up to the next multiple of `page_size` (a no-op if already
/// aligned).
pub(crate) fn round_page_up(size: u32, page_size: usize) -> u32 {
    let page_size = page_size as u64;
    let size = u64::from(size);
    let rounded = size.div_ceil(page_size) * page_size;
    u32::try_from(rounded).expect("rounded capacity overflowed u32")
}
