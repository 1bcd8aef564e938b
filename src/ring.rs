//! The ring buffer handle: capacity negotiation, the producer/consumer
//! index protocol, and the blocking `get_free`/`get_data` calls.
//!
//! # Memory ordering
//!
//! The producer is the sole writer of `produced`; the consumer is the sole
//! writer of `consumed`. A producer reads `consumed` with `Acquire` before
//! computing free space and writes `produced` with `Release` after filling
//! bytes, so that any consumer observing the new `produced` also observes
//! the bytes written into the data region. The consumer's `del` is the
//! mirror image. `produced_waited` and `consumed_waited` are read and
//! written with `Relaxed` ordering: they are hints, and correctness does not
//! depend on their ordering because [`crate::waiter::wait`] re-checks the
//! guarded counter itself before blocking.
//!
//! Every call re-derives free/used bytes from the shared counters rather
//! than trusting a process-local cache, since the whole point of this
//! structure is that the counters are the only thing two different
//! processes actually share.

use std::cell::Cell;
use std::fs::{File, OpenOptions as FsOpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::Ordering;

use log::{debug, trace};

use crate::config::OpenOptions;
use crate::error::{fatal, FatalError, OpenError};
use crate::header::{self, Header};
use crate::index;
use crate::invariants::{
    debug_assert_capacity_unchanged, debug_assert_monotonic, debug_assert_occupancy_bound,
};
use crate::mapper::{HeaderMapping, Mapping};
use crate::metrics::Metrics;
use crate::waiter;

/// A handle to one end of a file-backed SPSC ring buffer.
///
/// A single handle is meant to be driven by a single thread: call the
/// producer methods (`get_free`, `add`) from whichever process/thread
/// produces, and the consumer methods (`get_data`, `del`) from whichever
/// consumes. Nothing prevents a single handle from calling both, but doing
/// so from more than one thread concurrently without external
/// synchronization breaks the single-writer assumption the protocol relies
/// on.
pub struct RingBuffer {
    mapping: Mapping,
    capacity: u32,
    metrics_enabled: bool,
    metrics: Cell<Metrics>,
    last_free_report: Cell<u32>,
    last_used_report: Cell<u32>,
}

impl RingBuffer {
    /// Opens or creates the backing file at `path` and negotiates capacity
    /// with whichever peer gets there first.
    ///
    /// See the crate-level docs for the full ten-step sequence this
    /// performs: file creation, the capacity compare-and-exchange (or wait)
    /// handshake, the crash-recovery wakes, and installing the double
    /// mapping.
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self, OpenError> {
        options.validate()?;
        let path = path.as_ref();

        let file = FsOpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| OpenError::CannotOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let page_size = header::page_size();
        let fd = file.as_raw_fd();

        ensure_len_at_least(&file, path, page_size as u64)?;

        let negotiated_capacity = {
            let header_map = HeaderMapping::map(fd, page_size);
            let header = header_map.header();

            let capacity = negotiate_capacity(header, &options, page_size);

            if header.produced_waited.load(Ordering::Relaxed) != 0 {
                debug!("open: waking a producer stuck waiting for free space (crash recovery)");
                waiter::wake(&header.produced);
            }
            if header.consumed_waited.load(Ordering::Relaxed) != 0 {
                debug!("open: waking a consumer stuck waiting for data (crash recovery)");
                waiter::wake(&header.consumed);
            }

            capacity
        };

        ensure_len_at_least(&file, path, page_size as u64 + u64::from(negotiated_capacity))?;

        let mapping = unsafe { Mapping::install(fd, page_size, negotiated_capacity) };

        Ok(Self {
            mapping,
            capacity: negotiated_capacity,
            metrics_enabled: options.metrics_enabled(),
            metrics: Cell::new(Metrics::new()),
            last_free_report: Cell::new(0),
            last_used_report: Cell::new(0),
        })
    }

    /// The negotiated capacity, constant for the lifetime of this handle.
    pub fn get_capacity(&self) -> u32 {
        debug_assert_capacity_unchanged!(
            self.header().capacity.load(Ordering::Relaxed),
            self.capacity
        );
        self.capacity
    }

    /// Returns a pointer to the start of the producer's free window.
    ///
    /// If `*size > 0`, blocks until at least `*size` bytes are free, then
    /// sets `*size` to the (possibly larger) actual free count. If
    /// `*size == 0`, returns immediately with the current free count, which
    /// may be zero.
    pub fn get_free(&self, size: &mut u32) -> *mut u8 {
        let header = self.header();
        let produced = header.produced.load(Ordering::Relaxed);
        let requested = *size;

        loop {
            let consumed = header.consumed.load(Ordering::Acquire);
            let free = index::free(self.capacity, produced, consumed);

            if requested == 0 || free >= requested {
                *size = free;
                self.last_free_report.set(free);
                return self.mapping.data_ptr(produced % self.capacity);
            }

            trace!("get_free: blocking, have {free} need {requested}");
            header.consumed_waited.store(1, Ordering::Relaxed);
            self.with_metrics(|m| m.producer_blocks += 1);
            waiter::wait(&header.consumed, consumed);
            header.consumed_waited.store(0, Ordering::Relaxed);
        }
    }

    /// Publishes `size` bytes previously written into the window returned
    /// by [`get_free`](Self::get_free).
    ///
    /// `size` must not exceed the free count most recently reported by
    /// `get_free`; violating this corrupts the stream silently in release
    /// builds (debug builds assert it).
    pub fn add(&self, size: u32) {
        debug_assert!(
            size <= self.last_free_report.get(),
            "add({size}) exceeds last reported free window ({})",
            self.last_free_report.get()
        );

        let header = self.header();
        let produced = header.produced.load(Ordering::Relaxed);
        let new_produced = produced.wrapping_add(size);
        debug_assert_monotonic!(produced, new_produced);
        let consumed = header.consumed.load(Ordering::Relaxed);
        debug_assert_occupancy_bound!(new_produced, consumed, self.capacity);

        header.produced.store(new_produced, Ordering::Release);
        self.with_metrics(|m| m.bytes_produced += u64::from(size));

        if header.produced_waited.load(Ordering::Relaxed) != 0 {
            waiter::wake(&header.produced);
            self.with_metrics(|m| m.wakes_sent += 1);
        }
    }

    /// Returns a pointer to the start of the consumer's readable window.
    ///
    /// Symmetric to [`get_free`](Self::get_free): blocks on `*size > 0`
    /// until enough data is available, or returns immediately on
    /// `*size == 0`.
    pub fn get_data(&self, size: &mut u32) -> *mut u8 {
        let header = self.header();
        let consumed = header.consumed.load(Ordering::Relaxed);
        let requested = *size;

        loop {
            let produced = header.produced.load(Ordering::Acquire);
            let used = index::used(produced, consumed);

            if requested == 0 || used >= requested {
                *size = used;
                self.last_used_report.set(used);
                return self.mapping.data_ptr(consumed % self.capacity);
            }

            trace!("get_data: blocking, have {used} need {requested}");
            header.produced_waited.store(1, Ordering::Relaxed);
            self.with_metrics(|m| m.consumer_blocks += 1);
            waiter::wait(&header.produced, produced);
            header.produced_waited.store(0, Ordering::Relaxed);
        }
    }

    /// Releases `size` bytes previously read from the window returned by
    /// [`get_data`](Self::get_data).
    pub fn del(&self, size: u32) {
        debug_assert!(
            size <= self.last_used_report.get(),
            "del({size}) exceeds last reported used window ({})",
            self.last_used_report.get()
        );

        let header = self.header();
        let consumed = header.consumed.load(Ordering::Relaxed);
        let new_consumed = consumed.wrapping_add(size);
        debug_assert_monotonic!(consumed, new_consumed);
        let produced = header.produced.load(Ordering::Relaxed);
        debug_assert_occupancy_bound!(produced, new_consumed, self.capacity);

        header.consumed.store(new_consumed, Ordering::Release);
        self.with_metrics(|m| m.bytes_consumed += u64::from(size));

        if header.consumed_waited.load(Ordering::Relaxed) != 0 {
            waiter::wake(&header.consumed);
            self.with_metrics(|m| m.wakes_sent += 1);
        }
    }

    /// Unmaps the buffer. Does not delete the backing file; any other
    /// process with its own handle is unaffected.
    pub fn close(self) {
        // Dropping `self.mapping` performs the unmap.
    }

    /// A snapshot of this handle's best-effort counters. Always zero unless
    /// metrics were enabled via [`OpenOptions::with_metrics`].
    pub fn metrics(&self) -> Metrics {
        self.metrics.get()
    }

    fn header(&self) -> &Header {
        self.mapping.header()
    }

    fn with_metrics(&self, f: impl FnOnce(&mut Metrics)) {
        if self.metrics_enabled {
            let mut m = self.metrics.get();
            f(&mut m);
            self.metrics.set(m);
        }
    }
}

fn ensure_len_at_least(file: &File, path: &Path, len: u64) -> Result<(), OpenError> {
    let current = file
        .metadata()
        .map_err(|source| OpenError::CannotOpen {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if current < len {
        if let Err(e) = file.set_len(len) {
            fatal(FatalError::Truncate(e));
        }
    }
    Ok(())
}

/// Step 4 of the open sequence: publish or adopt the negotiated capacity.
fn negotiate_capacity(header: &Header, options: &OpenOptions, page_size: usize) -> u32 {
    let requested = options.requested_capacity();

    if requested == 0 {
        loop {
            let current = header.capacity.load(Ordering::Acquire);
            if current != 0 {
                return current;
            }
            waiter::wait(&header.capacity, 0);
        }
    }

    let rounded = header::round_page_up(requested, page_size);
    match header
        .capacity
        .compare_exchange(0, rounded, Ordering::AcqRel, Ordering::Acquire)
    {
        Ok(_) => {
            debug!("open: published new capacity {rounded}");
            waiter::wake(&header.capacity);
            rounded
        }
        Err(existing) => {
            debug!("open: adopting existing capacity {existing} (requested {rounded})");
            waiter::wake(&header.capacity);
            existing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn simple_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring");

        let producer = RingBuffer::open(&path, OpenOptions::new(8192)).unwrap();
        let mut free = 4;
        let ptr = producer.get_free(&mut free);
        assert!(free >= 4);
        unsafe {
            std::ptr::copy_nonoverlapping(b"ping".as_ptr(), ptr, 4);
        }
        producer.add(4);

        let consumer = RingBuffer::open(&path, OpenOptions::new(0)).unwrap();
        let mut used = 4;
        let ptr = consumer.get_data(&mut used);
        assert!(used >= 4);
        let mut buf = [0u8; 4];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, buf.as_mut_ptr(), 4);
        }
        assert_eq!(&buf, b"ping");
        consumer.del(4);

        producer.close();
        consumer.close();
    }

    #[test]
    fn wrap_around_is_contiguous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring");

        let rb = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
        let capacity = rb.get_capacity();

        let mut free = 3000;
        let ptr = rb.get_free(&mut free);
        let chunk = vec![7u8; 3000];
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, 3000);
        }
        rb.add(3000);

        let mut used = 3000;
        let ptr = rb.get_data(&mut used);
        let mut read_back = vec![0u8; 3000];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, read_back.as_mut_ptr(), 3000);
        }
        assert_eq!(read_back, chunk);
        rb.del(3000);

        // Now produced=3000, consumed=3000; the next 2000-byte write wraps
        // past the end of the data region at offset capacity.
        let mut free = 2000;
        let ptr = rb.get_free(&mut free);
        assert!(free >= 2000);
        let chunk2 = vec![9u8; 2000];
        unsafe {
            std::ptr::copy_nonoverlapping(chunk2.as_ptr(), ptr, 2000);
        }
        rb.add(2000);

        let mut used = 2000;
        let ptr = rb.get_data(&mut used);
        let mut read_back2 = vec![0u8; 2000];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, read_back2.as_mut_ptr(), 2000);
        }
        assert_eq!(read_back2, chunk2);
        rb.del(2000);

        assert_eq!(capacity, 4096);
        rb.close();
    }

    #[test]
    fn non_blocking_reports_zero_on_empty_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring");

        let rb = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
        let mut used = 0;
        rb.get_data(&mut used);
        assert_eq!(used, 0);

        let mut free = 0;
        rb.get_free(&mut free);
        assert_eq!(free, rb.get_capacity());

        rb.close();
    }

    #[test]
    fn producer_blocks_until_consumer_frees_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring");

        let producer = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
        let capacity = producer.get_capacity();

        let mut free = capacity;
        let ptr = producer.get_free(&mut free);
        let chunk = vec![1u8; capacity as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, capacity as usize);
        }
        producer.add(capacity);

        let consumer_path = path.clone();
        let consumer_thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let consumer = RingBuffer::open(&consumer_path, OpenOptions::new(0)).unwrap();
            let mut used = 1;
            consumer.get_data(&mut used);
            consumer.del(1);
            consumer.close();
        });

        let mut free = 1;
        let ptr = producer.get_free(&mut free);
        assert!(free >= 1);
        unsafe {
            std::ptr::write(ptr, 2u8);
        }
        producer.add(1);

        consumer_thread.join().unwrap();
        producer.close();
    }

    #[test]
    fn reader_opening_first_blocks_until_writer_publishes_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring");

        let reader_path = path.clone();
        let reader_thread = thread::spawn(move || {
            let rb = RingBuffer::open(&reader_path, OpenOptions::new(0)).unwrap();
            rb.get_capacity()
        });

        thread::sleep(Duration::from_millis(50));
        let writer = RingBuffer::open(&path, OpenOptions::new(5000)).unwrap();
        let writer_capacity = writer.get_capacity();

        let reader_capacity = reader_thread.join().unwrap();
        assert_eq!(reader_capacity, writer_capacity);
        assert_eq!(writer_capacity, header::round_page_up(5000, header::page_size()));

        writer.close();
    }
}
