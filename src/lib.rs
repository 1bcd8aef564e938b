//! ringspsc: a single-producer/single-consumer byte ring buffer backed by
//! a shared file.
//!
//! Two processes on the same host open the same path; whichever one first
//! supplies a non-zero capacity wins the negotiation (or both race and the
//! loser silently adopts the winner's value), and the other blocks until a
//! capacity is published. From there, one side calls [`RingBuffer::get_free`]
//! / [`RingBuffer::add`] to write, the other calls [`RingBuffer::get_data`] /
//! [`RingBuffer::del`] to read. Both calls can block until enough space or
//! data is available, or return immediately when the caller passes a
//! requested size of zero.
//!
//! Under the hood the data region is mapped twice, back to back, so that any
//! window the producer or consumer is handed is contiguous in virtual
//! memory even when it straddles the wrap point. Blocking is implemented
//! with a Linux futex on the shared `produced`/`consumed` counters, with a
//! sticky "someone is waiting" hint flag so the common unblocked case never
//! pays for a wake syscall.
//!
//! ```no_run
//! use ringspsc::{OpenOptions, RingBuffer};
//!
//! let producer = RingBuffer::open("/dev/shm/example", OpenOptions::new(1 << 16))?;
//! let mut size = 5;
//! let ptr = producer.get_free(&mut size);
//! unsafe { std::ptr::copy_nonoverlapping(b"hello".as_ptr(), ptr, 5) };
//! producer.add(5);
//! # Ok::<(), ringspsc::OpenError>(())
//! ```

mod config;
mod error;
mod header;
mod index;
mod invariants;
mod mapper;
mod metrics;
mod ring;
mod waiter;

pub use config::{OpenOptions, MAX_CAPACITY};
pub use error::OpenError;
pub use metrics::Metrics;
pub use ring::RingBuffer;
