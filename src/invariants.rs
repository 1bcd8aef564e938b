//! Debug-only runtime checks for the index protocol's core invariants.
//!
//! These compile to nothing in release builds; they exist to catch protocol
//! violations (a caller advancing `produced`/`consumed` past what was last
//! reported, a `capacity` that moves after publication) during testing
//! rather than letting them manifest as silent corruption later.

/// INV-OCC-01: `0 <= produced.wrapping_sub(consumed) <= capacity` must hold
/// after every `add` or `del`.
///
/// Used in: `Ring::add`, `Ring::del`.
macro_rules! debug_assert_occupancy_bound {
    ($produced:expr, $consumed:expr, $capacity:expr) => {
        debug_assert!(
            $produced.wrapping_sub($consumed) <= $capacity,
            "occupancy bound violated: produced={} consumed={} capacity={}",
            $produced,
            $consumed,
            $capacity
        );
    };
}

/// INV-MONO-01: a freshly stored counter value must never be "behind" the
/// value it replaces, modulo 2^32.
///
/// Used in: `Ring::add`, `Ring::del`.
macro_rules! debug_assert_monotonic {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new.wrapping_sub($old) < u32::MAX / 2,
            "counter moved backwards: old={} new={}",
            $old,
            $new
        );
    };
}

/// INV-CAP-01: capacity is immutable once published non-zero.
///
/// Used in: `Ring::negotiate_capacity`.
macro_rules! debug_assert_capacity_unchanged {
    ($observed:expr, $negotiated:expr) => {
        debug_assert_eq!(
            $observed, $negotiated,
            "capacity changed after publication: observed={} negotiated={}",
            $observed, $negotiated
        );
    };
}

pub(crate) use debug_assert_capacity_unchanged;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_occupancy_bound;
