/// Lightweight, best-effort counters for a single [`crate::RingBuffer`]
/// handle. Collection is gated by [`crate::OpenOptions::with_metrics`] and
/// costs nothing when disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub bytes_produced: u64,
    pub bytes_consumed: u64,
    pub producer_blocks: u64,
    pub consumer_blocks: u64,
    pub wakes_sent: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}
