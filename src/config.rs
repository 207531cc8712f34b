// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Construction-time tunables for a channel. Follows the builder-style
// configuration used elsewhere in this crate (see `ServiceGroupConfig`).

/// Default capacity of each direction's outbound atomic queue. Matches the
/// original `ATOMIC_QUEUE_SIZE` — a power of two, sized so the consumer can
/// fall behind by up to this many messages before the producer sees failure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// The sequence-gap threshold for the (disabled-by-default) skip predicate.
pub const DEFAULT_SKIP_SEQUENCE_GAP: u64 = 1000;

/// Configuration for [`crate::Channel::create`].
///
/// The disabled skip predicates from the signalling design (rule 3 of the
/// coalescing predicate) are gated behind `enable_skips` here instead of a
/// compile-time flag, so a caller can opt in per-channel and measure.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of each direction's outbound queue. Rounded up to a power of
    /// two; must be nonzero.
    pub queue_capacity: usize,
    /// Collapse both endpoints into direct callback invocation with no
    /// queues or signals. See §4.2/§4.5 same-thread short-circuit.
    pub same_thread: bool,
    /// Enable the time-window + sequence-gap throttle of the coalescing
    /// predicate (disabled by default: the thresholds were never tuned in
    /// the original implementation).
    pub enable_skips: bool,
    /// Minimum interval between resignals suppressed by `enable_skips`.
    pub signal_interval: std::time::Duration,
    /// Sequence-gap threshold below which `enable_skips` may suppress a
    /// signal, provided the interval condition above also holds.
    pub skip_sequence_gap: u64,
}

impl ChannelConfig {
    /// A config with the original implementation's defaults: 1024-entry
    /// queues, skip predicates disabled, not same-thread.
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            same_thread: false,
            enable_skips: false,
            signal_interval: std::time::Duration::from_millis(1),
            skip_sequence_gap: DEFAULT_SKIP_SEQUENCE_GAP,
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn same_thread(mut self, same_thread: bool) -> Self {
        self.same_thread = same_thread;
        self
    }

    pub fn enable_skips(mut self, enable: bool) -> Self {
        self.enable_skips = enable;
        self
    }

    pub fn signal_interval(mut self, interval: std::time::Duration) -> Self {
        self.signal_interval = interval;
        self
    }

    pub fn skip_sequence_gap(mut self, gap: u64) -> Self {
        self.skip_sequence_gap = gap;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}
