// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-endpoint state (§3, §5). Each `Endpoint<T>` bundles the state for one
// *thread's* view of the channel: its own outbound queue (sent to the peer),
// the peer's queue drained for inbound traffic, and the sequence/ack
// bookkeeping for both. Every field except `their_view_of_my_sequence` has
// exactly one writer — the thread that owns this endpoint — by construction:
// `send_request`/`recv_reply` only ever run on the requestor's endpoint,
// `send_reply`/`recv_request` only ever run on the responder's endpoint (see
// `Channel`'s doc comments for the precise precondition).

use std::any::Any;
use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::atomic_queue::{QueueConsumer, QueueProducer};
use crate::control::ControlPlane;
use crate::message::ChannelMessage;

/// A cell that is `Sync` by assertion rather than by synchronization.
///
/// Every field behind this cell is written only by the single thread that
/// owns the enclosing [`Endpoint`] (see the module doc comment) — the cell
/// exists only so `Channel<T>` can be shared behind an `Arc` and have two
/// threads each call the handful of methods that touch *their* endpoint.
/// This mirrors the original implementation's convention-based single-writer
/// discipline; [`crate::atomic_queue`] is where the per-message cross-thread
/// traffic is actually made safe by real synchronization.
pub(crate) struct OwnerCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for OwnerCell<T> {}

impl<T> OwnerCell<T> {
    fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    /// The caller must be the single thread that owns the enclosing endpoint.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self) -> &mut T {
        &mut *self.0.get()
    }
}

pub(crate) type RecvCallback<T> = Box<dyn FnMut(&mut T) + Send>;

/// Statistics carried on an endpoint, exposed read-only via
/// [`crate::Channel::stats`] for debugging and tests (§3 "debug/observability
/// counters").
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointStats {
    pub sequence: u64,
    pub ack: u64,
    pub num_outstanding: i64,
    pub num_signals: u64,
    pub num_resignals: u64,
    pub num_kevents: u64,
    pub num_packets: u64,
}

/// One thread's full view of a channel: its outbound queue, the peer's
/// inbound queue it drains, and all bookkeeping in between.
pub(crate) struct Endpoint<T> {
    /// This endpoint's outbound data queue (messages this side produces).
    pub(crate) queue_tx: OwnerCell<QueueProducer<T>>,
    /// The peer's outbound queue, drained by this endpoint's owning thread.
    pub(crate) queue_rx: OwnerCell<QueueConsumer<T>>,
    /// Handle to the peer's control-plane inbox, used to wake it.
    pub(crate) peer_control: Arc<dyn ControlPlane>,

    /// Sequence number for messages this endpoint has produced.
    pub(crate) sequence: OwnerCell<u64>,
    /// Highest sequence number seen from the peer.
    pub(crate) ack: OwnerCell<u64>,
    /// Peer's latest acknowledged view of `sequence`, written whenever this
    /// endpoint pops a message carrying a fresh ack, read by the producer
    /// side's coalescing predicate. Atomic purely so introspection
    /// (`Channel::stats`, `debug_dump`) can read it from either thread.
    pub(crate) their_view_of_my_sequence: AtomicU64,
    pub(crate) sequence_at_last_signal: OwnerCell<u64>,

    pub(crate) num_outstanding: OwnerCell<i64>,
    /// Set when a control-plane event indicates the peer just went idle;
    /// forces the next send to signal irrespective of coalescing. Plain
    /// `bool`: only ever touched by this endpoint's owning thread, which is
    /// also the thread that runs `service_message` for records addressed to
    /// this endpoint's inbox (see `Channel::service_message`).
    pub(crate) must_signal: OwnerCell<bool>,

    pub(crate) last_write: OwnerCell<Instant>,
    pub(crate) last_read_other: OwnerCell<Instant>,
    pub(crate) last_sent_signal: OwnerCell<Instant>,
    pub(crate) message_interval: OwnerCell<std::time::Duration>,

    pub(crate) num_signals: OwnerCell<u64>,
    pub(crate) num_resignals: OwnerCell<u64>,
    pub(crate) num_kevents: OwnerCell<u64>,
    pub(crate) num_packets: OwnerCell<u64>,

    pub(crate) recv: OwnerCell<Option<RecvCallback<T>>>,
    pub(crate) uctx: Mutex<Option<Box<dyn Any + Send>>>,
}

impl<T> Endpoint<T> {
    pub(crate) fn new(
        queue_tx: QueueProducer<T>,
        queue_rx: QueueConsumer<T>,
        peer_control: Arc<dyn ControlPlane>,
        now: Instant,
    ) -> Self {
        Self {
            queue_tx: OwnerCell::new(queue_tx),
            queue_rx: OwnerCell::new(queue_rx),
            peer_control,
            sequence: OwnerCell::new(0),
            ack: OwnerCell::new(0),
            their_view_of_my_sequence: AtomicU64::new(0),
            sequence_at_last_signal: OwnerCell::new(0),
            num_outstanding: OwnerCell::new(0),
            must_signal: OwnerCell::new(false),
            last_write: OwnerCell::new(now),
            last_read_other: OwnerCell::new(now),
            last_sent_signal: OwnerCell::new(now),
            message_interval: OwnerCell::new(std::time::Duration::ZERO),
            num_signals: OwnerCell::new(0),
            num_resignals: OwnerCell::new(0),
            num_kevents: OwnerCell::new(0),
            num_packets: OwnerCell::new(0),
            recv: OwnerCell::new(None),
            uctx: Mutex::new(None),
        }
    }

    /// # Safety
    /// Caller must be this endpoint's single owning thread.
    pub(crate) unsafe fn stats(&self) -> EndpointStats {
        EndpointStats {
            sequence: *self.sequence.get(),
            ack: *self.ack.get(),
            num_outstanding: *self.num_outstanding.get(),
            num_signals: *self.num_signals.get(),
            num_resignals: *self.num_resignals.get(),
            num_kevents: *self.num_kevents.get(),
            num_packets: *self.num_packets.get(),
        }
    }
}

/// Fixed-point EMA with inverse-alpha = 8: `new = (sample + 7*old) / 8` (§6
/// "RTT smoothing"). NAKs (zero `sample`) are filtered out by the caller
/// before this is invoked, per §4.3.
pub(crate) fn smooth(old: std::time::Duration, sample: std::time::Duration) -> std::time::Duration {
    const IALPHA: u32 = 8;
    if old.is_zero() {
        return sample;
    }
    (sample + old * (IALPHA - 1)) / IALPHA
}

/// Stamp `sequence`/`ack` onto a message the way `send_request`/`send_reply`
/// do, sharing the bookkeeping the two operations otherwise duplicate.
pub(crate) fn stamp<M: ChannelMessage>(msg: &mut M, sequence: u64, ack: u64) {
    msg.set_sequence(sequence);
    msg.set_ack(ack);
}
