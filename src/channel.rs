// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The channel itself (§2, §4, §6): two opposed atomic queues, their
// sequence/ack accounting, and the wakeup-coalescing signalling protocol
// that keeps a ≥1M msg/s request/response pipe from paying a kernel wakeup
// per message.
//
// `Channel<T>` is shared behind an `Arc` between exactly two threads — the
// requestor and the responder — each of which calls only the handful of
// methods documented as belonging to its side. That discipline, not the type
// system, is what keeps `Endpoint<T>`'s `OwnerCell` fields race-free; see
// `endpoint`'s module doc comment.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::atomic_queue;
use crate::config::ChannelConfig;
use crate::control::{ControlPlane, ControlRecord, Direction, Event, Signal};
use crate::endpoint::{smooth, stamp, Endpoint, EndpointStats};
use crate::error::ChannelError;
use crate::message::ChannelMessage;

/// Read-only snapshot of both endpoints plus the channel-level donated
/// statistics, the Rust-native analogue of the original `fr_channel_debug()`
/// dump, split out so tests can assert on numbers directly (§3).
#[derive(Debug, Clone, Copy)]
pub struct ChannelStats {
    pub requestor: EndpointStats,
    pub responder: EndpointStats,
    pub cpu_time: Duration,
    pub processing_time: Duration,
    pub active: bool,
}

/// A bidirectional request/response channel between one requestor thread and
/// one responder thread (§2).
///
/// Every public method is scoped to one side: `send_request`/`recv_reply`/
/// `signal_open`/`signal_requestor_close`/`requestor_ack_close`/
/// `requestor_uctx_*` must only ever be called from the requestor thread;
/// `send_reply`/`recv_request`/`null_reply`/`responder_sleeping`/
/// `signal_responder_close`/`responder_ack_close`/`responder_uctx_*` only
/// from the responder thread. `service_message`, `is_active`, `stats`, and
/// `debug_dump` may be called from whichever thread owns the control plane a
/// given record arrived on (the first group), or for diagnostics from either
/// thread (the latter two, which only read and may race benignly with the
/// owning threads — see their doc comments).
pub struct Channel<T> {
    id: u64,
    active: AtomicBool,
    same_thread: bool,
    config: ChannelConfig,
    cpu_time_nanos: AtomicU64,
    processing_time_nanos: AtomicU64,
    endpoints: [Endpoint<T>; 2],
}

impl<T: ChannelMessage> Channel<T> {
    /// Create a channel and send the responder its opening `OPEN` signal
    /// (§4.10). `requestor_control`/`responder_control` are each side's own
    /// control-plane inbox — the channel cross-wires them so each endpoint
    /// holds a handle to its *peer's* inbox.
    pub fn create(
        id: u64,
        requestor_control: Arc<dyn ControlPlane>,
        responder_control: Arc<dyn ControlPlane>,
        config: ChannelConfig,
    ) -> Arc<Self> {
        let now = Instant::now();
        let (tx_to_responder, rx_to_responder) = atomic_queue::bounded(config.queue_capacity);
        let (tx_to_requestor, rx_to_requestor) = atomic_queue::bounded(config.queue_capacity);

        let requestor_endpoint = Endpoint::new(tx_to_responder, rx_to_requestor, responder_control, now);
        let responder_endpoint = Endpoint::new(tx_to_requestor, rx_to_responder, requestor_control, now);

        let channel = Arc::new(Self {
            id,
            active: AtomicBool::new(true),
            same_thread: config.same_thread,
            config,
            cpu_time_nanos: AtomicU64::new(0),
            processing_time_nanos: AtomicU64::new(0),
            endpoints: [requestor_endpoint, responder_endpoint],
        });
        if !channel.same_thread {
            channel.signal_open();
        }
        channel
    }

    #[inline]
    fn endpoint(&self, dir: Direction) -> &Endpoint<T> {
        &self.endpoints[dir as usize]
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    // -- data plane: requestor side -----------------------------------

    /// Send a request (§4.2). Consumes `msg`; on failure the message is
    /// handed back alongside the error so the caller can reroute it — the
    /// channel never buffers or retries internally.
    pub fn send_request(&self, mut msg: T) -> Result<(), (T, ChannelError)> {
        if self.same_thread {
            let responder = self.endpoint(Direction::ToRequestor);
            if let Some(cb) = unsafe { responder.recv.get() } {
                cb(&mut msg);
            }
            return Ok(());
        }
        if !self.is_active() {
            return Err((msg, ChannelError::Inactive));
        }

        let ep = self.endpoint(Direction::ToResponder);
        let (sequence, ack) = unsafe { (*ep.sequence.get() + 1, *ep.ack.get()) };
        stamp(&mut msg, sequence, ack);
        let when = msg.when();

        match unsafe { ep.queue_tx.get().push(msg) } {
            Err(returned) => {
                self.drain_replies();
                log::warn!("channel {}: outbound queue to responder full at sequence {}", self.id, sequence);
                Err((returned, ChannelError::QueueFull))
            }
            Ok(()) => {
                unsafe {
                    *ep.sequence.get() = sequence;
                    let interval = ep.message_interval.get();
                    let last_write = ep.last_write.get();
                    *interval = smooth(*interval, when.saturating_duration_since(*last_write));
                    *last_write = when;
                    *ep.num_outstanding.get() += 1;
                    *ep.num_packets.get() += 1;
                }
                self.maybe_signal(Direction::ToResponder, Signal::DataToResponder, when);
                Ok(())
            }
        }
    }

    /// Pop one reply and deliver it to the configured `recv_reply` callback
    /// (§4.3). Returns `false` on an empty queue; callers loop until that.
    pub fn recv_reply(&self) -> bool {
        let ep = self.endpoint(Direction::ToResponder);
        let mut msg = match unsafe { ep.queue_rx.get().pop() } {
            Some(m) => m,
            None => return false,
        };
        unsafe {
            let ack = ep.ack.get();
            debug_assert!(msg.sequence() > *ack, "reply sequence did not advance");
            debug_assert!(msg.sequence() <= *ep.sequence.get(), "reply sequence ahead of what we sent");
            let outstanding = ep.num_outstanding.get();
            debug_assert!(*outstanding > 0, "reply received with no outstanding request");
            *outstanding -= 1;
            *ack = msg.sequence();
            ep.their_view_of_my_sequence.store(msg.ack(), Ordering::Release);
            *ep.last_read_other.get() = msg.when();

            let sample = msg.processing_time();
            if !sample.is_zero() {
                let old = Duration::from_nanos(self.processing_time_nanos.load(Ordering::Relaxed));
                let new = smooth(old, sample);
                self.processing_time_nanos.store(new.as_nanos() as u64, Ordering::Relaxed);
            }
            self.cpu_time_nanos
                .store(msg.cpu_time().as_nanos() as u64, Ordering::Relaxed);

            if let Some(cb) = ep.recv.get() {
                cb(&mut msg);
            }
        }
        true
    }

    // -- data plane: responder side -------------------------------------

    /// Send a reply (§4.5). Refuses with [`ChannelError::Inactive`] if the
    /// channel has been closed; otherwise stamps and pushes, then drains any
    /// pending requests opportunistically and signals per §4.6.
    pub fn send_reply(&self, mut msg: T) -> Result<(), (T, ChannelError)> {
        if !self.is_active() {
            return Err((msg, ChannelError::Inactive));
        }
        if self.same_thread {
            let requestor = self.endpoint(Direction::ToResponder);
            if let Some(cb) = unsafe { requestor.recv.get() } {
                cb(&mut msg);
            }
            return Ok(());
        }

        let ep = self.endpoint(Direction::ToRequestor);
        let (sequence, ack) = unsafe { (*ep.sequence.get() + 1, *ep.ack.get()) };
        stamp(&mut msg, sequence, ack);
        let when = msg.when();

        match unsafe { ep.queue_tx.get().push(msg) } {
            Err(returned) => {
                self.drain_requests();
                log::warn!("channel {}: outbound queue to requestor full at sequence {}", self.id, sequence);
                Err((returned, ChannelError::QueueFull))
            }
            Ok(()) => {
                unsafe {
                    let outstanding = ep.num_outstanding.get();
                    debug_assert!(*outstanding > 0, "reply sent with no outstanding request");
                    *outstanding -= 1;
                    *ep.sequence.get() = sequence;
                    *ep.num_packets.get() += 1;
                    let interval = ep.message_interval.get();
                    let last_write = ep.last_write.get();
                    *interval = smooth(*interval, when.saturating_duration_since(*last_write));
                    *last_write = when;
                }

                while self.recv_request() {}

                if unsafe { *ep.num_outstanding.get() } == 0 {
                    self.emit_signal(Direction::ToRequestor, Signal::DataDoneResponder, when);
                } else {
                    self.maybe_signal(Direction::ToRequestor, Signal::DataToRequestor, when);
                }
                Ok(())
            }
        }
    }

    /// Pop one request and deliver it to the configured `recv_request`
    /// callback (§4.4).
    pub fn recv_request(&self) -> bool {
        let ep = self.endpoint(Direction::ToRequestor);
        let mut msg = match unsafe { ep.queue_rx.get().pop() } {
            Some(m) => m,
            None => return false,
        };
        unsafe {
            let ack = ep.ack.get();
            debug_assert!(msg.sequence() > *ack, "request sequence did not advance");
            debug_assert!(msg.sequence() >= *ep.sequence.get(), "request replied to before receipt");
            *ep.num_outstanding.get() += 1;
            *ack = msg.sequence();
            ep.their_view_of_my_sequence.store(msg.ack(), Ordering::Release);
            *ep.last_read_other.get() = msg.when();
            if let Some(cb) = ep.recv.get() {
                cb(&mut msg);
            }
        }
        true
    }

    /// Drop an inbound request without replying, advancing the outbound
    /// sequence so the requestor never sees a hole in reply numbering (§4.8).
    /// This is intentionally the *only* effect — no queue push, no signal —
    /// per this crate's reading of the original's `null_reply` (see
    /// DESIGN.md Open Question (c)).
    pub fn null_reply(&self) {
        let ep = self.endpoint(Direction::ToRequestor);
        unsafe { *ep.sequence.get() += 1 };
    }

    /// Called by the responder before it parks waiting for more work (§4.9).
    /// Emits `RESPONDER_SLEEPING` only if replies are still outstanding —
    /// otherwise the requestor already knows it sent nothing further and no
    /// signal is needed.
    pub fn responder_sleeping(&self) {
        let ep = self.endpoint(Direction::ToRequestor);
        if unsafe { *ep.num_outstanding.get() } > 0 {
            self.emit_signal(Direction::ToRequestor, Signal::ResponderSleeping, Instant::now());
        }
    }

    // -- open / close (§4.10) --------------------------------------------

    /// Unicast `OPEN` to the responder only, handing over the channel
    /// reference. Called once by `create`.
    pub fn signal_open(&self) {
        let ep = self.endpoint(Direction::ToResponder);
        let record = ControlRecord {
            signal: Signal::Open,
            ack: 0,
            channel_id: self.id,
            direction: None,
        };
        if let Err(err) = ep.peer_control.send(record) {
            log::warn!("channel {}: failed to send OPEN: {}", self.id, err);
        }
    }

    /// Initiate close from the responder side: sets `active=false` and emits
    /// `CLOSE` to the requestor.
    pub fn signal_responder_close(&self) {
        self.initiate_close(Direction::ToRequestor);
    }

    /// Initiate close from the requestor side. Symmetric counterpart to
    /// [`Self::signal_responder_close`] — the original named only the
    /// responder-initiated path, but §3's lifecycle is explicit that either
    /// side may initiate.
    pub fn signal_requestor_close(&self) {
        self.initiate_close(Direction::ToResponder);
    }

    fn initiate_close(&self, initiator: Direction) {
        self.active.store(false, Ordering::Release);
        let ep = self.endpoint(initiator);
        let record = ControlRecord {
            signal: Signal::Close,
            ack: 0,
            channel_id: self.id,
            direction: Some(initiator),
        };
        if let Err(err) = ep.peer_control.send(record) {
            log::warn!("channel {}: failed to send CLOSE: {}", self.id, err);
        }
    }

    /// Acknowledge a `CLOSE` observed by the responder.
    pub fn responder_ack_close(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Acknowledge a `CLOSE` observed by the requestor.
    pub fn requestor_ack_close(&self) {
        self.active.store(false, Ordering::Release);
    }

    // -- control-plane service routine (§4.6, §4.7) ----------------------

    /// Classify one inbound control record into an [`Event`], applying the
    /// side effects of §4.7. Must be called by the thread that owns the
    /// control-plane inbox the record arrived on: `DATA_DONE_RESPONDER` and
    /// `RESPONDER_SLEEPING` only ever arrive at the requestor's inbox (the
    /// responder sends them through the requestor's peer handle), so it is
    /// always the requestor thread that sets `must_signal` here — the same
    /// precondition the original relies on for its producer-only
    /// `must_signal` flag (see `endpoint`'s module doc comment).
    pub fn service_message(&self, now: Instant, record: ControlRecord) -> Event {
        match record.signal {
            Signal::Error => Event::Error,
            Signal::DataToResponder => Event::DataReadyResponder,
            Signal::DataToRequestor => Event::DataReadyRequestor,
            Signal::Open => Event::Open,
            Signal::Close => Event::Close,
            Signal::DataDoneResponder | Signal::ResponderSleeping => {
                let ep = self.endpoint(Direction::ToResponder);
                unsafe { *ep.must_signal.get() = true };
                let sequence = unsafe { *ep.sequence.get() };
                if record.ack < sequence {
                    self.emit_signal(Direction::ToResponder, Signal::DataToResponder, now);
                    unsafe { *ep.num_resignals.get() += 1 };
                }
                if record.signal == Signal::DataDoneResponder {
                    Event::DataReadyRequestor
                } else {
                    Event::Noop
                }
            }
        }
    }

    /// Record that the owning thread's control-plane wait primitive woke it
    /// for this channel — the analogue of `fr_channel_service_kevent`'s
    /// `num_kevents` bookkeeping (§4 implementation notes). `owner` is the
    /// direction whose endpoint the calling thread owns.
    pub fn note_control_plane_wakeup(&self, owner: Direction) {
        let ep = self.endpoint(owner);
        unsafe { *ep.num_kevents.get() += 1 };
    }

    // -- coalescing predicate (§4.6) --------------------------------------

    fn maybe_signal(&self, dir: Direction, signal: Signal, when: Instant) {
        let ep = self.endpoint(dir);
        if unsafe { *ep.must_signal.get() } {
            self.emit_signal(dir, signal, when);
            return;
        }

        let sequence_at_last_signal = unsafe { *ep.sequence_at_last_signal.get() };
        let their_view = ep.their_view_of_my_sequence.load(Ordering::Acquire);
        if sequence_at_last_signal > their_view {
            // A prior signal is still unconsumed from the peer's perspective.
            return;
        }

        if self.config.enable_skips {
            let last_sent_signal = unsafe { *ep.last_sent_signal.get() };
            let sequence = unsafe { *ep.sequence.get() };
            let gap = sequence.saturating_sub(their_view);
            let signalled_recently = when.saturating_duration_since(last_sent_signal) < self.config.signal_interval;
            if signalled_recently && gap < self.config.skip_sequence_gap {
                return;
            }
        }

        self.emit_signal(dir, signal, when);
    }

    fn emit_signal(&self, dir: Direction, signal: Signal, when: Instant) {
        let ep = self.endpoint(dir);
        let (ack, sequence) = unsafe {
            *ep.sequence_at_last_signal.get() = *ep.sequence.get();
            *ep.last_sent_signal.get() = when;
            *ep.num_signals.get() += 1;
            *ep.must_signal.get() = false;
            (*ep.ack.get(), *ep.sequence.get())
        };
        log::debug!("channel {}: emitting {:?} at sequence {}", self.id, signal, sequence);
        let record = ControlRecord {
            signal,
            ack,
            channel_id: self.id,
            direction: None,
        };
        if let Err(err) = ep.peer_control.send(record) {
            log::warn!("channel {}: control-plane send failed: {}", self.id, err);
        }
    }

    fn drain_replies(&self) {
        while self.recv_reply() {}
    }

    fn drain_requests(&self) {
        while self.recv_request() {}
    }

    // -- callbacks and user contexts --------------------------------------

    pub fn set_recv_reply(&self, cb: impl FnMut(&mut T) + Send + 'static) {
        let ep = self.endpoint(Direction::ToResponder);
        unsafe { *ep.recv.get() = Some(Box::new(cb)) };
    }

    pub fn set_recv_request(&self, cb: impl FnMut(&mut T) + Send + 'static) {
        let ep = self.endpoint(Direction::ToRequestor);
        unsafe { *ep.recv.get() = Some(Box::new(cb)) };
    }

    /// Replace the responder's opaque user context (§3 `uctx`; distinct from
    /// the `recv_uctx` the original pairs with the callback — here the
    /// callback closure captures its own state, the idiomatic Rust
    /// replacement for a `void*` bound to a function pointer, so only the
    /// general-purpose `uctx` slot needs an explicit API).
    pub fn responder_uctx_add(&self, uctx: Box<dyn Any + Send>) {
        *self.endpoint(Direction::ToRequestor).uctx.lock().unwrap() = Some(uctx);
    }

    pub fn requestor_uctx_add(&self, uctx: Box<dyn Any + Send>) {
        *self.endpoint(Direction::ToResponder).uctx.lock().unwrap() = Some(uctx);
    }

    /// Run `f` with mutable access to the responder's user context, if set.
    pub fn responder_uctx_with<R>(&self, f: impl FnOnce(Option<&mut (dyn Any + Send)>) -> R) -> R {
        let mut guard = self.endpoint(Direction::ToRequestor).uctx.lock().unwrap();
        f(guard.as_deref_mut())
    }

    pub fn requestor_uctx_with<R>(&self, f: impl FnOnce(Option<&mut (dyn Any + Send)>) -> R) -> R {
        let mut guard = self.endpoint(Direction::ToResponder).uctx.lock().unwrap();
        f(guard.as_deref_mut())
    }

    // -- observability ------------------------------------------------------

    /// Snapshot both endpoints' counters plus donated cpu/processing time.
    ///
    /// Reads every field without synchronizing with the owning threads (only
    /// `their_view_of_my_sequence`/`active`/the two donated-time fields are
    /// real atomics) — intended for diagnostics and tests, not for decisions
    /// the channel's correctness depends on.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            requestor: unsafe { self.endpoint(Direction::ToResponder).stats() },
            responder: unsafe { self.endpoint(Direction::ToRequestor).stats() },
            cpu_time: Duration::from_nanos(self.cpu_time_nanos.load(Ordering::Relaxed)),
            processing_time: Duration::from_nanos(self.processing_time_nanos.load(Ordering::Relaxed)),
            active: self.is_active(),
        }
    }

    /// Human-readable dump of `stats()`, the analogue of `fr_channel_debug`.
    pub fn debug_dump(&self, mut writer: impl std::io::Write) -> std::io::Result<()> {
        let s = self.stats();
        writeln!(writer, "channel {} active={}", self.id, s.active)?;
        writeln!(
            writer,
            "  requestor: sequence={} ack={} outstanding={} signals={} resignals={} kevents={} packets={}",
            s.requestor.sequence,
            s.requestor.ack,
            s.requestor.num_outstanding,
            s.requestor.num_signals,
            s.requestor.num_resignals,
            s.requestor.num_kevents,
            s.requestor.num_packets,
        )?;
        writeln!(
            writer,
            "  responder: sequence={} ack={} outstanding={} signals={} resignals={} kevents={} packets={}",
            s.responder.sequence,
            s.responder.ack,
            s.responder.num_outstanding,
            s.responder.num_signals,
            s.responder.num_resignals,
            s.responder.num_kevents,
            s.responder.num_packets,
        )?;
        writeln!(writer, "  cpu_time={:?} processing_time={:?}", s.cpu_time, s.processing_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::LocalControlPlane;
    use crate::message::Envelope;

    fn new_test_channel() -> (Arc<Channel<Envelope<u32>>>, Arc<LocalControlPlane>, Arc<LocalControlPlane>) {
        let requestor_control = LocalControlPlane::new();
        let responder_control = LocalControlPlane::new();
        let channel = Channel::create(
            1,
            requestor_control.clone(),
            responder_control.clone(),
            ChannelConfig::new(),
        );
        (channel, requestor_control, responder_control)
    }

    #[test]
    fn create_sends_open_to_responder_only() {
        let (_channel, requestor_control, responder_control) = new_test_channel();
        assert!(requestor_control.is_empty());
        assert_eq!(responder_control.len(), 1);
        assert_eq!(responder_control.try_recv().unwrap().signal, Signal::Open);
    }

    #[test]
    fn ping_pong_round_trip_updates_accounting() {
        let (channel, _rc, _sc) = new_test_channel();
        channel.send_request(Envelope::new(1)).unwrap();
        assert_eq!(channel.stats().requestor.num_outstanding, 1);

        assert!(channel.recv_request());
        assert_eq!(channel.stats().responder.num_outstanding, 1);

        channel.send_reply(Envelope::new(2)).unwrap();
        assert_eq!(channel.stats().responder.num_outstanding, 0);

        assert!(channel.recv_reply());
        assert_eq!(channel.stats().requestor.num_outstanding, 0);
        assert_eq!(channel.stats().requestor.ack, 1);
    }

    #[test]
    fn same_thread_channel_never_signals() {
        let requestor_control = LocalControlPlane::new();
        let responder_control = LocalControlPlane::new();
        let channel: Arc<Channel<Envelope<u32>>> = Channel::create(
            2,
            requestor_control.clone(),
            responder_control.clone(),
            ChannelConfig::new().same_thread(true),
        );
        channel.set_recv_request(|msg| msg.payload += 1);
        channel.send_request(Envelope::new(41)).unwrap();
        assert_eq!(channel.stats().requestor.num_signals, 0);
        assert!(responder_control.is_empty());
    }

    #[test]
    fn null_reply_only_advances_sequence() {
        let (channel, _rc, _sc) = new_test_channel();
        channel.send_request(Envelope::new(5)).unwrap();
        assert!(channel.recv_request());
        channel.null_reply();
        assert_eq!(channel.stats().responder.sequence, 1);
        assert_eq!(channel.stats().responder.num_packets, 0);
    }

    #[test]
    fn send_reply_after_close_is_inactive() {
        let (channel, _rc, _sc) = new_test_channel();
        channel.signal_responder_close();
        assert!(!channel.is_active());
        let err = channel.send_reply(Envelope::new(1)).unwrap_err().1;
        assert!(matches!(err, ChannelError::Inactive));
    }

    #[test]
    fn full_queue_reports_error_and_returns_ownership() {
        let (channel, _rc, _sc) = new_test_channel();
        for i in 0..crate::config::DEFAULT_QUEUE_CAPACITY {
            channel.send_request(Envelope::new(i as u32)).unwrap();
        }
        let err = channel.send_request(Envelope::new(999)).unwrap_err();
        assert_eq!(err.0.payload, 999);
        assert!(matches!(err.1, ChannelError::QueueFull));
    }
}
