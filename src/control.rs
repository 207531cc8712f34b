// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The control plane (§1, §6): a lower-level typed message bus with its own
// wakeup primitive, external to this crate in the general case (a kernel
// event facility in the original implementation). A channel only needs two
// things from it: "deliver this small fixed-size record to the peer" and
// "wake the peer if it's blocked waiting on its inbox". `ControlPlane` is
// that interface; `LocalControlPlane` is a same-process reference
// implementation adequate for tests and for servers that don't need a real
// kernel event facility — it plays the role `Waiter` (condvar + mutex) plays
// for the shared-memory transport elsewhere in this crate.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Which endpoint of a channel a control record concerns. Matches the
/// `TO_RESPONDER = 0` / `TO_REQUESTOR = 1` endpoint indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    ToResponder = 0,
    ToRequestor = 1,
}

/// Wire-stable signal tag (§6). The first five values are numerically equal
/// to the corresponding [`Event`] variants, enforced here by a shared
/// discriminant rather than left to convention (see REDESIGN FLAGS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Signal {
    Error = 0,
    DataToResponder = 1,
    DataToRequestor = 2,
    Open = 3,
    Close = 4,
    DataDoneResponder = 5,
    ResponderSleeping = 6,
}

/// The event a [`crate::Channel::service_message`] call surfaces to the
/// owning thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Error,
    DataReadyResponder,
    DataReadyRequestor,
    Open,
    Close,
    Noop,
}

/// Fixed three-field control record (§3, §6): a signal tag, the ack the
/// sender wants the receiver to know, and the channel it concerns.
///
/// `direction` replaces the original's overloading of `ack` with an endpoint
/// index on `OPEN`/`CLOSE` records (Open Question (b) in the design notes) —
/// it is only ever set for those two signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord {
    pub signal: Signal,
    pub ack: u64,
    pub channel_id: u64,
    pub direction: Option<Direction>,
}

/// The external collaborator: "send a small fixed-size control record to the
/// peer and wake the peer if it is blocked" (§1).
///
/// A channel endpoint holds a handle to its peer's `ControlPlane` — sending
/// through it is how one side signals the other. Implementations may be
/// backed by a kernel event facility, a cross-process queue, or (as here) a
/// same-process condvar.
pub trait ControlPlane: Send + Sync {
    /// Deliver `record` to whatever is listening on this control plane and
    /// wake it if blocked. Errors are advisory to the caller (see §7): the
    /// data plane has already been updated, so a failed signal only delays
    /// discovery, it never loses the message.
    fn send(&self, record: ControlRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A same-process control plane: a FIFO of pending records plus a condvar so
/// a thread can block waiting for the next one. Mirrors the
/// spin-then-condvar wait pattern used by this crate's shared-memory
/// transport (`Waiter`), generalized away from named cross-process objects.
pub struct LocalControlPlane {
    inner: Mutex<VecDeque<ControlRecord>>,
    cond: Condvar,
}

impl LocalControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        })
    }

    /// Pop the next record without blocking.
    pub fn try_recv(&self) -> Option<ControlRecord> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Block until a record arrives or `timeout` elapses. `None` timeout
    /// blocks indefinitely.
    pub fn recv(&self, timeout: Option<Duration>) -> Option<ControlRecord> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(record) = guard.pop_front() {
                return Some(record);
            }
            match timeout {
                None => guard = self.cond.wait(guard).unwrap(),
                Some(d) => {
                    let (g, timed_out) = self.cond.wait_timeout(guard, d).unwrap();
                    guard = g;
                    if timed_out.timed_out() {
                        return guard.pop_front();
                    }
                }
            }
        }
    }

    /// Number of records currently queued (for diagnostics/tests).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LocalControlPlane {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }
}

impl ControlPlane for LocalControlPlane {
    fn send(&self, record: ControlRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().push_back(record);
        self.cond.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_recv_empty_is_none() {
        let cp = LocalControlPlane::new();
        assert!(cp.try_recv().is_none());
    }

    #[test]
    fn send_then_try_recv_fifo() {
        let cp = LocalControlPlane::new();
        let rec = |ack| ControlRecord {
            signal: Signal::DataToResponder,
            ack,
            channel_id: 1,
            direction: None,
        };
        cp.send(rec(1)).unwrap();
        cp.send(rec(2)).unwrap();
        assert_eq!(cp.try_recv().unwrap().ack, 1);
        assert_eq!(cp.try_recv().unwrap().ack, 2);
        assert!(cp.try_recv().is_none());
    }

    #[test]
    fn recv_with_timeout_returns_none_when_empty() {
        let cp = LocalControlPlane::new();
        let got = cp.recv(Some(Duration::from_millis(5)));
        assert!(got.is_none());
    }
}
