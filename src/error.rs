// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error kinds for the channel. Replaces the original C implementation's
// `fr_strerror_printf` + negative-return-code convention with a typed enum.

/// Everything that can go wrong on the data plane of a [`crate::Channel`].
///
/// Control-plane send failures are *not* represented here: per the signalling
/// design, a failed signal is advisory only (the data-plane state is already
/// committed, and the peer will discover the message when it next drains its
/// queue or receives a later signal), so a send failure is logged
/// (`log::warn!`, see `channel::emit_signal`/`signal_open`/`initiate_close`)
/// and otherwise ignored rather than surfaced as a typed error.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The outbound queue was full. The channel already drained the opposite
    /// direction opportunistically before returning this; the caller is
    /// responsible for rerouting or retrying the message.
    #[error("outbound queue is full")]
    QueueFull,

    /// `send_reply` was called after the channel began closing.
    #[error("channel is not active")]
    Inactive,
}
