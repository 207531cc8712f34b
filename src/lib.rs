// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A bidirectional, thread-safe request/response channel: two opposed
// single-producer/single-consumer lock-free queues, per-endpoint
// sequence/ack accounting, and an adaptive wakeup-coalescing control-plane
// protocol that keeps a high-throughput request/response pipe from paying a
// kernel wakeup per message. See `channel::Channel` for the entry point.

pub mod atomic_queue;
pub use atomic_queue::{QueueConsumer, QueueProducer};

pub mod control;
pub use control::{ControlPlane, ControlRecord, Direction, Event, LocalControlPlane, Signal};

pub mod message;
pub use message::{ChannelMessage, Envelope};

mod endpoint;
pub use endpoint::EndpointStats;

pub mod channel;
pub use channel::{Channel, ChannelStats};

pub mod config;
pub use config::ChannelConfig;

pub mod error;
pub use error::ChannelError;
