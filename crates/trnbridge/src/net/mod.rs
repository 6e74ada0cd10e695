// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe and request/reply servers.
//!
//! One [`server::PubServer`] type covers the three configured instances:
//! the MB1 publisher (UDP, pub/sub), the TRN request server (TCP,
//! request/reply), and the TRN-update publisher (UDP, pub/sub). Peers are
//! admitted on first traffic, granted heartbeat credits on subscribe, and
//! evicted when their credits run out or they fall silent past the
//! heartbeat window.

pub mod peer;
pub mod server;

pub use peer::{Peer, PeerState};
pub use server::{Mode, PubServer, RequestHandler, ServerConfig, ServerStats, Transport};

/// Control message: subscribe, granting heartbeat credits.
pub const CTRL_SUBSCRIBE: &[u8] = b"SUB\0";

/// Control message: unsubscribe, releasing the peer immediately.
pub const CTRL_UNSUBSCRIBE: &[u8] = b"UNS\0";

/// Control message: keepalive, restoring heartbeat credits.
pub const CTRL_HEARTBEAT: &[u8] = b"PNG\0";

/// Positive control reply.
pub const REPLY_ACK: &[u8] = b"ACK\0";

/// Negative control reply.
pub const REPLY_NACK: &[u8] = b"NAK\0";
