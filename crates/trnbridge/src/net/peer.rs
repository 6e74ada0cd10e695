// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer connection table entry.
//!
//! # State Machine
//!
//! ```text
//!      +---------+
//!      |   New   |
//!      +----+----+
//!           | subscribe (credits := C)
//!           v
//!      +------------+   keepalive (credits := C)
//!      | Subscribed |<--------------------+
//!      +----+-------+---------------------+
//!           | credits exhausted or silence > H
//!           v
//!      +---------+
//!      | Evicted |   (terminal; entry removed from the table)
//!      +---------+
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Peer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Observed traffic, not yet subscribed.
    #[default]
    New,
    /// Subscribed; receives published records.
    Subscribed,
    /// Terminal: resources released on the next sweep.
    Evicted,
}

/// One connection-table entry.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Peer address (table key, duplicated here for logging).
    pub addr: SocketAddr,
    /// Lifecycle state.
    pub state: PeerState,
    /// Last time any traffic arrived from this peer.
    pub last_seen: Instant,
    /// Remaining heartbeat credits; 0 with credits enabled means evict.
    pub credits: u32,
    /// Records delivered to this peer.
    pub sent: u64,
    /// Failed/skipped deliveries.
    pub send_failures: u64,
}

impl Peer {
    /// New table entry for a peer just observed.
    #[must_use]
    pub fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            state: PeerState::New,
            last_seen: now,
            credits: 0,
            sent: 0,
            send_failures: 0,
        }
    }

    /// Subscribe (or re-subscribe), granting a fresh credit allowance.
    pub fn subscribe(&mut self, credits: u32, now: Instant) {
        self.state = PeerState::Subscribed;
        self.credits = credits;
        self.last_seen = now;
    }

    /// Keepalive: refresh the activity clock and restore credits.
    pub fn keepalive(&mut self, credits: u32, now: Instant) {
        self.credits = credits;
        self.last_seen = now;
    }

    /// Note inbound traffic without credit changes.
    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Consume one credit; returns false when the allowance is exhausted.
    ///
    /// An allowance of zero disables credit accounting entirely.
    pub fn spend_credit(&mut self, allowance: u32) -> bool {
        if allowance == 0 {
            return true;
        }
        if self.credits == 0 {
            return false;
        }
        self.credits -= 1;
        self.credits > 0
    }

    /// True when the peer receives published records.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state == PeerState::Subscribed
    }

    /// Silence longer than the heartbeat window.
    #[must_use]
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.last_seen) > window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9999".parse().expect("addr")
    }

    #[test]
    fn test_lifecycle() {
        let t0 = Instant::now();
        let mut peer = Peer::new(addr(), t0);
        assert_eq!(peer.state, PeerState::New);
        assert!(!peer.is_subscribed());

        peer.subscribe(3, t0);
        assert!(peer.is_subscribed());
        assert_eq!(peer.credits, 3);
    }

    #[test]
    fn test_credit_exhaustion() {
        let t0 = Instant::now();
        let mut peer = Peer::new(addr(), t0);
        peer.subscribe(2, t0);

        assert!(peer.spend_credit(2));
        assert!(!peer.spend_credit(2));
        assert_eq!(peer.credits, 0);

        peer.keepalive(2, t0);
        assert_eq!(peer.credits, 2);
    }

    #[test]
    fn test_zero_allowance_disables_credits() {
        let t0 = Instant::now();
        let mut peer = Peer::new(addr(), t0);
        peer.subscribe(0, t0);
        for _ in 0..100 {
            assert!(peer.spend_credit(0));
        }
    }

    #[test]
    fn test_expiry_window() {
        let t0 = Instant::now();
        let peer = Peer::new(addr(), t0);
        assert!(!peer.is_expired(t0, Duration::from_secs(10)));
        assert!(peer.is_expired(t0 + Duration::from_secs(11), Duration::from_secs(10)));
    }
}
