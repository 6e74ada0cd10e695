// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-depth sliding window of pings for along-track filtering.
//!
//! The ring holds the last D pings; once full, every push rotates the window
//! and exposes the middle element as the *process slot*. With along-track
//! filtering disabled D is 1 and every push is immediately processable.

use crate::ping::Ping;

/// Sliding ping window.
#[derive(Debug)]
pub struct PingRing {
    depth: usize,
    slots: Vec<Ping>,
    /// Index of the process slot after the last push, when ready.
    process_idx: Option<usize>,
    pushes: u64,
}

impl PingRing {
    /// Create a ring of depth `depth` (clamped to at least 1).
    #[must_use]
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            slots: Vec::with_capacity(depth),
            process_idx: None,
            pushes: 0,
        }
    }

    /// Window depth D.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current occupancy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Push one ping into the window.
    ///
    /// Returns true when the ring is ready to process: the push that fills
    /// the window and every push after it. Below capacity the ping is
    /// admitted and false is returned (warm-up).
    pub fn push(&mut self, mut ping: Ping) -> bool {
        // Resident pings move one step away from the incoming edge.
        for p in &mut self.slots {
            p.slot_count -= 1;
        }
        ping.slot_count = self.depth as i32 / 2;

        if self.slots.len() < self.depth {
            self.slots.push(ping);
            self.pushes += 1;
            if self.slots.len() < self.depth {
                self.process_idx = None;
                return false;
            }
        } else {
            // Overwrite the slot that just walked off the far edge.
            let oldest = self
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.slot_count)
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.slots[oldest] = ping;
            self.pushes += 1;
        }

        // The slot whose counter reached zero is the one to process.
        self.process_idx = self.slots.iter().position(|p| p.slot_count == 0);
        self.process_idx.is_some()
    }

    /// The process-slot ping, when the last push made one ready.
    #[must_use]
    pub fn process_slot(&self) -> Option<&Ping> {
        self.process_idx.map(|i| &self.slots[i])
    }

    /// Mutable access to the process-slot ping (the filter writes flags).
    pub fn process_slot_mut(&mut self) -> Option<&mut Ping> {
        self.process_idx.map(|i| &mut self.slots[i])
    }

    /// Index of the process slot within the resident window.
    #[must_use]
    pub fn process_index(&self) -> Option<usize> {
        self.process_idx
    }

    /// All resident pings, unordered (filter samples the whole window).
    #[must_use]
    pub fn window(&self) -> &[Ping] {
        &self.slots
    }

    /// Total pings pushed over the ring's lifetime.
    #[must_use]
    pub fn total_pushes(&self) -> u64 {
        self.pushes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping::{GainTriple, SoundingFlag};

    fn ping(n: u32) -> Ping {
        Ping {
            ping_number: n,
            ts: f64::from(n),
            lat: 0.0,
            lon: 0.0,
            heading: 0.0,
            sonar_depth: 5.0,
            speed: 0.0,
            roll: 0.0,
            pitch: 0.0,
            heave: 0.0,
            gains: GainTriple::default(),
            bath: vec![50.0],
            along: vec![0.0],
            across: vec![0.0],
            flag_raw: vec![SoundingFlag::Ok],
            flag_filter: vec![SoundingFlag::Ok],
            slot_count: 0,
        }
    }

    #[test]
    fn test_warmup_then_ready_every_push() {
        let mut ring = PingRing::new(3);
        assert!(!ring.push(ping(1)));
        assert!(!ring.push(ping(2)));
        assert!(ring.push(ping(3)));
        assert!(ring.push(ping(4)));
        assert!(ring.push(ping(5)));
    }

    #[test]
    fn test_process_slot_is_middle() {
        let mut ring = PingRing::new(3);
        ring.push(ping(1));
        ring.push(ping(2));
        assert!(ring.push(ping(3)));
        // window {1,2,3}: middle is ping 2
        assert_eq!(ring.process_slot().map(|p| p.ping_number), Some(2));

        assert!(ring.push(ping(4)));
        // window {2,3,4}: middle is ping 3
        assert_eq!(ring.process_slot().map(|p| p.ping_number), Some(3));
    }

    #[test]
    fn test_depth_one_processes_immediately() {
        let mut ring = PingRing::new(1);
        assert!(ring.push(ping(1)));
        assert_eq!(ring.process_slot().map(|p| p.ping_number), Some(1));
        assert!(ring.push(ping(2)));
        assert_eq!(ring.process_slot().map(|p| p.ping_number), Some(2));
    }

    #[test]
    fn test_rotation_overwrites_oldest() {
        let mut ring = PingRing::new(3);
        for n in 1..=5 {
            ring.push(ping(n));
        }
        let mut present: Vec<u32> = ring.window().iter().map(|p| p.ping_number).collect();
        present.sort_unstable();
        assert_eq!(present, vec![3, 4, 5]);
        assert_eq!(ring.total_pushes(), 5);
    }

    #[test]
    fn test_exactly_one_record_per_push_after_fill() {
        // first D-1 pushes silent; D-th and later each expose one process slot
        let depth = 5;
        let mut ring = PingRing::new(depth);
        let mut ready = 0;
        for n in 1..=20u32 {
            if ring.push(ping(n)) {
                ready += 1;
                assert!(ring.process_slot().is_some());
            }
        }
        assert_eq!(ready, 20 - (depth as u32 - 1));
    }
}
