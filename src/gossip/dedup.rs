//! Sliding-window dedup of envelope ids: default 10-minute / 10k-entry
//! bound, whichever is hit first evicts the oldest entries.

use std::{
    collections::{HashSet, VecDeque},
    time::{Duration, Instant},
};

use crate::protocol::EnvelopeId;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Seen {
    id: EnvelopeId,
    at: Instant,
}

/// Tracks recently seen envelope ids so a flood rebroadcast only forwards
/// and delivers each envelope once.
pub struct DedupWindow {
    window: Duration,
    capacity: usize,
    order: VecDeque<Seen>,
    members: HashSet<[u8; 32]>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_WINDOW, DEFAULT_CAPACITY)
    }

    pub fn with_bounds(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Returns `true` if this is the first time `id` has been observed
    /// within the current window, recording it as seen either way.
    pub fn insert_if_new(&mut self, id: EnvelopeId) -> bool {
        self.evict_stale();
        if !self.members.insert(id.0) {
            return false;
        }
        self.order.push_back(Seen {
            id,
            at: Instant::now(),
        });
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted.id.0);
            }
        }
        true
    }

    fn evict_stale(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.order.front() {
            if now.duration_since(front.at) > self.window {
                let evicted = self.order.pop_front().unwrap();
                self.members.remove(&evicted.id.0);
            } else {
                break;
            }
        }
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> EnvelopeId {
        EnvelopeId([byte; 32])
    }

    #[test]
    fn first_occurrence_is_new_second_is_duplicate() {
        let mut window = DedupWindow::new();
        assert!(window.insert_if_new(id(1)));
        assert!(!window.insert_if_new(id(1)));
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let mut window = DedupWindow::with_bounds(DEFAULT_WINDOW, 2);
        assert!(window.insert_if_new(id(1)));
        assert!(window.insert_if_new(id(2)));
        assert!(window.insert_if_new(id(3)));
        // id(1) was evicted to make room for id(3), so it reads as new again.
        assert!(window.insert_if_new(id(1)));
    }

    #[test]
    fn time_window_expires_entries() {
        let mut window = DedupWindow::with_bounds(Duration::from_millis(10), DEFAULT_CAPACITY);
        assert!(window.insert_if_new(id(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(window.insert_if_new(id(1)));
    }
}
