// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use priority_queue::double_priority_queue::DoublePriorityQueue;

use crate::SimTime;

type Index = u64;

/// Store pending simulation events in a binary queue, sorted by which one is
/// going to fire first. Events with the same deadline fire in the order they
/// were added, so a simulation run is reproducible.
pub struct TimerQueue {
    timers: DoublePriorityQueue<Index, (SimTime, u64)>,

    /// Insertion counter used to break ties between equal deadlines.
    seq: u64,
}

impl TimerQueue {
    /// Create a new TimerQueue.
    pub fn new() -> Self {
        Self {
            timers: DoublePriorityQueue::new(),
            seq: 0,
        }
    }

    /// Creates an empty timer queue with a specific capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timers: DoublePriorityQueue::with_capacity(capacity),
            seq: 0,
        }
    }

    /// Return the number of timers in the queue.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Return if the timer queue is empty.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Add a timer firing `delay` after `now`, replacing any existing timer
    /// with the same id.
    pub fn add(&mut self, idx: Index, delay: Duration, now: SimTime) {
        self.add_at(idx, now + delay);
    }

    /// Add a timer firing at an absolute time, replacing any existing timer
    /// with the same id.
    pub fn add_at(&mut self, idx: Index, at: SimTime) {
        self.seq += 1;
        _ = self.timers.push(idx, (at, self.seq));
    }

    /// Delete a timer by id.
    pub fn del(&mut self, idx: &Index) {
        _ = self.timers.remove(idx);
    }

    /// Return the deadline of the earliest expiring timer.
    pub fn peek_deadline(&self) -> Option<SimTime> {
        self.timers.peek_min().map(|(_, (at, _))| *at)
    }

    /// Return the amount of time remaining for the earliest expiring timer.
    pub fn time_remaining(&self, now: SimTime) -> Option<Duration> {
        self.peek_deadline().map(|at| at.saturating_since(now))
    }

    /// Return the next expired timer if any.
    pub fn next_expire(&mut self, now: SimTime) -> Option<Index> {
        match self.peek_deadline() {
            Some(at) if at <= now => self.timers.pop_min().map(|(idx, _)| idx),
            _ => None,
        }
    }

    /// Clear all the timers
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add() {
        let mut tq = TimerQueue::with_capacity(10);
        assert!(tq.is_empty());

        let now = SimTime::ZERO;
        // Add a new timer.
        tq.add(0, Duration::from_millis(100), now);
        assert_eq!(tq.len(), 1);

        // Add another new timer.
        tq.add(1, Duration::from_millis(200), now);
        assert_eq!(tq.len(), 2);

        // Re-adding replaces the deadline.
        tq.add(1, Duration::from_millis(50), now);
        assert_eq!(tq.len(), 2);
        assert_eq!(tq.peek_deadline(), Some(SimTime::from_ms(50)));
    }

    #[test]
    fn del() {
        let mut tq = TimerQueue::default();

        let now = SimTime::ZERO;
        tq.add(0, Duration::from_millis(100), now);
        assert_eq!(tq.len(), 1);

        // Delete a non-existing timer.
        tq.del(&1);
        assert_eq!(tq.len(), 1);

        tq.del(&0);
        assert!(tq.is_empty());
        assert_eq!(tq.peek_deadline(), None);
    }

    #[test]
    fn expired() {
        let mut tq = TimerQueue::default();

        let now = SimTime::from_ms(1);
        tq.add(0, Duration::from_millis(100), now);
        tq.add(1, Duration::from_millis(200), now);
        tq.add(2, Duration::from_millis(300), now);
        assert!(tq.next_expire(now).is_none());
        assert_eq!(tq.len(), 3);

        let t = now + Duration::from_millis(100);
        assert_eq!(tq.next_expire(t), Some(0));
        assert_eq!(tq.len(), 2);

        tq.del(&2);
        tq.add(3, Duration::from_millis(1000), now);
        tq.add(4, Duration::from_millis(1000), now);
        tq.add(5, Duration::from_millis(1500), now);
        let t = now + Duration::from_millis(1000);
        assert_eq!(tq.next_expire(t), Some(1));
        assert_eq!(tq.next_expire(t), Some(3));
        assert_eq!(tq.next_expire(t), Some(4));
        assert_eq!(tq.next_expire(t), None);
        assert_eq!(tq.len(), 1);
    }

    #[test]
    fn same_deadline_fifo() {
        let mut tq = TimerQueue::default();
        let at = SimTime::from_us(10);
        for idx in [7, 3, 9, 1] {
            tq.add_at(idx, at);
        }

        let fired: Vec<u64> = std::iter::from_fn(|| tq.next_expire(at)).collect();
        assert_eq!(fired, vec![7, 3, 9, 1]);
    }

    #[test]
    fn time_remaining() {
        let mut tq = TimerQueue::default();

        let now = SimTime::ZERO;
        assert_eq!(tq.time_remaining(now), None);

        tq.add(0, Duration::from_millis(100), now);
        tq.add(1, Duration::from_millis(200), now);
        assert_eq!(tq.time_remaining(now), Some(Duration::from_millis(100)));
        assert_eq!(
            tq.time_remaining(SimTime::from_ms(150)),
            Some(Duration::ZERO)
        );
    }
}
