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

//! HyStart: hybrid slow start.
//!
//! Slow start doubles the window every round trip and usually overshoots the
//! path capacity, ending in a burst of losses. HyStart samples the RTT of
//! each round and leaves slow start as soon as the RTT grows noticeably above
//! the round's minimum, i.e. when a queue starts to build.
//!
//! Exiting is a one-way latch: once triggered, HyStart stays inactive for the
//! lifetime of the flow (until an explicit `reset`).

use std::time::Duration;

use log::*;

use crate::SimTime;

/// Lower bound of the delay increase threshold.
const MIN_RTT_THRESH: Duration = Duration::from_millis(4);

/// Upper bound of the delay increase threshold.
const MAX_RTT_THRESH: Duration = Duration::from_millis(16);

/// The delay threshold is `min_rtt >> DELAY_THRESH_SHIFT`, i.e. min_rtt/8.
const DELAY_THRESH_SHIFT: u32 = 3;

/// The least RTT samples in one round before a decision is made.
pub const MIN_SAMPLES: u32 = 8;

/// HyStart only runs once the window holds at least this many segments.
pub const LOW_WINDOW: u64 = 16;

/// Implementation of HyStart delay-increase detection.
#[derive(Debug)]
pub struct HyStart {
    /// Whether HyStart is enabled.
    enabled: bool,

    /// Start time of the current round.
    round_start: SimTime,

    /// Sequence number marking the end of the current round.
    end_seq: u64,

    /// RTT sample count in current round.
    sample_cnt: u32,

    /// Minimum RTT in current round.
    delay_min_sample: Option<Duration>,

    /// Slow start exit has been found.
    found_slow_start_exit: bool,
}

impl HyStart {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            round_start: SimTime::ZERO,
            end_seq: 0,
            sample_cnt: 0,
            delay_min_sample: None,
            found_slow_start_exit: false,
        }
    }

    /// Whether HyStart is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether HyStart decided to leave slow start.
    pub fn found_slow_start_exit(&self) -> bool {
        self.found_slow_start_exit
    }

    /// Start time of the current round.
    pub fn round_start(&self) -> SimTime {
        self.round_start
    }

    /// Process an RTT sample taken in slow start. `cwnd` is the window after
    /// this ack's increase. Returns true if slow start should end now.
    pub fn on_ack(
        &mut self,
        now: SimTime,
        cwnd: u64,
        mss: u64,
        rtt: Duration,
        highest_sent: u64,
    ) -> bool {
        if !self.enabled || self.found_slow_start_exit {
            return false;
        }

        if cwnd < LOW_WINDOW * mss {
            return false;
        }

        // Start of a new round.
        if highest_sent > self.end_seq {
            self.end_seq = highest_sent;
            self.round_start = now;
            self.sample_cnt = 0;
            self.delay_min_sample = None;
        }

        let delay_min = match self.delay_min_sample {
            Some(d) if d <= rtt => d,
            _ => rtt,
        };
        self.delay_min_sample = Some(delay_min);
        self.sample_cnt += 1;

        if self.sample_cnt < MIN_SAMPLES {
            return false;
        }

        let thresh = (delay_min / (1 << DELAY_THRESH_SHIFT)).clamp(MIN_RTT_THRESH, MAX_RTT_THRESH);

        if rtt > delay_min.saturating_add(thresh) {
            debug!(
                "hystart: leaving slow start, cwnd={} rtt={:?} round_min_rtt={:?}",
                cwnd, rtt, delay_min
            );
            self.found_slow_start_exit = true;
            return true;
        }

        false
    }

    /// Clear the per-round sampling state, e.g. after a congestion event.
    /// The exit latch is kept.
    pub fn reset_round(&mut self) {
        self.round_start = SimTime::ZERO;
        self.sample_cnt = 0;
        self.delay_min_sample = None;
    }

    /// Forget everything, including the exit latch.
    pub fn reset(&mut self) {
        self.reset_round();
        self.end_seq = 0;
        self.found_slow_start_exit = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: u64 = 1500;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn hystart_exit_on_delay_increase() {
        let mut hs = HyStart::new(true);
        let cwnd = LOW_WINDOW * MSS;
        let now = SimTime::from_ms(1);

        // 7 samples at 40ms: no decision yet.
        for _ in 0..MIN_SAMPLES - 1 {
            assert!(!hs.on_ack(now, cwnd, MSS, ms(40), 100_000));
        }
        assert_eq!(hs.sample_cnt, MIN_SAMPLES - 1);
        assert_eq!(hs.round_start(), now);

        // Threshold is clamp(40/8, 4, 16) = 5ms. 45ms is not above 40 + 5.
        assert!(!hs.on_ack(now, cwnd, MSS, ms(45), 100_000));
        assert!(!hs.found_slow_start_exit());

        // 46ms is.
        assert!(hs.on_ack(now, cwnd, MSS, ms(46), 100_000));
        assert!(hs.found_slow_start_exit());

        // Latched: no further processing.
        assert!(!hs.on_ack(now, cwnd, MSS, ms(200), 200_000));
        assert!(hs.found_slow_start_exit());
    }

    #[test]
    fn hystart_needs_min_samples() {
        let mut hs = HyStart::new(true);
        let cwnd = 20 * MSS;

        assert!(!hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(10), 1));
        for _ in 0..MIN_SAMPLES - 2 {
            assert!(!hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(100), 1));
        }
        assert!(!hs.found_slow_start_exit());

        // Eighth sample decides: 100 > 10 + 4.
        assert!(hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(100), 1));
    }

    #[test]
    fn hystart_low_window() {
        let mut hs = HyStart::new(true);
        let cwnd = LOW_WINDOW * MSS - 1;

        for _ in 0..32 {
            assert!(!hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(500), 1));
        }
        assert_eq!(hs.sample_cnt, 0);
        assert!(!hs.found_slow_start_exit());
    }

    #[test]
    fn hystart_disabled() {
        let mut hs = HyStart::new(false);
        assert!(!hs.enabled());
        for i in 0..32 {
            assert!(!hs.on_ack(SimTime::ZERO, 100 * MSS, MSS, ms(1 + i * 10), 1));
        }
        assert!(!hs.found_slow_start_exit());
    }

    #[test]
    fn hystart_new_round_clears_samples() {
        let mut hs = HyStart::new(true);
        let cwnd = 32 * MSS;

        for _ in 0..MIN_SAMPLES - 1 {
            hs.on_ack(SimTime::from_ms(1), cwnd, MSS, ms(20), 10_000);
        }
        assert_eq!(hs.sample_cnt, MIN_SAMPLES - 1);

        // A higher sequence number opens a new round.
        hs.on_ack(SimTime::from_ms(21), cwnd, MSS, ms(60), 20_000);
        assert_eq!(hs.sample_cnt, 1);
        assert_eq!(hs.delay_min_sample, Some(ms(60)));
        assert_eq!(hs.round_start(), SimTime::from_ms(21));
        assert_eq!(hs.end_seq, 20_000);
    }

    #[test]
    fn hystart_threshold_clamped() {
        // Round minimum 200ms: 200/8 = 25ms is clamped to 16ms.
        let mut hs = HyStart::new(true);
        let cwnd = 32 * MSS;
        for _ in 0..MIN_SAMPLES - 1 {
            hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(200), 1);
        }
        assert!(!hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(216), 1));
        assert!(hs.on_ack(SimTime::ZERO, cwnd, MSS, ms(217), 1));
    }

    #[test]
    fn hystart_reset() {
        let mut hs = HyStart::new(true);
        let cwnd = 32 * MSS;
        for _ in 0..MIN_SAMPLES - 1 {
            hs.on_ack(SimTime::from_ms(3), cwnd, MSS, ms(10), 5);
        }
        assert!(hs.on_ack(SimTime::from_ms(3), cwnd, MSS, ms(50), 5));

        hs.reset_round();
        assert_eq!(hs.sample_cnt, 0);
        assert_eq!(hs.delay_min_sample, None);
        assert_eq!(hs.round_start(), SimTime::ZERO);
        assert!(hs.found_slow_start_exit());
        assert_eq!(hs.end_seq, 5);

        hs.reset();
        assert!(!hs.found_slow_start_exit());
        assert_eq!(hs.end_seq, 0);
    }
}
