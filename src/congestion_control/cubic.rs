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

use log::*;

use super::cube_root;
use super::AckSample;
use super::CongestionController;
use super::CongestionStats;
use super::HyStart;
use crate::FlowConfig;
use crate::SimTime;

/// Scale of the multiplicative decrease factor.
const BETA_SCALE: u64 = 1024;

/// Cubic constant beta, scaled by `BETA_SCALE`.
///
/// On a congestion event the window is reduced to `cwnd * BETA / BETA_SCALE`,
/// i.e. about 0.7 of its value.
const BETA: u64 = 717;

/// Cubic constant C, scaled.
///
/// Determines the aggressiveness of the cubic growth: the window moves by
/// `offs^3 * BIC_SCALE / CUBE_DELTA_DIVISOR` segments, where `offs` is the
/// distance to the inflection point in `CUBIC_TIME_UNIT`s.
const BIC_SCALE: u64 = 41;

const CUBE_DELTA_DIVISOR: u64 = 10;

/// Time unit of the cubic function.
const CUBIC_TIME_UNIT: Duration = Duration::from_millis(100);

/// When the window is at or above the cubic target, grow by one segment per
/// `CONCAVE_CNT_FACTOR * cwnd` acks.
const CONCAVE_CNT_FACTOR: u64 = 100;

/// Cubic Configuration.
#[derive(Debug, Clone)]
pub struct CubicConfig {
    /// Max segment size in bytes.
    mss: u64,

    /// Initial congestion window in bytes.
    initial_congestion_window: u64,

    /// The threshold for slow start in bytes.
    slow_start_thresh: u64,

    /// Enable HyStart, default to true.
    hystart_enabled: bool,

    /// Enable the Reno-friendly region, default to true.
    tcp_friendliness: bool,

    /// Enable fast convergence, default to true.
    fast_convergence: bool,

    /// React to ECN marks, default to false.
    ecn_enabled: bool,
}

impl CubicConfig {
    pub fn from(conf: &FlowConfig) -> Self {
        let mss = (conf.mss as u64).max(1);

        Self {
            mss,
            initial_congestion_window: conf.initial_congestion_window.saturating_mul(mss),
            slow_start_thresh: conf.slow_start_thresh,
            hystart_enabled: conf.hystart_enabled,
            tcp_friendliness: conf.tcp_friendliness,
            fast_convergence: conf.fast_convergence,
            ecn_enabled: conf.ecn_enabled,
        }
    }

    /// Enable hystart.
    pub fn enable_hystart(&mut self, enable: bool) -> &mut Self {
        self.hystart_enabled = enable;
        self
    }

    /// Enable the Reno-friendly region.
    pub fn enable_tcp_friendliness(&mut self, enable: bool) -> &mut Self {
        self.tcp_friendliness = enable;
        self
    }

    /// Enable fast_convergence.
    pub fn enable_fast_convergence(&mut self, enable: bool) -> &mut Self {
        self.fast_convergence = enable;
        self
    }

    /// Enable reaction to ECN marks.
    pub fn enable_ecn(&mut self, enable: bool) -> &mut Self {
        self.ecn_enabled = enable;
        self
    }

    /// Update initial congestion window.
    pub fn set_initial_congestion_window(&mut self, initial_congestion_window: u64) -> &mut Self {
        self.initial_congestion_window = initial_congestion_window;
        self
    }

    /// Update slow start threshold.
    pub fn set_slow_start_thresh(&mut self, slow_start_thresh: u64) -> &mut Self {
        self.slow_start_thresh = slow_start_thresh;
        self
    }

    /// Update max segment size.
    pub fn set_mss(&mut self, mss: u64) -> &mut Self {
        self.mss = mss.max(1);
        self
    }
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self::from(&FlowConfig::default())
    }
}

/// The cubic function fitted at the start of a congestion avoidance epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    /// Time the epoch began.
    start: SimTime,

    /// Window the curve flattens at, in bytes.
    origin_point: u64,

    /// Time from `start` to the inflection point, in `CUBIC_TIME_UNIT`s.
    k: u64,
}

/// Cubic congestion control algorithm.
///
/// Integer implementation following the Linux `tcp_cubic` module: the window
/// follows `origin + C * (t - K)^3` between congestion events, with HyStart
/// in slow start and a Reno-friendly lower bound on growth.
#[derive(Debug)]
pub struct Cubic {
    /// Configuration.
    config: CubicConfig,

    /// HyStart detector.
    hystart: HyStart,

    /// Congestion window in bytes.
    cwnd: u64,

    /// Slow start thresh in bytes.
    ssthresh: u64,

    /// Window at the last congestion event, zero if none happened yet.
    last_max_cwnd: u64,

    /// Current epoch. `None` forces the curve to be fitted again on the next
    /// ack in congestion avoidance.
    epoch: Option<Epoch>,

    /// Minimum RTT observed over the lifetime of the flow.
    delay_min: Option<Duration>,

    /// Reno window estimate in bytes.
    tcp_cwnd: u64,

    /// Segments acked since the last window increase.
    ack_cnt: u64,

    /// Acked segments needed before the next one-segment increase.
    cnt: u64,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Cubic {
    pub fn new(config: CubicConfig) -> Self {
        let hystart_enabled = config.hystart_enabled;
        let cwnd = config.initial_congestion_window.max(1);
        let ssthresh = config.slow_start_thresh;

        Self {
            config,
            hystart: HyStart::new(hystart_enabled),
            cwnd,
            ssthresh,
            last_max_cwnd: 0,
            epoch: None,
            delay_min: None,
            tcp_cwnd: 0,
            ack_cnt: 0,
            cnt: 0,
            stats: Default::default(),
        }
    }

    /// Window recorded at the most recent congestion event.
    pub fn last_max_cwnd(&self) -> u64 {
        self.last_max_cwnd
    }

    /// Minimum RTT observed so far.
    pub fn delay_min(&self) -> Option<Duration> {
        self.delay_min
    }

    /// Convert acked bytes to segments, rounding up.
    fn acked_segments(&self, acked_bytes: u64) -> u64 {
        acked_bytes.saturating_add(self.config.mss - 1) / self.config.mss
    }

    /// Fit the cubic curve if needed and update `cnt`, the number of acked
    /// segments required for the next one-segment increase.
    fn cubic_update(&mut self, now: SimTime, cwnd: u64, acked: u64) {
        let mss = self.config.mss;

        self.ack_cnt = self.ack_cnt.saturating_add(acked);

        let epoch = match self.epoch {
            Some(epoch) => epoch,

            None => {
                self.ack_cnt = acked;
                self.tcp_cwnd = cwnd;

                let epoch = if self.last_max_cwnd <= cwnd {
                    Epoch {
                        start: now,
                        origin_point: cwnd,
                        k: 0,
                    }
                } else {
                    // K = cbrt((W_max - cwnd) / C), distance measured in whole
                    // segments.
                    let gap = self.last_max_cwnd / mss - cwnd / mss;
                    Epoch {
                        start: now,
                        origin_point: self.last_max_cwnd,
                        k: cube_root(gap.saturating_mul(BIC_SCALE)) as u64,
                    }
                };

                debug!(
                    "cubic: new epoch at {:?}, cwnd={} origin={} k={}",
                    now, cwnd, epoch.origin_point, epoch.k
                );

                self.epoch = Some(epoch);
                epoch
            }
        };

        // Look one minimum RTT ahead so the target is the window expected
        // when this ack's data arrives.
        let elapsed = now
            .saturating_since(epoch.start)
            .saturating_add(self.delay_min.unwrap_or_default());
        let t = (elapsed.as_nanos() / CUBIC_TIME_UNIT.as_nanos()) as u64;

        let offs = t.abs_diff(epoch.k);
        let delta = offs
            .saturating_pow(3)
            .saturating_mul(BIC_SCALE)
            / CUBE_DELTA_DIVISOR;
        let delta = delta.saturating_mul(mss);

        let bic_target = if t < epoch.k {
            epoch.origin_point.saturating_sub(delta)
        } else {
            epoch.origin_point.saturating_add(delta)
        };

        self.cnt = if bic_target > cwnd {
            cwnd / (bic_target - cwnd)
        } else {
            CONCAVE_CNT_FACTOR.saturating_mul(cwnd)
        };

        if self.config.tcp_friendliness {
            self.tcp_friendliness_update(cwnd);
        }
    }

    /// Make sure the window grows at least as fast as an equivalent Reno flow
    /// would, by lowering `cnt` whenever the Reno estimate is ahead.
    fn tcp_friendliness_update(&mut self, cwnd: u64) {
        let mss = self.config.mss;
        let cwnd_mss = (cwnd / mss).max(1);
        let mut tcp_cwnd_mss = self.tcp_cwnd / mss;

        // Reno grows by one segment per window's worth of acks.
        if tcp_cwnd_mss <= cwnd_mss {
            tcp_cwnd_mss += self.ack_cnt / cwnd_mss;
            self.tcp_cwnd = tcp_cwnd_mss.saturating_mul(mss);
        }

        if tcp_cwnd_mss > cwnd_mss {
            let max_cnt = cwnd / (tcp_cwnd_mss - cwnd_mss);
            self.cnt = self.cnt.min(max_cnt);
        }
    }

    /// End the epoch and compute the reduced slow start threshold.
    fn deflate_window(&mut self) {
        let cwnd = self.cwnd;
        let mss = self.config.mss;

        self.epoch = None;

        // Fast convergence: losing before the previous peak means the
        // available capacity shrank, so release some of it.
        self.last_max_cwnd = if self.config.fast_convergence && cwnd < self.last_max_cwnd {
            cwnd.saturating_mul(BETA_SCALE + BETA) / (2 * BETA_SCALE)
        } else {
            cwnd
        };

        self.ssthresh = (cwnd.saturating_mul(BETA) / BETA_SCALE).max(2 * mss);

        self.hystart.reset_round();
    }
}

impl CongestionController for Cubic {
    fn name(&self) -> &str {
        "CUBIC"
    }

    fn on_ack(&mut self, now: SimTime, sample: &AckSample) -> (u64, u64) {
        if sample.ecn_marked {
            self.on_ecn(now);
        }

        let acked_bytes = sample.acked_bytes;
        self.stats.bytes_acked_in_total =
            self.stats.bytes_acked_in_total.saturating_add(acked_bytes);

        if let Some(rtt) = sample.rtt.filter(|rtt| !rtt.is_zero()) {
            self.delay_min = Some(self.delay_min.map_or(rtt, |d| d.min(rtt)));
        }

        if self.in_slow_start() {
            self.stats.bytes_acked_in_slow_start = self
                .stats
                .bytes_acked_in_slow_start
                .saturating_add(acked_bytes);

            let increase = (self.ssthresh - self.cwnd)
                .min(self.config.mss)
                .min(acked_bytes);
            self.cwnd += increase;

            if let Some(rtt) = sample.rtt.filter(|rtt| !rtt.is_zero()) {
                if self.hystart.on_ack(
                    now,
                    self.cwnd,
                    self.config.mss,
                    rtt,
                    sample.highest_sent_seq,
                ) {
                    self.ssthresh = self.cwnd;
                }
            }

            return (self.cwnd, self.ssthresh);
        }

        // Congestion avoidance.
        let acked = self.acked_segments(acked_bytes);
        self.cubic_update(now, self.cwnd, acked);

        if self.ack_cnt > self.cnt {
            self.cwnd = self.cwnd.saturating_add(self.config.mss);
            self.ack_cnt = 0;

            trace!(
                "cubic: cwnd increased to {}, cnt={} ssthresh={}",
                self.cwnd,
                self.cnt,
                self.ssthresh
            );
        }

        (self.cwnd, self.ssthresh)
    }

    fn on_loss(&mut self, now: SimTime) -> u64 {
        self.deflate_window();
        self.stats.loss_events += 1;

        trace!(
            "cubic: loss at {:?}, cwnd={} ssthresh={} last_max_cwnd={}",
            now,
            self.cwnd,
            self.ssthresh,
            self.last_max_cwnd
        );

        self.ssthresh
    }

    fn on_ecn(&mut self, now: SimTime) {
        if !self.config.ecn_enabled {
            return;
        }
        self.stats.ecn_marks += 1;

        // Every marked ack above ssthresh reduces the window; there is no
        // once-per-round-trip limit.
        if self.cwnd > self.ssthresh {
            self.deflate_window();
            self.cwnd = self.ssthresh;
            self.stats.ecn_reductions += 1;

            trace!(
                "cubic: ecn at {:?}, cwnd={} last_max_cwnd={}",
                now,
                self.cwnd,
                self.last_max_cwnd
            );
        }
    }

    fn on_timeout(&mut self, now: SimTime) {
        self.epoch = None;
        self.last_max_cwnd = self.cwnd.max(2 * self.config.mss);
        self.stats.timeouts += 1;

        trace!(
            "cubic: timeout at {:?}, cwnd={} last_max_cwnd={}",
            now,
            self.cwnd,
            self.last_max_cwnd
        );
    }

    fn restart_window(&mut self) {
        self.cwnd = self.config.mss;
    }

    fn set_congestion_window(&mut self, cwnd: u64) {
        self.cwnd = cwnd.max(self.config.mss);
    }

    fn reset(&mut self) {
        self.cwnd = self.config.initial_congestion_window.max(1);
        self.ssthresh = self.config.slow_start_thresh;
        self.last_max_cwnd = 0;
        self.epoch = None;
        self.tcp_cwnd = 0;
        self.ack_cnt = 0;
        self.cnt = 0;
        self.hystart.reset();
    }

    fn found_slow_start_exit(&self) -> bool {
        self.hystart.found_slow_start_exit()
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn slow_start_thresh(&self) -> u64 {
        self.ssthresh
    }

    fn initial_window(&self) -> u64 {
        self.config.initial_congestion_window
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
