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

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::FlowConfig;
use crate::Result;
use crate::SimTime;
pub use cube_root::cube_root;
pub use cubic::Cubic;
pub use cubic::CubicConfig;
pub use hystart::HyStart;

/// Available congestion control algorithm
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum CongestionControlAlgorithm {
    /// CUBIC uses a cubic function of the time since the last congestion
    /// event instead of a linear window increase, so that window growth is
    /// independent of RTT.
    #[default]
    Cubic,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("cubic") {
            Ok(CongestionControlAlgorithm::Cubic)
        } else {
            Err(Error::InvalidConfig(format!("unknown algorithm {}", algor)))
        }
    }
}

impl fmt::Display for CongestionControlAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionControlAlgorithm::Cubic => write!(f, "CUBIC"),
        }
    }
}

/// Information delivered to the controller for each acknowledgment that
/// advances the cumulative ack point.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckSample {
    /// Newly acknowledged bytes.
    pub acked_bytes: u64,

    /// RTT measured by this ack, if any.
    pub rtt: Option<Duration>,

    /// Whether the ack echoes an ECN congestion mark.
    pub ecn_marked: bool,

    /// Highest sequence number sent so far. Used to delimit RTT rounds.
    pub highest_sent_seq: u64,
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CongestionStats {
    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes acked in slow start.
    pub bytes_acked_in_slow_start: u64,

    /// Number of loss events handled.
    pub loss_events: u64,

    /// Number of ECN marks received.
    pub ecn_marks: u64,

    /// Number of ECN marks that caused a window reduction.
    pub ecn_reductions: u64,

    /// Number of retransmission timeouts.
    pub timeouts: u64,
}

/// Congestion control interfaces shared by different algorithms.
///
/// A flow engine owns one controller and calls these hooks from the event
/// loop. Hooks never block and always run to completion.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Grow the window for an acknowledgment. Returns the new congestion
    /// window and slow start threshold.
    fn on_ack(&mut self, now: SimTime, sample: &AckSample) -> (u64, u64);

    /// Loss detected. Returns the new slow start threshold. The window
    /// itself is left to the caller.
    fn on_loss(&mut self, now: SimTime) -> u64;

    /// An ack carried an ECN congestion mark.
    fn on_ecn(&mut self, now: SimTime);

    /// Retransmission timeout fired. Only internal bookkeeping is updated;
    /// the caller collapses the window with `restart_window`.
    fn on_timeout(&mut self, now: SimTime);

    /// Collapse the window to its restart value after a timeout.
    fn restart_window(&mut self);

    /// Override the congestion window, e.g. when leaving fast recovery.
    fn set_congestion_window(&mut self, cwnd: u64);

    /// Restore the just-constructed state so the controller can drive a new
    /// transfer.
    fn reset(&mut self);

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        self.congestion_window() < self.slow_start_thresh()
    }

    /// Whether the controller left slow start on its own, before any loss.
    fn found_slow_start_exit(&self) -> bool {
        false
    }

    /// Current congestion window in bytes.
    fn congestion_window(&self) -> u64;

    /// Current slow start threshold in bytes.
    fn slow_start_thresh(&self) -> u64;

    /// Initial congestion window.
    fn initial_window(&self) -> u64;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cwnd={} ssthresh={}",
            self.name(),
            self.congestion_window(),
            self.slow_start_thresh()
        )
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &FlowConfig) -> Result<Box<dyn CongestionController>> {
    conf.validate()?;

    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Cubic => Ok(Box::new(Cubic::new(CubicConfig::from(conf)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("cubic", Ok(CongestionControlAlgorithm::Cubic)),
            ("Cubic", Ok(CongestionControlAlgorithm::Cubic)),
            ("CUBIC", Ok(CongestionControlAlgorithm::Cubic)),
            (
                "cubci",
                Err(Error::InvalidConfig("unknown algorithm cubci".into())),
            ),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
        assert_eq!(CongestionControlAlgorithm::Cubic.to_string(), "CUBIC");
    }

    #[test]
    fn build_controller() {
        let conf = FlowConfig::default();
        let cc = build_congestion_controller(&conf).unwrap();
        assert_eq!(cc.name(), "CUBIC");
        assert_eq!(cc.congestion_window(), 10 * 1500);
        assert_eq!(cc.initial_window(), 10 * 1500);
        assert_eq!(cc.slow_start_thresh(), u64::MAX);
        assert!(cc.in_slow_start());
        assert!(!cc.found_slow_start_exit());
        assert_eq!(format!("{:?}", cc), format!("CUBIC cwnd=15000 ssthresh={}", u64::MAX));

        let conf = FlowConfig {
            mss: 0,
            ..FlowConfig::default()
        };
        assert!(matches!(
            build_congestion_controller(&conf),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod cube_root;
mod cubic;
mod hystart;
