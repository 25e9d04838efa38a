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

//! cubicsim is the CUBIC congestion control engine of a discrete-event
//! datacenter network simulator.
//!
//! ## Overview
//!
//! * **Congestion control**: an integer implementation of CUBIC with HyStart
//!   slow start exit, a Reno-friendly region, fast convergence and optional
//!   ECN reaction. Window arithmetic is bit-for-bit reproducible.
//! * **Flow engine**: a window-based sender with cumulative acks, fast
//!   retransmit on three duplicate acks, and retransmission timeouts with
//!   exponential back-off.
//! * **Finite transfers**: a driver that stops or restarts a flow once a
//!   given number of bytes has been acknowledged.
//!
//! The simulator clock is [`SimTime`], a picosecond counter. Nothing in the
//! crate reads the wall clock: every hook takes the current time explicitly,
//! so a simulation run depends only on its inputs.
//!
//! ## Get started
//!
//! See the `cubic_dumbbell` program in the `tools` directory, which runs
//! several CUBIC flows over one bottleneck link.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// The default maximum segment size in bytes.
pub const DEFAULT_MSS: u32 = 1500;

/// The default initial congestion window in segments.
pub const DEFAULT_INITIAL_CONGESTION_WINDOW: u64 = 10;

/// Timer granularity of the simulated hosts.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// The retransmission timeout used before any RTT sample.
pub const DEFAULT_INITIAL_RTO: Duration = Duration::from_millis(3000);

/// Lower limit of the retransmission timeout.
pub const DEFAULT_MIN_RTO: Duration = Duration::from_millis(10);

/// Upper limit of the retransmission timeout.
pub const DEFAULT_MAX_RTO: Duration = Duration::from_secs(60);

/// Result type for simulator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about a simulated flow: segment size, congestion control
/// and retransmission timeout.
///
/// Missing fields take their default value when deserialized, so a partial
/// JSON document such as `{"ecn_enabled": true}` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// The maximum segment size in bytes.
    pub mss: u32,

    /// The initial congestion window in segments.
    pub initial_congestion_window: u64,

    /// The threshold for slow start in bytes.
    pub slow_start_thresh: u64,

    /// The congestion control algorithm used by the flow.
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// Leave slow start when HyStart detects a delay increase.
    pub hystart_enabled: bool,

    /// Grow at least as fast as a Reno flow would.
    pub tcp_friendliness: bool,

    /// Release bandwidth faster when losses happen below the previous peak.
    pub fast_convergence: bool,

    /// Send ECN-capable segments and react to congestion marks.
    pub ecn_enabled: bool,

    /// The retransmission timeout used before an RTT sample is available.
    pub initial_rto: Duration,

    /// Lower limit of the retransmission timeout.
    pub min_rto: Duration,

    /// Upper limit of the retransmission timeout, including back-off.
    pub max_rto: Duration,
}

impl FlowConfig {
    /// Create default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum segment size in bytes. The default value is `1500`.
    pub fn set_mss(&mut self, v: u32) {
        self.mss = v;
    }

    /// Set the initial congestion window in segments. The default value is
    /// `10`.
    pub fn set_initial_congestion_window(&mut self, v: u64) {
        self.initial_congestion_window = v;
    }

    /// Set the initial slow start threshold in bytes. Slow start is
    /// unbounded by default.
    pub fn set_slow_start_thresh(&mut self, v: u64) {
        self.slow_start_thresh = v;
    }

    /// Set the congestion control algorithm.
    pub fn set_congestion_control_algorithm(&mut self, v: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = v;
    }

    /// Enable HyStart. The default value is true.
    pub fn enable_hystart(&mut self, v: bool) {
        self.hystart_enabled = v;
    }

    /// Enable the Reno-friendly region. The default value is true.
    pub fn enable_tcp_friendliness(&mut self, v: bool) {
        self.tcp_friendliness = v;
    }

    /// Enable fast convergence. The default value is true.
    pub fn enable_fast_convergence(&mut self, v: bool) {
        self.fast_convergence = v;
    }

    /// Enable ECN. The default value is false.
    pub fn enable_ecn(&mut self, v: bool) {
        self.ecn_enabled = v;
    }

    /// Set the initial retransmission timeout in milliseconds. The value is
    /// at least `TIMER_GRANULARITY`.
    pub fn set_initial_rto(&mut self, v: u64) {
        self.initial_rto = Duration::from_millis(v).max(TIMER_GRANULARITY);
    }

    /// Set the lower limit of the retransmission timeout in milliseconds.
    pub fn set_min_rto(&mut self, v: u64) {
        self.min_rto = Duration::from_millis(v).max(TIMER_GRANULARITY);
    }

    /// Set the upper limit of the retransmission timeout in milliseconds.
    pub fn set_max_rto(&mut self, v: u64) {
        self.max_rto = Duration::from_millis(v).max(TIMER_GRANULARITY);
    }

    /// Check that the configuration can drive a flow.
    pub fn validate(&self) -> Result<()> {
        if self.mss == 0 {
            return Err(Error::InvalidConfig("mss must be positive".into()));
        }

        if self.initial_congestion_window == 0 {
            return Err(Error::InvalidConfig(
                "initial congestion window must be positive".into(),
            ));
        }

        if self.min_rto > self.max_rto {
            return Err(Error::InvalidConfig(format!(
                "min_rto {:?} exceeds max_rto {:?}",
                self.min_rto, self.max_rto
            )));
        }

        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> FlowConfig {
        FlowConfig {
            mss: DEFAULT_MSS,
            initial_congestion_window: DEFAULT_INITIAL_CONGESTION_WINDOW,
            slow_start_thresh: u64::MAX,
            congestion_control_algorithm: CongestionControlAlgorithm::Cubic,
            hystart_enabled: true,
            tcp_friendliness: true,
            fast_convergence: true,
            ecn_enabled: false,
            initial_rto: DEFAULT_INITIAL_RTO,
            min_rto: DEFAULT_MIN_RTO,
            max_rto: DEFAULT_MAX_RTO,
        }
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::AckSample;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::Cubic;
pub use crate::congestion_control::CubicConfig;
pub use crate::error::Error;
pub use crate::flow::Ack;
pub use crate::flow::Flow;
pub use crate::flow::FlowStats;
pub use crate::flow::Segment;
pub use crate::flow::Transfer;
pub use crate::flow::TransferEvent;
pub use crate::time::SimTime;
pub use crate::timer_queue::TimerQueue;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[path = "flow/flow.rs"]
pub mod flow;

pub mod error;
pub mod time;
pub mod timer_queue;
