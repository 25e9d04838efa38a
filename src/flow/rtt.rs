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

use std::cmp;
use std::time::Duration;

use crate::TIMER_GRANULARITY;

/// RTT estimation and retransmission timeout of a flow.
/// See RFC 6298
#[derive(Debug)]
pub struct RttEstimator {
    /// The most recent RTT sample.
    latest_rtt: Duration,

    /// Exponentially weighted moving average of the RTT samples.
    smoothed_rtt: Option<Duration>,

    /// Mean variation of the RTT samples.
    rttvar: Duration,

    /// The minimum RTT observed.
    min_rtt: Duration,

    /// The maximum RTT observed.
    max_rtt: Duration,

    /// Timeout used until the first sample.
    initial_rto: Duration,

    /// Lower limit of the computed timeout.
    min_rto: Duration,

    /// Upper limit of the computed timeout.
    max_rto: Duration,
}

impl RttEstimator {
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration) -> Self {
        Self {
            latest_rtt: Duration::ZERO,
            smoothed_rtt: None,
            rttvar: Duration::ZERO,
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            initial_rto,
            min_rto,
            max_rto,
        }
    }

    /// Return the current best RTT estimation.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(self.latest_rtt)
    }

    /// Return the latest rtt sample
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// Return the minimum RTT observed so far, if any sample was taken.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.smoothed_rtt.map(|_| self.min_rtt)
    }

    /// Return the variation in the RTT samples using a mean variation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Return the Maximum RTT observed so far for this estimator.
    pub fn max_rtt(&self) -> Duration {
        self.max_rtt
    }

    /// Whether at least one sample was taken.
    pub fn has_sample(&self) -> bool {
        self.smoothed_rtt.is_some()
    }

    /// Return the retransmission timeout before back-off.
    pub fn rto(&self) -> Duration {
        if self.smoothed_rtt.is_none() {
            return self.initial_rto;
        }

        let rto = self.smoothed_rtt() + cmp::max(4 * self.rttvar, TIMER_GRANULARITY);
        rto.max(self.min_rto).min(self.max_rto)
    }

    /// Upper limit of the timeout, back-off included.
    pub fn max_rto(&self) -> Duration {
        self.max_rto
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        *self = Self::new(self.initial_rto, self.min_rto, self.max_rto);
    }

    /// Update estimator with the given RTT sample
    pub fn update(&mut self, rtt: Duration) {
        self.latest_rtt = rtt;
        self.min_rtt = cmp::min(self.min_rtt, rtt);
        self.max_rtt = cmp::max(self.max_rtt, rtt);

        if let Some(smoothed_rtt) = self.smoothed_rtt {
            let var_sample = if smoothed_rtt > rtt {
                smoothed_rtt - rtt
            } else {
                rtt - smoothed_rtt
            };

            self.rttvar = (3 * self.rttvar + var_sample) / 4;
            self.smoothed_rtt = Some((7 * smoothed_rtt + rtt) / 8);
        } else {
            self.smoothed_rtt = Some(rtt);
            self.rttvar = rtt / 2;
        }
    }
}
