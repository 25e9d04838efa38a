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

//! Simulated time.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

const PS_PER_NS: u64 = 1_000;
const PS_PER_US: u64 = 1_000_000;
const PS_PER_MS: u64 = 1_000_000_000;
const PS_PER_SEC: u64 = 1_000_000_000_000;

/// A point on the simulated clock, in picoseconds since the start of the
/// simulation.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(pub u64);

impl SimTime {
    /// Start of the simulation.
    pub const ZERO: SimTime = SimTime(0);

    /// Far future, never reached by a running simulation.
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub const fn from_ps(ps: u64) -> Self {
        SimTime(ps)
    }

    pub const fn from_us(us: u64) -> Self {
        SimTime(us.saturating_mul(PS_PER_US))
    }

    pub const fn from_ms(ms: u64) -> Self {
        SimTime(ms.saturating_mul(PS_PER_MS))
    }

    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs.saturating_mul(PS_PER_SEC))
    }

    pub fn as_ps(self) -> u64 {
        self.0
    }

    pub fn as_us(self) -> u64 {
        self.0 / PS_PER_US
    }

    pub fn as_ms(self) -> u64 {
        self.0 / PS_PER_MS
    }

    /// Elapsed time since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        duration_from_ps(self.0.saturating_sub(earlier.0))
    }
}

/// Convert a duration to picoseconds, saturating at `u64::MAX`.
pub fn duration_to_ps(d: Duration) -> u64 {
    let ps = d.as_nanos().saturating_mul(PS_PER_NS as u128);
    u64::try_from(ps).unwrap_or(u64::MAX)
}

/// Convert picoseconds to a duration. Sub-nanosecond precision is dropped.
pub fn duration_from_ps(ps: u64) -> Duration {
    Duration::from_nanos(ps / PS_PER_NS)
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(duration_to_ps(rhs)))
    }
}

impl From<Duration> for SimTime {
    fn from(d: Duration) -> Self {
        SimTime(duration_to_ps(d))
    }
}

impl From<SimTime> for Duration {
    fn from(t: SimTime) -> Self {
        duration_from_ps(t.0)
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}ms", self.0 / PS_PER_MS, (self.0 % PS_PER_MS) / PS_PER_NS)
    }
}
