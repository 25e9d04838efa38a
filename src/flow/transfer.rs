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
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::Ack;
use super::Flow;
use super::Segment;
use crate::Error;
use crate::FlowConfig;
use crate::Result;
use crate::SimTime;

/// Delay between the completion of a transfer and its restart.
const RESTART_DELAY: Duration = Duration::from_millis(1);

/// Outcome of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// All bytes were acknowledged and the transfer stopped.
    Finished { elapsed: Duration },

    /// All bytes were acknowledged and the flow was reset. The driver should
    /// call `start` again at the given time.
    Restart { at: SimTime },
}

/// A finite flow which stops, or starts over, once its data is delivered.
pub struct Transfer {
    flow: Flow,

    /// Whether the transfer is running.
    active: bool,

    /// Start time of the current run.
    started: SimTime,

    /// Number of candidate paths. A path is picked at random on each start.
    path_count: usize,

    /// Path used by the current run.
    path: usize,

    rng: StdRng,

    /// Stop after the first completion instead of restarting.
    stop_when_done: bool,

    /// Number of completed runs.
    completions: u64,
}

impl Transfer {
    /// Create a transfer of `bytes_to_send` bytes over one of `path_count`
    /// paths. `seed` makes path choices reproducible.
    pub fn new(
        id: u64,
        bytes_to_send: u64,
        conf: &FlowConfig,
        path_count: usize,
        seed: u64,
    ) -> Result<Self> {
        if bytes_to_send == 0 {
            return Err(Error::InvalidConfig("empty transfer".into()));
        }

        if path_count == 0 {
            return Err(Error::InvalidConfig("no path available".into()));
        }

        Ok(Transfer {
            flow: Flow::new(id, bytes_to_send, conf)?,
            active: false,
            started: SimTime::ZERO,
            path_count,
            path: 0,
            rng: StdRng::seed_from_u64(seed),
            stop_when_done: false,
            completions: 0,
        })
    }

    /// Stop after the first completion. By default the transfer restarts.
    pub fn set_stop_when_done(&mut self, v: bool) {
        self.stop_when_done = v;
    }

    /// Activate the transfer and pick its path. Returns the path index.
    pub fn start(&mut self, now: SimTime) -> Result<usize> {
        if self.active {
            return Err(Error::InvalidState(format!(
                "{} already started",
                self.flow.trace_id()
            )));
        }

        self.active = true;
        self.started = now;
        self.path = self.rng.gen_range(0..self.path_count);

        debug!(
            "now={:?} {} start {} bytes on path {}",
            now,
            self.flow.trace_id(),
            self.flow.bytes_to_send(),
            self.path
        );

        Ok(self.path)
    }

    /// Return the next segment to send. Returns `Error::Done` while inactive.
    pub fn poll_send(&mut self, now: SimTime) -> Result<Segment> {
        if !self.active {
            return Err(Error::Done);
        }

        self.flow.poll_send(now)
    }

    /// Handle an acknowledgment. Acks arriving while the transfer is
    /// inactive are dropped.
    pub fn on_ack(&mut self, now: SimTime, ack: &Ack) -> Result<Option<TransferEvent>> {
        if !self.active {
            trace!(
                "now={:?} {} drop ack {} while inactive",
                now,
                self.flow.trace_id(),
                ack.ack_seq
            );
            return Ok(None);
        }

        self.flow.on_ack(now, ack)?;

        if !self.flow.is_complete() {
            return Ok(None);
        }

        self.active = false;
        self.completions += 1;

        let elapsed = now.saturating_since(self.started);
        info!(
            "flow {} finished after {} ms",
            self.flow.bytes_to_send(),
            elapsed.as_millis()
        );

        if self.stop_when_done {
            return Ok(Some(TransferEvent::Finished { elapsed }));
        }

        self.flow.reset(now);
        Ok(Some(TransferEvent::Restart {
            at: now + RESTART_DELAY,
        }))
    }

    /// Handle the retransmission timer. Ignored while inactive or before
    /// anything was sent.
    pub fn on_rto(&mut self, now: SimTime) -> bool {
        if !self.active || self.flow.highest_sent() == 0 {
            return false;
        }

        self.flow.on_rto(now)
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Path used by the current, or last, run.
    pub fn path(&self) -> usize {
        self.path
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }

    /// Deadline of the retransmission timer of a running transfer.
    pub fn rto_deadline(&self) -> Option<SimTime> {
        if self.active {
            self.flow.rto_deadline()
        } else {
            None
        }
    }
}
