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

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;

use log::debug;

use cubicsim::Ack;
use cubicsim::FlowConfig;
use cubicsim::Segment;
use cubicsim::SimTime;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Load a flow configuration from a JSON file. Missing fields keep their
/// default value.
pub fn load_flow_config(path: &str) -> Result<FlowConfig> {
    let file = File::open(path)?;
    let conf: FlowConfig = serde_json::from_reader(BufReader::new(file))?;
    conf.validate()?;
    Ok(conf)
}

/// Jain's fairness index of the given allocations, between `1/n` (one flow
/// takes everything) and `1` (perfectly fair).
pub fn jain_fairness_index(xs: &[f64]) -> f64 {
    let sum: f64 = xs.iter().sum();
    let sum_sq: f64 = xs.iter().map(|x| x * x).sum();
    if xs.is_empty() || sum_sq == 0.0 {
        return 1.0;
    }

    sum * sum / (xs.len() as f64 * sum_sq)
}

/// The receiving end of a flow. Reassembles segments and emits cumulative
/// acks.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Next expected byte.
    rcv_nxt: u64,

    /// Out of order data, start offset to end offset.
    ooo: BTreeMap<u64, u64>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive a segment and build its ack.
    pub fn on_segment(&mut self, seg: &Segment, ecn_marked: bool) -> Ack {
        if seg.end() > self.rcv_nxt {
            let end = self.ooo.entry(seg.seq).or_insert(seg.end());
            *end = (*end).max(seg.end());

            while let Some((start, end)) = self.ooo.first_key_value().map(|(&s, &e)| (s, e)) {
                if start > self.rcv_nxt {
                    break;
                }
                self.rcv_nxt = self.rcv_nxt.max(end);
                self.ooo.remove(&start);
            }
        }

        Ack {
            ack_seq: self.rcv_nxt,
            ecn_echo: ecn_marked,
            ts_echo: seg.sent_time,
        }
    }

    pub fn rcv_nxt(&self) -> u64 {
        self.rcv_nxt
    }

    pub fn reset(&mut self) {
        self.rcv_nxt = 0;
        self.ooo.clear();
    }
}

/// A segment waiting in the bottleneck queue.
#[derive(Debug, Clone, Copy)]
pub struct QueuedSegment {
    pub flow: usize,

    /// Run of the transfer that sent the segment.
    pub run: u64,

    pub seg: Segment,
    pub ecn_marked: bool,
}

/// What happened to a segment offered to the bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// Queued behind other segments.
    Queued,

    /// The link was idle: the segment leaves at the given time.
    Departs(SimTime),

    /// The queue was full.
    Dropped,
}

/// Statistics about the bottleneck.
#[derive(Debug, Default, Clone)]
pub struct LinkStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub ecn_marked: u64,
    pub max_queue: usize,
}

/// A drop-tail bottleneck link with optional ECN marking.
#[derive(Debug)]
pub struct Bottleneck {
    /// Serialization time of one byte in picoseconds.
    ps_per_byte: u64,

    /// Queue capacity in segments.
    queue_size: usize,

    /// Mark ECN capable segments when this many segments are queued.
    ecn_threshold: Option<usize>,

    /// The head of the queue is being transmitted.
    queue: VecDeque<QueuedSegment>,

    pub stats: LinkStats,
}

impl Bottleneck {
    /// Create a link of `rate_mbps` Mbps.
    pub fn new(rate_mbps: u64, queue_size: usize, ecn_threshold: Option<usize>) -> Self {
        Self {
            ps_per_byte: 8_000_000 / rate_mbps.max(1),
            queue_size: queue_size.max(1),
            ecn_threshold,
            queue: VecDeque::with_capacity(queue_size),
            stats: LinkStats::default(),
        }
    }

    /// Time needed to put `len` bytes on the wire.
    pub fn tx_time_ps(&self, len: u64) -> u64 {
        len.saturating_mul(self.ps_per_byte)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Offer a segment to the link.
    pub fn enqueue(&mut self, now: SimTime, flow: usize, run: u64, seg: Segment) -> Enqueue {
        if self.queue.len() >= self.queue_size {
            self.stats.dropped += 1;
            debug!("now={:?} link drop flow {} seq {}", now, flow, seg.seq);
            return Enqueue::Dropped;
        }

        let ecn_marked = seg.ecn_capable
            && self
                .ecn_threshold
                .map_or(false, |thresh| self.queue.len() >= thresh);
        if ecn_marked {
            self.stats.ecn_marked += 1;
        }

        self.queue.push_back(QueuedSegment {
            flow,
            run,
            seg,
            ecn_marked,
        });
        self.stats.max_queue = self.stats.max_queue.max(self.queue.len());

        if self.queue.len() == 1 {
            Enqueue::Departs(SimTime::from_ps(
                now.as_ps().saturating_add(self.tx_time_ps(seg.len)),
            ))
        } else {
            Enqueue::Queued
        }
    }

    /// Finish transmitting the head of the queue. Returns the segment and
    /// the departure time of the next one, if any.
    pub fn depart(&mut self, now: SimTime) -> Option<(QueuedSegment, Option<SimTime>)> {
        let head = self.queue.pop_front()?;
        self.stats.forwarded += 1;

        let next = self
            .queue
            .front()
            .map(|q| SimTime::from_ps(now.as_ps().saturating_add(self.tx_time_ps(q.seg.len))));
        Some((head, next))
    }
}
