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

//! A window-based sender driving one congestion controller.
//!
//! The flow numbers bytes from zero and relies on cumulative acks. It keeps
//! the sequence and RTT bookkeeping and detects losses, three duplicate acks
//! trigger a fast retransmit and an expired retransmission timer triggers a
//! go-back-N restart. Window decisions are left to the controller.

use std::time::Duration;

use log::*;
use serde::Serialize;

use crate::congestion_control::build_congestion_controller;
use crate::congestion_control::AckSample;
use crate::congestion_control::CongestionController;
use crate::congestion_control::CongestionStats;
use crate::Error;
use crate::FlowConfig;
use crate::Result;
use crate::SimTime;
pub use rtt::RttEstimator;
pub use transfer::Transfer;
pub use transfer::TransferEvent;

/// Number of duplicate acks that signal a loss.
const DUP_ACK_THRESHOLD: u32 = 3;

/// Largest exponent applied to the retransmission timeout.
const MAX_RTO_BACKOFF: u32 = 16;

/// A data segment emitted by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Offset of the first byte.
    pub seq: u64,

    /// Payload length in bytes.
    pub len: u64,

    /// Time the segment left the sender.
    pub sent_time: SimTime,

    /// Whether the segment may be ECN marked by the network.
    pub ecn_capable: bool,

    /// Whether the bytes were sent before.
    pub retransmission: bool,
}

impl Segment {
    /// Offset following the last byte of the segment.
    pub fn end(&self) -> u64 {
        self.seq + self.len
    }
}

/// A cumulative acknowledgment received by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// All bytes below this offset were received.
    pub ack_seq: u64,

    /// The acked segment carried a congestion mark.
    pub ecn_echo: bool,

    /// Send time of the segment that triggered the ack.
    pub ts_echo: SimTime,
}

/// Statistics about a flow.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FlowStats {
    /// The number of segments sent.
    pub sent_count: u64,

    /// The number of sent bytes.
    pub sent_bytes: u64,

    /// The number of retransmitted segments.
    pub retrans_count: u64,

    /// Total number of bytes acked.
    pub acked_bytes: u64,

    /// The number of duplicate acks received.
    pub dup_acks: u64,

    /// The number of fast retransmits.
    pub fast_retransmits: u64,

    /// The number of retransmission timeouts.
    pub rto_count: u64,

    /// Maximum congestion window in bytes.
    pub max_cwnd: u64,
}

/// A simulated sender.
pub struct Flow {
    /// Flow identifier.
    id: u64,

    /// Prefix of the log lines about this flow.
    trace_id: String,

    /// Max segment size.
    mss: u64,

    /// Whether segments are ECN capable.
    ecn_enabled: bool,

    /// Size of the data to send.
    bytes_to_send: u64,

    /// Congestion controller.
    congestion: Box<dyn CongestionController>,

    /// RTT estimator.
    rtt: RttEstimator,

    /// Offset of the next new byte to send.
    highest_sent: u64,

    /// Highest offset ever sent, kept across go-back-N.
    snd_max: u64,

    /// Cumulative ack point.
    last_acked: u64,

    /// Consecutive duplicate acks.
    dup_acks: u32,

    /// Fast recovery ends once `recover` is acked.
    in_fast_recovery: bool,

    /// Highest offset sent when the last loss was detected. A new fast
    /// retransmit needs the ack point to reach it.
    recover: u64,

    /// Offset of the hole to retransmit next.
    retransmit_pending: Option<u64>,

    /// Deadline of the retransmission timer.
    rto_deadline: Option<SimTime>,

    /// Number of consecutive timeouts.
    rto_backoff: u32,

    stats: FlowStats,
}

impl Flow {
    /// Create a flow sending `bytes_to_send` bytes.
    pub fn new(id: u64, bytes_to_send: u64, conf: &FlowConfig) -> Result<Self> {
        let congestion = build_congestion_controller(conf)?;

        let stats = FlowStats {
            max_cwnd: congestion.congestion_window(),
            ..FlowStats::default()
        };

        Ok(Flow {
            id,
            trace_id: format!("flow-{}", id),
            mss: conf.mss as u64,
            ecn_enabled: conf.ecn_enabled,
            bytes_to_send,
            congestion,
            rtt: RttEstimator::new(conf.initial_rto, conf.min_rto, conf.max_rto),
            highest_sent: 0,
            snd_max: 0,
            last_acked: 0,
            dup_acks: 0,
            in_fast_recovery: false,
            recover: 0,
            retransmit_pending: None,
            rto_deadline: None,
            rto_backoff: 0,
            stats,
        })
    }

    /// Return the next segment to send.
    ///
    /// A pending retransmission goes first. Returns `Error::Done` if the
    /// window is full or there is no data left.
    pub fn poll_send(&mut self, now: SimTime) -> Result<Segment> {
        let seg = if let Some(seq) = self.retransmit_pending.take() {
            let len = self.mss.min(self.bytes_to_send.saturating_sub(seq));
            if len == 0 {
                return Err(Error::Done);
            }

            self.stats.retrans_count += 1;
            Segment {
                seq,
                len,
                sent_time: now,
                ecn_capable: self.ecn_enabled,
                retransmission: true,
            }
        } else {
            if self.highest_sent >= self.bytes_to_send {
                return Err(Error::Done);
            }

            let len = self.mss.min(self.bytes_to_send - self.highest_sent);
            let window_end = self
                .last_acked
                .saturating_add(self.congestion.congestion_window());
            if self.highest_sent + len > window_end {
                return Err(Error::Done);
            }

            let retransmission = self.highest_sent < self.snd_max;
            if retransmission {
                self.stats.retrans_count += 1;
            }

            let seg = Segment {
                seq: self.highest_sent,
                len,
                sent_time: now,
                ecn_capable: self.ecn_enabled,
                retransmission,
            };
            self.highest_sent += len;
            self.snd_max = self.snd_max.max(self.highest_sent);
            seg
        };

        self.stats.sent_count += 1;
        self.stats.sent_bytes += seg.len;

        if self.rto_deadline.is_none() {
            self.rto_deadline = Some(now + self.rto());
        }

        trace!(
            "now={:?} {} ON_SENT seq={} len={} inflight={} cwnd={}",
            now,
            self.trace_id,
            seg.seq,
            seg.len,
            self.bytes_in_flight(),
            self.congestion.congestion_window()
        );

        Ok(seg)
    }

    /// Handle an acknowledgment.
    pub fn on_ack(&mut self, now: SimTime, ack: &Ack) -> Result<()> {
        if ack.ack_seq > self.snd_max {
            warn!(
                "{} ack {} beyond highest sent {}",
                self.trace_id, ack.ack_seq, self.snd_max
            );
            return Err(Error::InvalidState(format!(
                "ack {} beyond highest sent {}",
                ack.ack_seq, self.snd_max
            )));
        }

        if ack.ack_seq > self.last_acked {
            self.on_new_ack(now, ack);
            return Ok(());
        }

        // Stale acks carry no information.
        if ack.ack_seq < self.last_acked || self.bytes_in_flight() == 0 {
            return Ok(());
        }

        self.dup_acks += 1;
        self.stats.dup_acks += 1;

        if ack.ecn_echo {
            self.congestion.on_ecn(now);
        }

        // Duplicates of data sent before a timeout do not start another
        // recovery.
        if self.dup_acks == DUP_ACK_THRESHOLD
            && !self.in_fast_recovery
            && self.last_acked >= self.recover
        {
            let ssthresh = self.congestion.on_loss(now);
            self.congestion.set_congestion_window(ssthresh);

            self.in_fast_recovery = true;
            self.recover = self.snd_max;
            self.retransmit_pending = Some(self.last_acked);
            self.stats.fast_retransmits += 1;

            trace!(
                "now={:?} {} {} FAST_RETRANSMIT seq={} cwnd={} ssthresh={}",
                now,
                self.trace_id,
                self.congestion.name(),
                self.last_acked,
                self.congestion.congestion_window(),
                self.congestion.slow_start_thresh()
            );
        }

        Ok(())
    }

    fn on_new_ack(&mut self, now: SimTime, ack: &Ack) {
        let acked_bytes = ack.ack_seq - self.last_acked;
        self.last_acked = ack.ack_seq;
        self.highest_sent = self.highest_sent.max(self.last_acked);
        self.dup_acks = 0;
        self.stats.acked_bytes += acked_bytes;

        let rtt = Some(now.saturating_since(ack.ts_echo)).filter(|rtt| !rtt.is_zero());
        if let Some(rtt) = rtt {
            self.rtt.update(rtt);
        }

        if self.in_fast_recovery {
            if ack.ecn_echo {
                self.congestion.on_ecn(now);
            }

            if self.last_acked >= self.recover {
                self.in_fast_recovery = false;
                let ssthresh = self.congestion.slow_start_thresh();
                self.congestion.set_congestion_window(ssthresh);
            } else {
                // Partial ack: the next hole is lost too.
                self.retransmit_pending = Some(self.last_acked);
            }
        } else {
            let sample = AckSample {
                acked_bytes,
                rtt,
                ecn_marked: ack.ecn_echo,
                highest_sent_seq: self.snd_max,
            };
            self.congestion.on_ack(now, &sample);
        }

        self.stats.max_cwnd = self
            .stats
            .max_cwnd
            .max(self.congestion.congestion_window());

        self.rto_backoff = 0;
        self.rto_deadline = if self.bytes_in_flight() == 0 && self.retransmit_pending.is_none() {
            None
        } else {
            Some(now + self.rto())
        };

        trace!(
            "now={:?} {} {} ON_ACK ack={} acked={} rtt={:?} inflight={} cwnd={} ssthresh={}",
            now,
            self.trace_id,
            self.congestion.name(),
            ack.ack_seq,
            acked_bytes,
            rtt,
            self.bytes_in_flight(),
            self.congestion.congestion_window(),
            self.congestion.slow_start_thresh()
        );
    }

    /// Handle the retransmission timer. Returns true if the timeout fired.
    pub fn on_rto(&mut self, now: SimTime) -> bool {
        match self.rto_deadline {
            Some(deadline) if deadline <= now => (),
            _ => return false,
        }

        if self.snd_max == self.last_acked {
            self.rto_deadline = None;
            return false;
        }

        self.congestion.on_timeout(now);
        self.congestion.on_loss(now);
        self.congestion.restart_window();

        // Go back N.
        self.highest_sent = self.last_acked;
        self.recover = self.snd_max;
        self.retransmit_pending = None;
        self.in_fast_recovery = false;
        self.dup_acks = 0;

        self.rto_backoff = (self.rto_backoff + 1).min(MAX_RTO_BACKOFF);
        self.rto_deadline = Some(now + self.rto());
        self.stats.rto_count += 1;

        trace!(
            "now={:?} {} {} ON_RTO backoff={} cwnd={} ssthresh={} next={:?}",
            now,
            self.trace_id,
            self.congestion.name(),
            self.rto_backoff,
            self.congestion.congestion_window(),
            self.congestion.slow_start_thresh(),
            self.rto_deadline
        );

        true
    }

    /// Return the flow to its just-constructed state. Statistics keep
    /// accumulating.
    pub fn reset(&mut self, now: SimTime) {
        self.congestion.reset();
        self.rtt.reset();
        self.highest_sent = 0;
        self.snd_max = 0;
        self.last_acked = 0;
        self.dup_acks = 0;
        self.in_fast_recovery = false;
        self.recover = 0;
        self.retransmit_pending = None;
        self.rto_deadline = None;
        self.rto_backoff = 0;

        debug!("now={:?} {} reset", now, self.trace_id);
    }

    /// Current retransmission timeout, back-off included.
    pub fn rto(&self) -> Duration {
        self.rtt
            .rto()
            .saturating_mul(1 << self.rto_backoff)
            .min(self.rtt.max_rto())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn congestion_window(&self) -> u64 {
        self.congestion.congestion_window()
    }

    pub fn slow_start_thresh(&self) -> u64 {
        self.congestion.slow_start_thresh()
    }

    /// Whether slow start was left on a delay increase, before any loss.
    pub fn found_slow_start_exit(&self) -> bool {
        self.congestion.found_slow_start_exit()
    }

    /// Bytes delivered so far.
    pub fn bytes_acked(&self) -> u64 {
        self.last_acked
    }

    /// Highest offset sent since the flow was created or reset.
    pub fn highest_sent(&self) -> u64 {
        self.snd_max
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.highest_sent.saturating_sub(self.last_acked)
    }

    pub fn bytes_to_send(&self) -> u64 {
        self.bytes_to_send
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.in_fast_recovery
    }

    /// Whether all data was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.last_acked >= self.bytes_to_send
    }

    pub fn rto_deadline(&self) -> Option<SimTime> {
        self.rto_deadline
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }

    pub fn congestion_stats(&self) -> &CongestionStats {
        self.congestion.stats()
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?} acked={}/{} inflight={}",
            self.trace_id,
            self.congestion,
            self.last_acked,
            self.bytes_to_send,
            self.bytes_in_flight()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: u64 = 1500;

    fn ack_at(ack_seq: u64, ts_echo: SimTime) -> Ack {
        Ack {
            ack_seq,
            ecn_echo: false,
            ts_echo,
        }
    }

    /// Send until the window is full.
    fn send_all(flow: &mut Flow, now: SimTime) -> Vec<Segment> {
        std::iter::from_fn(|| flow.poll_send(now).ok()).collect()
    }

    #[test]
    fn flow_initial_window() -> Result<()> {
        let mut flow = Flow::new(7, 1_000_000, &FlowConfig::default())?;
        assert_eq!(flow.trace_id(), "flow-7");
        assert_eq!(flow.rto_deadline(), None);

        let now = SimTime::from_ms(1);
        let segs = send_all(&mut flow, now);
        assert_eq!(segs.len(), 10);
        assert!(segs.iter().all(|s| s.len == MSS && !s.ecn_capable));
        assert_eq!(segs[9].seq, 9 * MSS);
        assert_eq!(flow.bytes_in_flight(), 10 * MSS);
        assert_eq!(flow.poll_send(now), Err(Error::Done));
        assert_eq!(flow.rto_deadline(), Some(now + Duration::from_secs(3)));
        assert_eq!(flow.stats().sent_count, 10);

        Ok(())
    }

    #[test]
    fn flow_last_segment_and_completion() -> Result<()> {
        let mut flow = Flow::new(1, 4000, &FlowConfig::default())?;
        let now = SimTime::from_ms(1);
        let segs = send_all(&mut flow, now);
        assert_eq!(
            segs.iter().map(|s| s.len).collect::<Vec<_>>(),
            vec![1500, 1500, 1000]
        );
        assert!(!flow.is_complete());

        flow.on_ack(SimTime::from_ms(2), &ack_at(4000, now))?;
        assert!(flow.is_complete());
        assert_eq!(flow.bytes_acked(), 4000);
        assert_eq!(flow.bytes_in_flight(), 0);
        assert_eq!(flow.rto_deadline(), None);
        assert_eq!(flow.poll_send(SimTime::from_ms(2)), Err(Error::Done));

        Ok(())
    }

    #[test]
    fn flow_slow_start_growth() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        let t0 = SimTime::from_ms(1);
        send_all(&mut flow, t0);

        let t1 = SimTime::from_ms(11);
        flow.on_ack(t1, &ack_at(MSS, t0))?;
        assert_eq!(flow.congestion_window(), 11 * MSS);
        assert_eq!(flow.rtt().latest_rtt(), Duration::from_millis(10));
        assert_eq!(flow.bytes_in_flight(), 9 * MSS);
        assert_eq!(flow.rto_deadline(), Some(t1 + flow.rto()));

        // The window slid by one segment and grew by one.
        assert_eq!(send_all(&mut flow, t1).len(), 2);
        assert_eq!(flow.stats().max_cwnd, 11 * MSS);

        Ok(())
    }

    #[test]
    fn flow_ack_beyond_highest_sent() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        send_all(&mut flow, SimTime::ZERO);

        let err = flow.on_ack(SimTime::from_ms(1), &ack_at(10 * MSS + 1, SimTime::ZERO));
        assert!(matches!(err, Err(Error::InvalidState(_))));
        assert_eq!(flow.bytes_acked(), 0);

        Ok(())
    }

    #[test]
    fn flow_stale_ack_ignored() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        send_all(&mut flow, SimTime::ZERO);
        flow.on_ack(SimTime::from_ms(1), &ack_at(3 * MSS, SimTime::ZERO))?;
        let cwnd = flow.congestion_window();

        flow.on_ack(SimTime::from_ms(2), &ack_at(MSS, SimTime::ZERO))?;
        assert_eq!(flow.congestion_window(), cwnd);
        assert_eq!(flow.bytes_acked(), 3 * MSS);
        assert_eq!(flow.stats().dup_acks, 0);

        Ok(())
    }

    #[test]
    fn flow_fast_retransmit() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        let t0 = SimTime::from_ms(1);
        send_all(&mut flow, t0);

        flow.on_ack(SimTime::from_ms(2), &ack_at(MSS, t0))?;
        assert_eq!(flow.congestion_window(), 16500);

        for i in 0..2 {
            flow.on_ack(SimTime::from_ms(3 + i), &ack_at(MSS, t0))?;
            assert!(!flow.in_fast_recovery());
        }
        flow.on_ack(SimTime::from_ms(5), &ack_at(MSS, t0))?;
        assert!(flow.in_fast_recovery());
        assert_eq!(flow.slow_start_thresh(), 16500 * 717 / 1024);
        assert_eq!(flow.congestion_window(), 11553);
        assert_eq!(flow.stats().fast_retransmits, 1);

        // The hole goes first.
        let seg = flow.poll_send(SimTime::from_ms(5))?;
        assert_eq!(seg.seq, MSS);
        assert!(seg.retransmission);

        // Further duplicates do not trigger another loss.
        flow.on_ack(SimTime::from_ms(6), &ack_at(MSS, t0))?;
        assert_eq!(flow.congestion_stats().loss_events, 1);

        // Partial ack: the next hole is retransmitted.
        flow.on_ack(SimTime::from_ms(7), &ack_at(2 * MSS, t0))?;
        assert!(flow.in_fast_recovery());
        assert_eq!(flow.poll_send(SimTime::from_ms(7))?.seq, 2 * MSS);

        // Everything sent before the loss is acked: recovery ends.
        flow.on_ack(SimTime::from_ms(8), &ack_at(10 * MSS, t0))?;
        assert!(!flow.in_fast_recovery());
        assert_eq!(flow.congestion_window(), 11553);

        Ok(())
    }

    #[test]
    fn flow_retransmission_timeout() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        let t0 = SimTime::from_ms(1);
        send_all(&mut flow, t0);

        let deadline = t0 + Duration::from_secs(3);
        assert!(!flow.on_rto(SimTime::from_ms(2000)));
        assert!(flow.on_rto(deadline));

        assert_eq!(flow.congestion_window(), MSS);
        assert_eq!(flow.slow_start_thresh(), 15000 * 717 / 1024);
        assert_eq!(flow.bytes_in_flight(), 0);
        assert_eq!(flow.stats().rto_count, 1);
        assert_eq!(flow.congestion_stats().timeouts, 1);
        // Backed off.
        assert_eq!(flow.rto(), Duration::from_secs(6));
        assert_eq!(flow.rto_deadline(), Some(deadline + Duration::from_secs(6)));

        // Go back N: resend from the ack point, one segment only.
        let seg = flow.poll_send(deadline)?;
        assert_eq!(seg.seq, 0);
        assert!(seg.retransmission);
        assert_eq!(flow.poll_send(deadline), Err(Error::Done));

        // The ack resets the back-off.
        flow.on_ack(deadline + Duration::from_millis(10), &ack_at(MSS, deadline))?;
        assert_eq!(flow.rto(), Duration::from_millis(30));

        Ok(())
    }

    #[test]
    fn flow_duplicate_acks_after_timeout() -> Result<()> {
        let mut flow = Flow::new(1, u64::MAX, &FlowConfig::default())?;
        let t0 = SimTime::from_ms(1);
        send_all(&mut flow, t0);

        let deadline = flow.rto_deadline().unwrap();
        assert!(flow.on_rto(deadline));
        assert_eq!(flow.poll_send(deadline)?.seq, 0);
        assert_eq!(flow.congestion_stats().loss_events, 1);

        // Duplicates triggered by segments sent before the timeout.
        for i in 0..3 {
            flow.on_ack(deadline + Duration::from_millis(i + 1), &ack_at(0, t0))?;
        }
        assert_eq!(flow.stats().dup_acks, 3);
        assert_eq!(flow.stats().fast_retransmits, 0);
        assert_eq!(flow.congestion_stats().loss_events, 1);
        assert!(!flow.in_fast_recovery());
        assert_eq!(flow.congestion_window(), MSS);
        assert_eq!(flow.slow_start_thresh(), 10502);

        // Once the data sent before the timeout is acked, duplicates start
        // a fast retransmit again.
        let now = deadline + Duration::from_millis(10);
        flow.on_ack(now, &ack_at(10 * MSS, deadline))?;
        assert_eq!(flow.congestion_window(), 2 * MSS);
        assert_eq!(send_all(&mut flow, now).len(), 2);
        for i in 0..3 {
            flow.on_ack(now + Duration::from_millis(i + 1), &ack_at(10 * MSS, now))?;
        }
        assert_eq!(flow.stats().fast_retransmits, 1);
        assert_eq!(flow.congestion_stats().loss_events, 2);
        assert!(flow.in_fast_recovery());

        Ok(())
    }

    #[test]
    fn flow_rto_backoff_capped() -> Result<()> {
        let mut conf = FlowConfig::default();
        conf.set_max_rto(10_000);
        let mut flow = Flow::new(1, u64::MAX, &conf)?;
        let mut now = SimTime::ZERO;
        send_all(&mut flow, now);

        for _ in 0..5 {
            now = flow.rto_deadline().unwrap();
            assert!(flow.on_rto(now));
        }
        assert_eq!(flow.rto(), Duration::from_secs(10));

        Ok(())
    }

    #[test]
    fn flow_rto_with_nothing_outstanding() -> Result<()> {
        let mut flow = Flow::new(1, 3000, &FlowConfig::default())?;
        let t0 = SimTime::ZERO;
        send_all(&mut flow, t0);
        flow.on_ack(SimTime::from_ms(1), &ack_at(3000, t0))?;

        assert!(!flow.on_rto(SimTime::from_secs(100)));
        assert_eq!(flow.congestion_stats().timeouts, 0);

        Ok(())
    }

    #[test]
    fn flow_ecn() -> Result<()> {
        let mut conf = FlowConfig::default();
        conf.enable_ecn(true);
        conf.set_slow_start_thresh(10000);
        let mut flow = Flow::new(1, u64::MAX, &conf)?;
        let t0 = SimTime::ZERO;
        let segs = send_all(&mut flow, t0);
        assert!(segs.iter().all(|s| s.ecn_capable));

        let ack = Ack {
            ecn_echo: true,
            ..ack_at(MSS, t0)
        };
        flow.on_ack(SimTime::from_ms(1), &ack)?;
        assert_eq!(flow.slow_start_thresh(), 10502);
        assert_eq!(flow.congestion_window(), 10502);
        assert_eq!(flow.congestion_stats().ecn_reductions, 1);

        Ok(())
    }

    #[test]
    fn flow_ecn_on_duplicate_ack() -> Result<()> {
        let mut conf = FlowConfig::default();
        conf.enable_ecn(true);
        conf.set_slow_start_thresh(10000);
        let mut flow = Flow::new(1, u64::MAX, &conf)?;
        let t0 = SimTime::ZERO;
        send_all(&mut flow, t0);
        assert!(flow.congestion_window() > flow.slow_start_thresh());

        let ack = Ack {
            ecn_echo: true,
            ..ack_at(0, t0)
        };
        flow.on_ack(SimTime::from_ms(1), &ack)?;
        assert_eq!(flow.stats().dup_acks, 1);
        assert_eq!(flow.congestion_stats().ecn_reductions, 1);
        assert_eq!(flow.slow_start_thresh(), 10502);
        assert_eq!(flow.congestion_window(), flow.slow_start_thresh());

        Ok(())
    }

    #[test]
    fn flow_ecn_on_partial_ack_in_recovery() -> Result<()> {
        let mut conf = FlowConfig::default();
        conf.enable_ecn(true);
        let mut flow = Flow::new(1, u64::MAX, &conf)?;
        let t0 = SimTime::from_ms(1);
        send_all(&mut flow, t0);

        flow.on_ack(SimTime::from_ms(2), &ack_at(MSS, t0))?;
        for i in 0..3 {
            flow.on_ack(SimTime::from_ms(3 + i), &ack_at(MSS, t0))?;
        }
        assert!(flow.in_fast_recovery());
        assert_eq!(flow.congestion_window(), 11553);
        assert_eq!(flow.congestion_stats().ecn_marks, 0);

        // The mark reaches the controller. The window already sits at
        // ssthresh, so it is not reduced again.
        let ack = Ack {
            ecn_echo: true,
            ..ack_at(2 * MSS, t0)
        };
        flow.on_ack(SimTime::from_ms(7), &ack)?;
        assert_eq!(flow.congestion_stats().ecn_marks, 1);
        assert_eq!(flow.congestion_stats().ecn_reductions, 0);
        assert_eq!(flow.congestion_window(), 11553);
        assert_eq!(flow.congestion_stats().loss_events, 1);
        assert!(flow.in_fast_recovery());
        assert_eq!(flow.poll_send(SimTime::from_ms(7))?.seq, 2 * MSS);

        Ok(())
    }

    #[test]
    fn flow_reset() -> Result<()> {
        let mut flow = Flow::new(1, 30_000, &FlowConfig::default())?;
        let t0 = SimTime::ZERO;
        send_all(&mut flow, t0);
        flow.on_ack(SimTime::from_ms(5), &ack_at(5 * MSS, t0))?;
        assert!(flow.rto_deadline().is_some());

        flow.reset(SimTime::from_ms(6));
        assert_eq!(flow.bytes_acked(), 0);
        assert_eq!(flow.bytes_in_flight(), 0);
        assert_eq!(flow.congestion_window(), 10 * MSS);
        assert_eq!(flow.rto_deadline(), None);
        assert_eq!(flow.rtt().min_rtt(), None);
        assert_eq!(flow.rto(), Duration::from_secs(3));
        assert_eq!(flow.stats().acked_bytes, 5 * MSS);

        let seg = flow.poll_send(SimTime::from_ms(6))?;
        assert_eq!(seg.seq, 0);
        assert!(!seg.retransmission);

        Ok(())
    }

    #[test]
    fn flow_invalid_config() {
        let mut conf = FlowConfig::default();
        conf.set_mss(0);
        assert!(matches!(
            Flow::new(1, 100, &conf),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod rtt;
mod transfer;
