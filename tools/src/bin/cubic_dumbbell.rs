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

//! Several CUBIC flows sharing one bottleneck link.
//!
//! Senders put segments straight into the drop-tail queue of the bottleneck.
//! Each delivered segment is acked by its receiver and the ack reaches the
//! sender after the propagation delay of the path chosen by the transfer.

use std::collections::HashMap;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::*;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;

use cubicsim::Ack;
use cubicsim::CongestionControlAlgorithm;
use cubicsim::FlowConfig;
use cubicsim::SimTime;
use cubicsim::TimerQueue;
use cubicsim::Transfer;
use cubicsim::TransferEvent;
use cubicsim_tools::jain_fairness_index;
use cubicsim_tools::load_flow_config;
use cubicsim_tools::Bottleneck;
use cubicsim_tools::Enqueue;
use cubicsim_tools::Receiver;
use cubicsim_tools::Result;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug, Clone)]
#[clap(name = "cubic_dumbbell")]
pub struct DumbbellOpt {
    /// Number of flows sharing the bottleneck.
    #[clap(short, long, default_value = "4", value_name = "NUM")]
    pub flows: usize,

    /// Bytes sent by each transfer. "0" means long-running flows.
    #[clap(long, default_value = "0", value_name = "NUM")]
    pub flow_size: u64,

    /// Stop a transfer after its first completion instead of restarting it.
    #[clap(long)]
    pub stop_when_done: bool,

    /// Bottleneck rate in Mbps.
    #[clap(long, default_value = "10000", value_name = "NUM")]
    pub link_rate: u64,

    /// Bottleneck queue size in segments.
    #[clap(long, default_value = "100", value_name = "NUM")]
    pub queue_size: usize,

    /// Mark ECN capable segments once this many segments are queued.
    #[clap(long, value_name = "NUM")]
    pub ecn_threshold: Option<usize>,

    /// Round trip propagation delay in microseconds.
    #[clap(long, default_value = "20", value_name = "TIME")]
    pub base_rtt: u64,

    /// Number of paths a transfer chooses from.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub paths: usize,

    /// Extra delay of each successive path in microseconds.
    #[clap(long, default_value = "2", value_name = "TIME")]
    pub path_delay_step: u64,

    /// Flows start at random times within this window, in microseconds.
    #[clap(long, default_value = "100", value_name = "TIME")]
    pub start_spread: u64,

    /// Simulated duration in milliseconds.
    #[clap(short, long, default_value = "1000", value_name = "TIME")]
    pub duration: u64,

    /// Seed of the random number generator.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub seed: u64,

    /// Flow configuration in JSON. Command line options override it.
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Congestion control algorithm.
    #[clap(long, default_value = "CUBIC")]
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// Max segment size in bytes.
    #[clap(long, value_name = "NUM")]
    pub mss: Option<u32>,

    /// Initial congestion window in segments.
    #[clap(long, value_name = "NUM")]
    pub initial_congestion_window: Option<u64>,

    /// Minimum retransmission timeout in milliseconds.
    #[clap(long, value_name = "TIME")]
    pub min_rto: Option<u64>,

    /// Disable HyStart.
    #[clap(long)]
    pub disable_hystart: bool,

    /// Disable the Reno-friendly region.
    #[clap(long)]
    pub disable_tcp_friendliness: bool,

    /// Disable fast convergence.
    #[clap(long)]
    pub disable_fast_convergence: bool,

    /// Send ECN capable segments and react to marks.
    #[clap(long)]
    pub enable_ecn: bool,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,
}

/// Simulation events.
#[derive(Debug, Clone, Copy)]
enum Event {
    /// A transfer (re)starts.
    Start(usize),

    /// The bottleneck finished transmitting its head segment.
    Departure,

    /// An ack of the given run reaches its sender.
    AckArrival(usize, u64, Ack),

    /// A retransmission timer expired.
    Rto(usize),
}

struct Dumbbell {
    option: DumbbellOpt,
    transfers: Vec<Transfer>,
    receivers: Vec<Receiver>,
    link: Bottleneck,

    /// Round trip propagation delay of each path.
    path_delays: Vec<Duration>,

    timers: TimerQueue,
    events: HashMap<u64, Event>,
    next_event_id: u64,
    finished: Vec<Option<Duration>>,
}

impl Dumbbell {
    fn new(option: DumbbellOpt, conf: &FlowConfig) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(option.seed);
        let flow_size = match option.flow_size {
            0 => u64::MAX,
            size => size,
        };

        let mut transfers = Vec::with_capacity(option.flows);
        for id in 0..option.flows {
            let mut transfer = Transfer::new(id as u64, flow_size, conf, option.paths, rng.gen())?;
            transfer.set_stop_when_done(option.stop_when_done);
            transfers.push(transfer);
        }

        let path_delays = (0..option.paths as u64)
            .map(|i| Duration::from_micros(option.base_rtt + i * option.path_delay_step))
            .collect();

        let mut sim = Dumbbell {
            receivers: (0..option.flows).map(|_| Receiver::new()).collect(),
            link: Bottleneck::new(option.link_rate, option.queue_size, option.ecn_threshold),
            path_delays,
            transfers,
            // Ids below 2 * flows are reserved for per-flow timers.
            timers: TimerQueue::with_capacity(option.flows * 4),
            events: HashMap::new(),
            next_event_id: 2 * option.flows as u64,
            finished: vec![None; option.flows],
            option,
        };

        let spread = sim.option.start_spread.max(1);
        for flow in 0..sim.option.flows {
            let at = SimTime::from_ps(rng.gen_range(0..spread * 1_000_000));
            sim.schedule_flow_timer(flow, Event::Start(flow), at);
        }

        Ok(sim)
    }

    fn start_timer_id(flow: usize) -> u64 {
        flow as u64
    }

    fn rto_timer_id(&self, flow: usize) -> u64 {
        (self.option.flows + flow) as u64
    }

    fn schedule_flow_timer(&mut self, flow: usize, event: Event, at: SimTime) {
        let id = match event {
            Event::Rto(_) => self.rto_timer_id(flow),
            _ => Self::start_timer_id(flow),
        };
        self.events.insert(id, event);
        self.timers.add_at(id, at);
    }

    fn schedule(&mut self, event: Event, at: SimTime) {
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.events.insert(id, event);
        self.timers.add_at(id, at);
    }

    fn run(&mut self) {
        let end = SimTime::from_ms(self.option.duration);

        while let Some(at) = self.timers.peek_deadline() {
            if at > end {
                break;
            }

            while let Some(id) = self.timers.next_expire(at) {
                let event = match self.events.remove(&id) {
                    Some(event) => event,
                    None => continue,
                };
                self.process(at, event);
            }
        }
    }

    fn process(&mut self, now: SimTime, event: Event) {
        match event {
            Event::Start(flow) => {
                let transfer = &mut self.transfers[flow];
                match transfer.start(now) {
                    Ok(path) => debug!("now={:?} flow {} on path {}", now, flow, path),
                    Err(e) => warn!("flow {} start error: {:?}", flow, e),
                }
                self.receivers[flow].reset();
                self.send(now, flow);
            }

            Event::Departure => {
                if let Some((head, next)) = self.link.depart(now) {
                    if let Some(next) = next {
                        self.schedule(Event::Departure, next);
                    }

                    if head.run != self.current_run(head.flow) {
                        debug!(
                            "now={:?} flow {} drop segment {} of run {}",
                            now, head.flow, head.seg.seq, head.run
                        );
                        return;
                    }

                    let ack = self.receivers[head.flow].on_segment(&head.seg, head.ecn_marked);
                    let path = self.transfers[head.flow].path();
                    let at = now + self.path_delays[path];
                    self.schedule(Event::AckArrival(head.flow, head.run, ack), at);
                }
            }

            Event::AckArrival(flow, run, ack) => {
                if run != self.current_run(flow) {
                    debug!("now={:?} flow {} drop ack of run {}", now, flow, run);
                    return;
                }

                match self.transfers[flow].on_ack(now, &ack) {
                    Ok(Some(TransferEvent::Finished { elapsed })) => {
                        self.finished[flow] = Some(elapsed);
                    }
                    Ok(Some(TransferEvent::Restart { at })) => {
                        self.schedule_flow_timer(flow, Event::Start(flow), at);
                    }
                    Ok(None) => (),
                    Err(e) => debug!("flow {} ignore ack {:?}: {:?}", flow, ack, e),
                }
                self.send(now, flow);
            }

            Event::Rto(flow) => {
                if self.transfers[flow].on_rto(now) {
                    self.send(now, flow);
                } else {
                    self.arm_rto(flow);
                }
            }
        }
    }

    /// Runs are numbered by completed transfers. Segments and acks of an
    /// earlier run are dropped.
    fn current_run(&self, flow: usize) -> u64 {
        self.transfers[flow].completions()
    }

    /// Push everything the window allows into the bottleneck.
    fn send(&mut self, now: SimTime, flow: usize) {
        let run = self.current_run(flow);
        while let Ok(seg) = self.transfers[flow].poll_send(now) {
            if let Enqueue::Departs(at) = self.link.enqueue(now, flow, run, seg) {
                self.schedule(Event::Departure, at);
            }
        }

        self.arm_rto(flow);
    }

    fn arm_rto(&mut self, flow: usize) {
        match self.transfers[flow].rto_deadline() {
            Some(at) => self.schedule_flow_timer(flow, Event::Rto(flow), at),
            None => {
                let id = self.rto_timer_id(flow);
                self.timers.del(&id);
                self.events.remove(&id);
            }
        }
    }

    fn report(&self) {
        let secs = self.option.duration as f64 / 1000.0;

        println!(
            "{} flows, {} Mbps bottleneck, {} segments queue, {} us base rtt, {} ms",
            self.option.flows,
            self.option.link_rate,
            self.option.queue_size,
            self.option.base_rtt,
            self.option.duration
        );

        let mut goodputs = Vec::with_capacity(self.transfers.len());
        for (i, transfer) in self.transfers.iter().enumerate() {
            let flow = transfer.flow();
            let stats = flow.stats();
            let cc_stats = flow.congestion_stats();
            let goodput = stats.acked_bytes as f64 * 8.0 / secs / 1e6;
            goodputs.push(goodput);

            println!(
                "flow {}: goodput {:.2} Mbps, cwnd {}, ssthresh {}, hystart exit {}, \
                 losses {}, ecn {}/{}, timeouts {}, retrans {}, completions {}{}",
                i,
                goodput,
                flow.congestion_window(),
                flow.slow_start_thresh(),
                flow.found_slow_start_exit(),
                cc_stats.loss_events,
                cc_stats.ecn_reductions,
                cc_stats.ecn_marks,
                cc_stats.timeouts,
                stats.retrans_count,
                transfer.completions(),
                match self.finished[i] {
                    Some(elapsed) => format!(", finished in {:?}", elapsed),
                    None => String::new(),
                }
            );
        }

        if !goodputs.is_empty() {
            let s = Data::new(goodputs.clone());
            println!("goodput (Mbps):");
            println!(
                "\tmin: {:.2}, max: {:.2}, mean: {:.2}, sd: {:.2}",
                s.min(),
                s.max(),
                s.mean().unwrap_or_default(),
                s.std_dev().unwrap_or_default(),
            );
        }
        println!("jain fairness index: {:.4}", jain_fairness_index(&goodputs));

        let link = &self.link.stats;
        println!(
            "link: forwarded {}, dropped {}, ecn marked {}, max queue {}",
            link.forwarded, link.dropped, link.ecn_marked, link.max_queue
        );
    }
}

fn parse_option() -> std::result::Result<DumbbellOpt, clap::error::Error> {
    let option = DumbbellOpt::parse();

    if option.flows == 0 {
        return Err(DumbbellOpt::command().error(
            ErrorKind::InvalidValue,
            "Specify at least one flow",
        ));
    }

    if option.paths == 0 {
        return Err(DumbbellOpt::command().error(
            ErrorKind::InvalidValue,
            "Specify at least one path",
        ));
    }

    Ok(option)
}

fn process_option(option: &DumbbellOpt) -> Result<FlowConfig> {
    env_logger::builder()
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let mut conf = match &option.config {
        Some(path) => load_flow_config(path)?,
        None => FlowConfig::new(),
    };

    conf.set_congestion_control_algorithm(option.congestion_control_algorithm);
    if let Some(mss) = option.mss {
        conf.set_mss(mss);
    }
    if let Some(iw) = option.initial_congestion_window {
        conf.set_initial_congestion_window(iw);
    }
    if let Some(min_rto) = option.min_rto {
        conf.set_min_rto(min_rto);
    }
    if option.disable_hystart {
        conf.enable_hystart(false);
    }
    if option.disable_tcp_friendliness {
        conf.enable_tcp_friendliness(false);
    }
    if option.disable_fast_convergence {
        conf.enable_fast_convergence(false);
    }
    if option.enable_ecn {
        conf.enable_ecn(true);
    }

    conf.validate()?;
    debug!("flow config {:?}", conf);
    Ok(conf)
}

fn main() -> Result<()> {
    // Parse simulation option.
    let option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    // Build flow configuration.
    let conf = process_option(&option)?;

    // Run the simulation.
    let mut sim = Dumbbell::new(option, &conf)?;
    sim.run();
    sim.report();

    Ok(())
}
