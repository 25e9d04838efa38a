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

use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use cubicsim::congestion_control::cube_root;
use cubicsim::AckSample;
use cubicsim::CongestionController;
use cubicsim::Cubic;
use cubicsim::CubicConfig;
use cubicsim::SimTime;
use cubicsim::TimerQueue;

pub fn cube_root_benchmark(c: &mut Criterion) {
    c.bench_function("cube root small", |b| {
        b.iter(|| cube_root(black_box(410)))
    });

    c.bench_function("cube root large", |b| {
        b.iter(|| cube_root(black_box(u64::MAX / 3)))
    });
}

pub fn congestion_avoidance_benchmark(c: &mut Criterion) {
    let mut conf = CubicConfig::default();
    conf.set_slow_start_thresh(100 * 1500);
    let mut cubic = Cubic::new(conf);
    cubic.set_congestion_window(100 * 1500);
    cubic.on_loss(SimTime::ZERO);

    let sample = AckSample {
        acked_bytes: 1500,
        rtt: Some(Duration::from_micros(20)),
        ecn_marked: false,
        highest_sent_seq: 0,
    };
    let mut now = SimTime::from_ms(1);
    c.bench_function("cubic ack in congestion avoidance", |b| {
        b.iter(|| {
            now = now + Duration::from_nanos(100);
            cubic.on_ack(now, black_box(&sample))
        })
    });
}

pub fn timer_queue_benchmark(c: &mut Criterion) {
    let mut tq = TimerQueue::new();
    const RANGE: u64 = 10_000;
    for i in 0..RANGE {
        tq.add(i, Duration::from_micros(i), SimTime::ZERO);
    }
    c.bench_function("timer queue remaining", |b| {
        b.iter(|| tq.time_remaining(SimTime::ZERO))
    });

    c.bench_function("timer queue add and expire", |b| {
        let mut idx = RANGE;
        b.iter(|| {
            idx += 1;
            tq.add(idx, Duration::ZERO, SimTime::ZERO);
            tq.next_expire(SimTime::from_secs(1))
        })
    });
}

criterion_group!(
    benches,
    cube_root_benchmark,
    congestion_avoidance_benchmark,
    timer_queue_benchmark
);
criterion_main!(benches);
