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

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;

use cubicsim::AckSample;
use cubicsim::CongestionController;
use cubicsim::Cubic;
use cubicsim::CubicConfig;
use cubicsim::SimTime;

// Drive the controller with arbitrary signals and check the window
// invariants after each one.
fuzz_target!(|data: &[u8]| {
    let mut conf = CubicConfig::default();
    conf.enable_ecn(true);
    let mut cubic = Cubic::new(conf);
    let mss = 1500;
    let mut now = SimTime::ZERO;

    for chunk in data.chunks(4) {
        let op = chunk[0];
        let arg = chunk.get(1..).map_or(0, |b| b.iter().fold(0u64, |v, x| v << 8 | *x as u64));
        now = now + Duration::from_micros(arg % 100_000);

        match op % 4 {
            0 | 1 => {
                let sample = AckSample {
                    acked_bytes: arg % (4 * mss),
                    rtt: Some(Duration::from_micros(1 + arg % 10_000)),
                    ecn_marked: op & 0x80 != 0,
                    highest_sent_seq: arg,
                };
                let was_slow_start = cubic.in_slow_start();
                let ssthresh = cubic.slow_start_thresh();
                let (cwnd, _) = cubic.on_ack(now, &sample);
                if was_slow_start && !sample.ecn_marked {
                    assert!(cwnd <= ssthresh);
                }
            }
            2 => {
                let ssthresh = cubic.on_loss(now);
                assert!(ssthresh >= 2 * mss);
                cubic.set_congestion_window(ssthresh);
            }
            _ => {
                cubic.on_timeout(now);
                cubic.on_loss(now);
                cubic.restart_window();
                assert_eq!(cubic.congestion_window(), mss);
            }
        }

        assert!(cubic.congestion_window() >= 1);
    }
});
