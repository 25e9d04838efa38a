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

use libfuzzer_sys::fuzz_target;

use cubicsim::congestion_control::cube_root;

fuzz_target!(|data: [u8; 8]| {
    let a = u64::from_le_bytes(data);
    let x = cube_root(a) as u128;
    let a = a as u128;

    // Within one of the exact floor root.
    let lo = x.saturating_sub(1);
    assert!(lo * lo * lo <= a, "a={} root={}", a, x);
    assert!((x + 2) * (x + 2) * (x + 2) > a, "a={} root={}", a, x);
});
