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

//! Integer cube root.
//!
//! The root is estimated from a lookup table and refined with two
//! Newton-Raphson iterations, all in integer arithmetic, so that CUBIC growth
//! is identical on every platform.

/// `floor(cbrt(i) * 256)` for `0 <= i < 256`.
const CUBE_ROOT_TABLE: [u16; 256] = [
       0,  256,  322,  369,  406,  437,  465,  489,  512,  532,  551,  569,  586,  601,  616,  631,
     645,  658,  670,  683,  694,  706,  717,  728,  738,  748,  758,  768,  777,  786,  795,  804,
     812,  821,  829,  837,  845,  853,  860,  868,  875,  882,  889,  896,  903,  910,  917,  923,
     930,  936,  943,  949,  955,  961,  967,  973,  979,  985,  990,  996, 1002, 1007, 1013, 1018,
    1024, 1029, 1034, 1039, 1044, 1050, 1055, 1060, 1065, 1069, 1074, 1079, 1084, 1089, 1093, 1098,
    1103, 1107, 1112, 1116, 1121, 1125, 1129, 1134, 1138, 1142, 1147, 1151, 1155, 1159, 1163, 1168,
    1172, 1176, 1180, 1184, 1188, 1192, 1196, 1200, 1203, 1207, 1211, 1215, 1219, 1222, 1226, 1230,
    1233, 1237, 1241, 1244, 1248, 1252, 1255, 1259, 1262, 1266, 1269, 1273, 1276, 1280, 1283, 1286,
    1290, 1293, 1296, 1300, 1303, 1306, 1310, 1313, 1316, 1319, 1322, 1326, 1329, 1332, 1335, 1338,
    1341, 1344, 1348, 1351, 1354, 1357, 1360, 1363, 1366, 1369, 1372, 1375, 1378, 1381, 1383, 1386,
    1389, 1392, 1395, 1398, 1401, 1404, 1406, 1409, 1412, 1415, 1418, 1420, 1423, 1426, 1429, 1431,
    1434, 1437, 1440, 1442, 1445, 1448, 1450, 1453, 1456, 1458, 1461, 1463, 1466, 1469, 1471, 1474,
    1476, 1479, 1481, 1484, 1487, 1489, 1492, 1494, 1497, 1499, 1502, 1504, 1507, 1509, 1511, 1514,
    1516, 1519, 1521, 1524, 1526, 1528, 1531, 1533, 1536, 1538, 1540, 1543, 1545, 1547, 1550, 1552,
    1554, 1557, 1559, 1561, 1563, 1566, 1568, 1570, 1573, 1575, 1577, 1579, 1582, 1584, 1586, 1588,
    1590, 1593, 1595, 1597, 1599, 1601, 1604, 1606, 1608, 1610, 1612, 1614, 1616, 1619, 1621, 1623,
];

/// Fixed-point shift of the table entries.
const TABLE_SHIFT: u32 = 8;

/// Inputs shorter than this many bits are scaled up into the table domain.
const SMALL_INPUT_BITS: u32 = 7;

/// Return the integer cube root of `a`.
///
/// The result is within one of `floor(cbrt(a))` over the whole `u64` range
/// and exact for perfect cubes.
pub fn cube_root(a: u64) -> u32 {
    if a == 0 {
        return 0;
    }

    let bits = u64::BITS - a.leading_zeros();

    let mut x: u64 = if bits < SMALL_INPUT_BITS {
        // Multiply by 8^k so the index fills the table, then divide the root
        // by 2^k.
        let k = (TABLE_SHIFT - bits) / 3;
        let idx = (a << (3 * k)) as usize;
        (CUBE_ROOT_TABLE[idx] >> (TABLE_SHIFT + k)) as u64
    } else {
        // Divide by 8^s to land in the table, then multiply the root by 2^s.
        let s = (bits.saturating_sub(TABLE_SHIFT) + 2) / 3;
        let idx = (a >> (3 * s)).min(255) as usize;
        ((CUBE_ROOT_TABLE[idx] as u64) << s) >> TABLE_SHIFT
    };

    // x = (2x + a/x^2) / 3, twice.
    x = x.max(1);
    x = (2 * x + a / (x * x)) / 3;
    x = (2 * x + a / (x * x)) / 3;

    x as u32
}
