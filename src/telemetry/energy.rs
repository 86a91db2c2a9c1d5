// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

//! Turning a cumulative energy register into counter increments.
//!
//! The register counts millijoules since an arbitrary epoch, so its absolute
//! value means nothing to a counter that starts at zero with the process.
//! The first reading only establishes a baseline; every later reading
//! contributes its difference from the previous one.

use crate::device::common::constants::MILLIJOULES_PER_JOULE;

/// Outcome of feeding one register reading into a baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyUpdate {
    /// First reading for the device; nothing to add yet
    Baselined,
    /// Register advanced by this many millijoules
    Advanced(u64),
    /// Register went backwards (wraparound or device reset). The new value
    /// becomes the baseline and nothing is added.
    Reset { previous: u64, current: u64 },
}

impl EnergyUpdate {
    pub fn joules(&self) -> f64 {
        match self {
            EnergyUpdate::Advanced(delta_mj) => *delta_mj as f64 / MILLIJOULES_PER_JOULE,
            EnergyUpdate::Baselined | EnergyUpdate::Reset { .. } => 0.0,
        }
    }
}

/// Last raw register value seen for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergyBaseline {
    last_mj: Option<u64>,
}

impl EnergyBaseline {
    pub fn observe(&mut self, reading_mj: u64) -> EnergyUpdate {
        let update = match self.last_mj {
            None => EnergyUpdate::Baselined,
            Some(previous) if reading_mj >= previous => {
                EnergyUpdate::Advanced(reading_mj - previous)
            }
            Some(previous) => EnergyUpdate::Reset {
                previous,
                current: reading_mj,
            },
        };
        self.last_mj = Some(reading_mj);
        update
    }

    pub fn last(&self) -> Option<u64> {
        self.last_mj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reading_sets_baseline_only() {
        let mut baseline = EnergyBaseline::default();
        let update = baseline.observe(987_654_321);

        assert_eq!(update, EnergyUpdate::Baselined);
        assert_eq!(update.joules(), 0.0);
        assert_eq!(baseline.last(), Some(987_654_321));
    }

    #[test]
    fn test_zero_reading_is_a_real_baseline() {
        let mut baseline = EnergyBaseline::default();
        baseline.observe(0);
        assert_eq!(baseline.observe(250), EnergyUpdate::Advanced(250));
    }

    #[test]
    fn test_deltas_between_readings() {
        let mut first = EnergyBaseline::default();
        let mut second = EnergyBaseline::default();
        first.observe(1000);
        second.observe(2000);

        assert_eq!(first.observe(1500).joules(), 0.5);
        assert_eq!(second.observe(2600).joules(), 0.6);
        assert_eq!(first.observe(1500), EnergyUpdate::Advanced(0));
    }

    #[test]
    fn test_register_reset_rebaselines() {
        let mut baseline = EnergyBaseline::default();
        baseline.observe(5000);

        let update = baseline.observe(100);
        assert_eq!(
            update,
            EnergyUpdate::Reset {
                previous: 5000,
                current: 100
            }
        );
        assert_eq!(update.joules(), 0.0);
        assert_eq!(baseline.observe(400), EnergyUpdate::Advanced(300));
    }

    #[test]
    fn test_accumulated_total_is_monotonic() {
        let mut baseline = EnergyBaseline::default();
        let readings = [10, 20, 20, 5, 15, 1_000_000, 999_999, 1_000_500];

        let mut total = 0.0;
        for reading in readings {
            let next = total + baseline.observe(reading).joules();
            assert!(next >= total);
            total = next;
        }
        // +10, +0, reset, +10, +999_985, reset, +501 mJ
        assert!((total - 1000.506).abs() < 1e-9);
    }
}
