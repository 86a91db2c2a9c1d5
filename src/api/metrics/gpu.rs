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

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Opts, Registry};

use super::{
    GPU_ENERGY_CONSUMPTION, GPU_POWER_LIMIT, GPU_POWER_USAGE, GPU_UTILIZATION, GPU_UUID_LABEL,
};
use crate::device::common::constants::{MILLIWATTS_PER_WATT, PERCENT_PER_UNIT};
use crate::device::Device;

/// Per-GPU families, labeled by device UUID
#[derive(Clone)]
pub struct GpuMetricFamilies {
    pub utilization: GaugeVec,
    pub power_usage: GaugeVec,
    pub power_limit: GaugeVec,
    pub energy_consumption: CounterVec,
}

impl GpuMetricFamilies {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            utilization: GaugeVec::new(
                Opts::new(GPU_UTILIZATION, "GPU utilization rate [0.0 - 1.0)"),
                &[GPU_UUID_LABEL],
            )?,
            power_usage: GaugeVec::new(
                Opts::new(GPU_POWER_USAGE, "GPU power usage in watts"),
                &[GPU_UUID_LABEL],
            )?,
            power_limit: GaugeVec::new(
                Opts::new(GPU_POWER_LIMIT, "GPU power management limit in watts"),
                &[GPU_UUID_LABEL],
            )?,
            energy_consumption: CounterVec::new(
                Opts::new(
                    GPU_ENERGY_CONSUMPTION,
                    "GPU energy consumption in joules since the process started",
                ),
                &[GPU_UUID_LABEL],
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.utilization.clone()))?;
        registry.register(Box::new(self.power_usage.clone()))?;
        registry.register(Box::new(self.power_limit.clone()))?;
        registry.register(Box::new(self.energy_consumption.clone()))?;
        Ok(())
    }

    /// Create (or fetch) the four instances labeled with this device's UUID.
    ///
    /// Devices sharing a UUID share the exported series; each caller still
    /// gets its own handle.
    pub fn for_device(&self, device: &Device) -> GpuDeviceMetrics {
        let labels = [device.uuid.as_str()];
        GpuDeviceMetrics {
            utilization: self.utilization.with_label_values(&labels),
            power_usage: self.power_usage.with_label_values(&labels),
            power_limit: self.power_limit.with_label_values(&labels),
            energy_consumption: self.energy_consumption.with_label_values(&labels),
        }
    }
}

/// The instances for one device. Each is individually atomic.
#[derive(Clone)]
pub struct GpuDeviceMetrics {
    pub utilization: Gauge,
    pub power_usage: Gauge,
    pub power_limit: Gauge,
    pub energy_consumption: Counter,
}

impl GpuDeviceMetrics {
    pub fn set_utilization_percent(&self, percent: u32) {
        self.utilization.set(f64::from(percent) / PERCENT_PER_UNIT);
    }

    pub fn set_power_usage_mw(&self, milliwatts: u32) {
        self.power_usage.set(f64::from(milliwatts) / MILLIWATTS_PER_WATT);
    }

    pub fn set_power_limit_mw(&self, milliwatts: u32) {
        self.power_limit.set(f64::from(milliwatts) / MILLIWATTS_PER_WATT);
    }

    /// Advance the energy counter. Negative or non-finite amounts are dropped.
    pub fn add_energy_joules(&self, joules: f64) {
        if joules > 0.0 && joules.is_finite() {
            self.energy_consumption.inc_by(joules);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: u32, uuid: &str) -> Device {
        Device {
            index,
            uuid: uuid.to_string(),
            name: String::new(),
        }
    }

    #[test]
    fn test_unit_scaling() {
        let families = GpuMetricFamilies::new().unwrap();
        let metrics = families.for_device(&device(0, "GPU-a"));

        metrics.set_power_usage_mw(250_500);
        metrics.set_power_limit_mw(300_000);
        metrics.set_utilization_percent(37);

        assert_eq!(metrics.power_usage.get(), 250.5);
        assert_eq!(metrics.power_limit.get(), 300.0);
        assert!((metrics.utilization.get() - 0.37).abs() < 1e-12);
    }

    #[test]
    fn test_utilization_within_unit_range() {
        let families = GpuMetricFamilies::new().unwrap();
        let metrics = families.for_device(&device(0, "GPU-a"));

        for percent in 0..=100 {
            metrics.set_utilization_percent(percent);
            let value = metrics.utilization.get();
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_energy_never_decreases() {
        let families = GpuMetricFamilies::new().unwrap();
        let metrics = families.for_device(&device(0, "GPU-a"));

        metrics.add_energy_joules(1.5);
        metrics.add_energy_joules(-4.0);
        metrics.add_energy_joules(f64::NAN);
        assert_eq!(metrics.energy_consumption.get(), 1.5);
    }

    #[test]
    fn test_one_instance_per_uuid() {
        let families = GpuMetricFamilies::new().unwrap();
        families.for_device(&device(0, "GPU-a")).set_power_usage_mw(1000);
        families.for_device(&device(1, "GPU-b")).set_power_usage_mw(2000);

        assert_eq!(
            families.power_usage.with_label_values(&["GPU-a"]).get(),
            1.0
        );
        assert_eq!(
            families.power_usage.with_label_values(&["GPU-b"]).get(),
            2.0
        );
    }
}
