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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::energy::{EnergyBaseline, EnergyUpdate};
use crate::api::metrics::GpuDeviceMetrics;
use crate::device::common::constants::{DEFAULT_POWER_MW, DEFAULT_UTILIZATION_PERCENT};
use crate::device::{Device, GpuBackend};

/// A discovered device and the instances the sampler writes for it
#[derive(Clone)]
pub struct DeviceSlot {
    pub device: Device,
    pub metrics: GpuDeviceMetrics,
}

/// Background worker refreshing GPU instances on a fixed cadence.
///
/// The sampler is the only writer of GPU instances and the only owner of the
/// energy baselines, which therefore need no locking.
pub struct Sampler {
    backend: Arc<dyn GpuBackend>,
    slots: Vec<DeviceSlot>,
    baselines: HashMap<u32, EnergyBaseline>,
    interval: Duration,
}

impl Sampler {
    pub fn new(backend: Arc<dyn GpuBackend>, slots: Vec<DeviceSlot>, interval: Duration) -> Self {
        Self {
            backend,
            slots,
            baselines: HashMap::new(),
            interval,
        }
    }

    /// Sleep, check for shutdown, sample; until shutdown is requested or the
    /// controller goes away. No sample is taken after shutdown is observed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting GPU sampler for {} devices every {:?}",
            self.slots.len(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }

            let stop = match shutdown.has_changed() {
                Ok(_) => *shutdown.borrow(),
                Err(_) => true,
            };
            if stop {
                break;
            }

            self.sample_once();
        }

        debug!("GPU sampler exited");
    }

    /// One pass over every device. Failures are logged and never abort the pass.
    pub fn sample_once(&mut self) {
        for slot in &self.slots {
            let index = slot.device.index;

            // Handles are not cached across passes
            let handle = match self.backend.device_by_index(index) {
                Ok(handle) => handle,
                Err(e) => {
                    error!("failed to get NVML handle for GPU {index}: {e}");
                    continue;
                }
            };

            let power_limit = handle.power_management_limit().unwrap_or_else(|e| {
                error!("failed to get power limit for GPU {index}: {e}");
                DEFAULT_POWER_MW
            });
            slot.metrics.set_power_limit_mw(power_limit);

            let power_usage = handle.power_usage().unwrap_or_else(|e| {
                error!("failed to get power usage for GPU {index}: {e}");
                DEFAULT_POWER_MW
            });
            slot.metrics.set_power_usage_mw(power_usage);

            match handle.total_energy_consumption() {
                Ok(energy_mj) => {
                    let update = self.baselines.entry(index).or_default().observe(energy_mj);
                    if let EnergyUpdate::Reset { previous, current } = update {
                        warn!(
                            "energy register for GPU {index} went backwards ({previous} -> {current} mJ), re-baselining"
                        );
                    }
                    slot.metrics.add_energy_joules(update.joules());
                }
                Err(e) => {
                    error!("failed to get energy consumption for GPU {index}: {e}");
                }
            }

            let utilization = handle.utilization_percent().unwrap_or_else(|e| {
                error!("failed to get utilization for GPU {index}: {e}");
                DEFAULT_UTILIZATION_PERCENT
            });
            slot.metrics.set_utilization_percent(utilization);
        }
    }
}
