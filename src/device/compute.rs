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

//! Correlating compute-runtime device indices with management UUIDs.
//!
//! A compute runtime numbers devices on its own (after visibility masking),
//! so its index cannot be used as a management-interface index. The PCI bus
//! location is the one identifier both sides agree on.

use tracing::{debug, error, warn};

use super::common::constants::{DEVICE_UUID_PREFIX_GPU, DEVICE_UUID_PREFIX_MIG};
use super::{DeviceError, DeviceResult, GpuBackend};

pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";
pub const DEVICE_ORDER_VAR: &str = "CUDA_DEVICE_ORDER";
pub const PCI_BUS_ID_ORDER: &str = "PCI_BUS_ID";

/// Maps a compute-runtime device index to the PCI bus id of that device.
pub trait ComputeDeviceMap: Send + Sync {
    fn pci_bus_id(&self, backend: &dyn GpuBackend, compute_index: u32) -> DeviceResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VisibleDevice {
    Index(u32),
    UuidPrefix(String),
}

/// Compute ordering by ascending PCI bus id, filtered by a visibility list.
///
/// This is the order a CUDA runtime presents only with `CUDA_DEVICE_ORDER=PCI_BUS_ID`.
/// Under any other order (the runtime defaults to fastest first) the mapping
/// cannot be derived and every lookup fails with [`DeviceError::NotSupported`].
/// The visibility list follows `CUDA_VISIBLE_DEVICES`: comma separated indices
/// or UUID prefixes, parsing stops at the first invalid entry.
#[derive(Debug, Clone)]
pub struct PciOrderedComputeMap {
    pci_bus_ordered: bool,
    visible: Option<Vec<VisibleDevice>>,
}

impl PciOrderedComputeMap {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(DEVICE_ORDER_VAR).ok().as_deref(),
            std::env::var(VISIBLE_DEVICES_VAR).ok().as_deref(),
        )
    }

    /// `device_order` and `visible_devices` hold the values of
    /// `CUDA_DEVICE_ORDER` and `CUDA_VISIBLE_DEVICES`, `None` when unset.
    pub fn new(device_order: Option<&str>, visible_devices: Option<&str>) -> Self {
        Self {
            pci_bus_ordered: device_order.map(str::trim) == Some(PCI_BUS_ID_ORDER),
            visible: visible_devices.map(parse_visible_devices),
        }
    }

    /// (bus id, uuid) for every resolvable device, sorted by bus id
    fn ordered_devices(backend: &dyn GpuBackend) -> DeviceResult<Vec<(String, Option<String>)>> {
        let count = backend.device_count()?;
        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            let handle = match backend.device_by_index(index) {
                Ok(handle) => handle,
                Err(e) => {
                    debug!("skipping GPU {index} while ordering by PCI bus id: {e}");
                    continue;
                }
            };
            let bus_id = match handle.pci_bus_id() {
                Ok(bus_id) => bus_id.to_ascii_uppercase(),
                Err(e) => {
                    debug!("skipping GPU {index} without PCI bus id: {e}");
                    continue;
                }
            };
            devices.push((bus_id, handle.uuid().ok()));
        }
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(devices)
    }
}

impl ComputeDeviceMap for PciOrderedComputeMap {
    fn pci_bus_id(&self, backend: &dyn GpuBackend, compute_index: u32) -> DeviceResult<String> {
        if !self.pci_bus_ordered {
            warn!(
                "compute device order is only known with {DEVICE_ORDER_VAR}={PCI_BUS_ID_ORDER}"
            );
            return Err(DeviceError::NotSupported);
        }

        let ordered = Self::ordered_devices(backend)?;

        let visible: Vec<&(String, Option<String>)> = match &self.visible {
            None => ordered.iter().collect(),
            Some(entries) => {
                let mut visible = Vec::with_capacity(entries.len());
                for entry in entries {
                    let found = match entry {
                        VisibleDevice::Index(i) => ordered.get(*i as usize),
                        VisibleDevice::UuidPrefix(prefix) => ordered.iter().find(|(_, uuid)| {
                            uuid.as_deref().is_some_and(|u| u.starts_with(prefix.as_str()))
                        }),
                    };
                    // The runtime ignores everything after an unresolvable entry
                    match found {
                        Some(device) => visible.push(device),
                        None => break,
                    }
                }
                visible
            }
        };

        visible
            .get(compute_index as usize)
            .map(|(bus_id, _)| bus_id.clone())
            .ok_or_else(|| DeviceError::NotFound(format!("compute device {compute_index}")))
    }
}

fn parse_visible_devices(value: &str) -> Vec<VisibleDevice> {
    let mut entries = Vec::new();
    for raw in value.split(',') {
        let entry = raw.trim();
        if let Ok(index) = entry.parse::<u32>() {
            entries.push(VisibleDevice::Index(index));
        } else if entry.starts_with(DEVICE_UUID_PREFIX_GPU) || entry.starts_with(DEVICE_UUID_PREFIX_MIG)
        {
            entries.push(VisibleDevice::UuidPrefix(entry.to_string()));
        } else {
            break;
        }
    }
    entries
}

/// Resolve the management UUID of a compute-runtime device.
///
/// Each failing step is logged and returned; nothing here is retried.
pub fn resolve_uuid_for_compute_device(
    backend: &dyn GpuBackend,
    map: &dyn ComputeDeviceMap,
    compute_index: u32,
) -> DeviceResult<String> {
    let bus_id = map.pci_bus_id(backend, compute_index).map_err(|e| {
        error!("failed to get PCI Bus ID for compute device {compute_index}: {e}");
        e
    })?;

    let handle = backend.device_by_pci_bus_id(&bus_id).map_err(|e| {
        error!("failed to get device from PCI Bus ID {bus_id}: {e}");
        e
    })?;

    handle.uuid().map_err(|e| {
        error!("failed to get device UUID for PCI Bus ID {bus_id}: {e}");
        e
    })
}
