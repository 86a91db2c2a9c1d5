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

pub mod common;
pub mod compute;
pub mod enumerator;
pub mod mock;
pub mod nvml;

pub use common::{DeviceError, DeviceResult};
pub use compute::{resolve_uuid_for_compute_device, ComputeDeviceMap, PciOrderedComputeMap};
pub use enumerator::discover_devices;
pub use mock::{MockBackend, MockDevice};
pub use nvml::NvmlBackend;

/// A GPU found during enumeration. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Position in the management interface's enumeration order
    pub index: u32,
    /// Stable identifier, or `"unknown"` when the device does not report one
    pub uuid: String,
    /// Display name, empty when unavailable
    pub name: String,
}

/// Hardware-management interface.
///
/// Handles are re-resolved on every use and never cached by callers, so a
/// backend is free to hand out short-lived views.
pub trait GpuBackend: Send + Sync {
    fn device_count(&self) -> DeviceResult<u32>;

    fn device_by_index(&self, index: u32) -> DeviceResult<Box<dyn GpuDevice + '_>>;

    fn device_by_pci_bus_id(&self, pci_bus_id: &str) -> DeviceResult<Box<dyn GpuDevice + '_>>;
}

/// Readings available from a single device handle.
pub trait GpuDevice {
    fn name(&self) -> DeviceResult<String>;

    fn uuid(&self) -> DeviceResult<String>;

    fn pci_bus_id(&self) -> DeviceResult<String>;

    /// Power management limit in milliwatts
    fn power_management_limit(&self) -> DeviceResult<u32>;

    /// Current power draw in milliwatts
    fn power_usage(&self) -> DeviceResult<u32>;

    /// Cumulative energy in millijoules since an undefined epoch (usually driver load)
    fn total_energy_consumption(&self) -> DeviceResult<u64>;

    /// GPU utilization over the last sample period, 0..=100
    fn utilization_percent(&self) -> DeviceResult<u32>;
}
