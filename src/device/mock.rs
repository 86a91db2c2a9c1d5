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

//! Scripted hardware backend.
//!
//! Used by the binary's `--mock-devices` mode on hosts without NVIDIA
//! hardware, and by tests to drive exact readings and failures. Every
//! reading is optional: `None` makes the corresponding call fail.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::common::constants::mock as defaults;
use super::{DeviceError, DeviceResult, GpuBackend, GpuDevice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub pci_bus_id: String,
    pub power_limit_mw: Option<u32>,
    pub power_usage_mw: Option<u32>,
    pub energy_mj: Option<u64>,
    pub utilization_percent: Option<u32>,
    /// Added to `energy_mj` after every successful energy read
    pub energy_step_mj: u64,
    /// When false, handle lookups for this device fail
    pub handle_available: bool,
}

impl MockDevice {
    pub fn new(index: u32) -> Self {
        Self {
            name: Some(format!("{} {index}", defaults::NAME)),
            uuid: Some(format!("GPU-00000000-0000-0000-0000-{index:012x}")),
            pci_bus_id: format!("00000000:{:02X}:00.0", 0x10 + index),
            power_limit_mw: Some(defaults::POWER_LIMIT_MW),
            power_usage_mw: Some(defaults::POWER_USAGE_MW),
            energy_mj: Some(0),
            utilization_percent: Some(defaults::UTILIZATION_PERCENT),
            energy_step_mj: 0,
            handle_available: true,
        }
    }
}

pub struct MockBackend {
    devices: Mutex<Vec<MockDevice>>,
    count_available: AtomicBool,
    handle_requests: AtomicUsize,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            count_available: AtomicBool::new(true),
            handle_requests: AtomicUsize::new(0),
        }
    }

    /// `count` devices with steady power draw and an energy register that
    /// advances by one interval's worth on every read.
    pub fn with_devices(count: u32) -> Self {
        let devices = (0..count)
            .map(|index| MockDevice {
                energy_mj: Some(1_000_000 * u64::from(index + 1)),
                energy_step_mj: defaults::ENERGY_STEP_MJ,
                ..MockDevice::new(index)
            })
            .collect();
        Self::new(devices)
    }

    /// Make `device_count` fail, as when the management library is unusable.
    pub fn set_count_available(&self, available: bool) {
        self.count_available.store(available, Ordering::SeqCst);
    }

    /// Mutate one device's scripted state. Out-of-range indices are ignored.
    pub fn update<F>(&self, index: usize, f: F)
    where
        F: FnOnce(&mut MockDevice),
    {
        if let Some(device) = self.lock().get_mut(index) {
            f(device);
        }
    }

    pub fn set_energy(&self, index: usize, energy_mj: u64) {
        self.update(index, |device| device.energy_mj = Some(energy_mj));
    }

    pub fn set_handle_available(&self, index: usize, available: bool) {
        self.update(index, |device| device.handle_available = available);
    }

    /// Number of handle lookups served so far, successful or not
    pub fn handle_requests(&self) -> usize {
        self.handle_requests.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MockDevice>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T, F>(&self, index: usize, what: &str, f: F) -> DeviceResult<T>
    where
        F: FnOnce(&mut MockDevice) -> Option<T>,
    {
        let mut devices = self.lock();
        let device = devices
            .get_mut(index)
            .ok_or_else(|| DeviceError::NotFound(format!("mock device {index}")))?;
        f(device).ok_or_else(|| DeviceError::Call(format!("{what} unavailable on mock device {index}")))
    }
}

struct MockHandle<'a> {
    backend: &'a MockBackend,
    index: usize,
}

impl GpuBackend for MockBackend {
    fn device_count(&self) -> DeviceResult<u32> {
        if !self.count_available.load(Ordering::SeqCst) {
            return Err(DeviceError::LibraryUnavailable(
                "mock device count disabled".to_string(),
            ));
        }
        Ok(self.lock().len() as u32)
    }

    fn device_by_index(&self, index: u32) -> DeviceResult<Box<dyn GpuDevice + '_>> {
        self.handle_requests.fetch_add(1, Ordering::SeqCst);
        let index = index as usize;
        match self.lock().get(index) {
            Some(device) if device.handle_available => {}
            Some(_) => {
                return Err(DeviceError::Call(format!(
                    "handle unavailable for mock device {index}"
                )))
            }
            None => return Err(DeviceError::NotFound(format!("mock device {index}"))),
        }
        Ok(Box::new(MockHandle {
            backend: self,
            index,
        }))
    }

    fn device_by_pci_bus_id(&self, pci_bus_id: &str) -> DeviceResult<Box<dyn GpuDevice + '_>> {
        let index = self
            .lock()
            .iter()
            .position(|device| device.pci_bus_id.eq_ignore_ascii_case(pci_bus_id))
            .ok_or_else(|| DeviceError::NotFound(format!("PCI bus id {pci_bus_id}")))?;
        Ok(Box::new(MockHandle {
            backend: self,
            index,
        }))
    }
}

impl GpuDevice for MockHandle<'_> {
    fn name(&self) -> DeviceResult<String> {
        self.backend.read(self.index, "name", |d| d.name.clone())
    }

    fn uuid(&self) -> DeviceResult<String> {
        self.backend.read(self.index, "uuid", |d| d.uuid.clone())
    }

    fn pci_bus_id(&self) -> DeviceResult<String> {
        self.backend
            .read(self.index, "pci bus id", |d| Some(d.pci_bus_id.clone()))
    }

    fn power_management_limit(&self) -> DeviceResult<u32> {
        self.backend
            .read(self.index, "power limit", |d| d.power_limit_mw)
    }

    fn power_usage(&self) -> DeviceResult<u32> {
        self.backend
            .read(self.index, "power usage", |d| d.power_usage_mw)
    }

    fn total_energy_consumption(&self) -> DeviceResult<u64> {
        self.backend.read(self.index, "energy", |d| {
            let current = d.energy_mj?;
            d.energy_mj = Some(current + d.energy_step_mj);
            Some(current)
        })
    }

    fn utilization_percent(&self) -> DeviceResult<u32> {
        self.backend
            .read(self.index, "utilization", |d| d.utilization_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_readings() {
        let backend = MockBackend::new(vec![MockDevice::new(0)]);
        let handle = backend.device_by_index(0).unwrap();

        assert_eq!(handle.power_management_limit().unwrap(), defaults::POWER_LIMIT_MW);
        assert_eq!(handle.utilization_percent().unwrap(), defaults::UTILIZATION_PERCENT);
        assert_eq!(handle.total_energy_consumption().unwrap(), 0);
    }

    #[test]
    fn test_energy_step_advances_register() {
        let backend = MockBackend::with_devices(1);
        let handle = backend.device_by_index(0).unwrap();

        let first = handle.total_energy_consumption().unwrap();
        let second = handle.total_energy_consumption().unwrap();
        assert_eq!(second - first, defaults::ENERGY_STEP_MJ);
    }

    #[test]
    fn test_missing_reading_fails() {
        let backend = MockBackend::new(vec![MockDevice {
            uuid: None,
            ..MockDevice::new(0)
        }]);
        let handle = backend.device_by_index(0).unwrap();
        assert!(matches!(handle.uuid(), Err(DeviceError::Call(_))));
    }

    #[test]
    fn test_handle_failures() {
        let backend = MockBackend::with_devices(2);
        backend.set_handle_available(1, false);

        assert!(backend.device_by_index(0).is_ok());
        assert!(backend.device_by_index(1).is_err());
        assert!(matches!(
            backend.device_by_index(5).err(),
            Some(DeviceError::NotFound(_))
        ));
        assert_eq!(backend.handle_requests(), 3);
    }

    #[test]
    fn test_lookup_by_pci_bus_id() {
        let backend = MockBackend::with_devices(2);
        let handle = backend.device_by_pci_bus_id("00000000:11:00.0").unwrap();
        assert_eq!(
            handle.uuid().unwrap(),
            "GPU-00000000-0000-0000-0000-000000000001"
        );
        assert!(backend.device_by_pci_bus_id("00000000:99:00.0").is_err());
    }

    #[test]
    fn test_device_count_failure() {
        let backend = MockBackend::with_devices(2);
        assert_eq!(backend.device_count().unwrap(), 2);
        backend.set_count_available(false);
        assert!(backend.device_count().is_err());
    }
}
