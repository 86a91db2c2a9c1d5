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

use nvml_wrapper::{Device as NvmlDevice, Nvml};

use super::{DeviceResult, GpuBackend, GpuDevice};

/// NVIDIA GPUs through the NVIDIA Management Library.
///
/// The library is loaded at runtime, so this builds and links on hosts
/// without a driver; [`NvmlBackend::init`] fails there instead.
pub struct NvmlBackend {
    nvml: Nvml,
}

impl NvmlBackend {
    pub fn init() -> DeviceResult<Self> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml })
    }
}

struct NvmlHandle<'a> {
    device: NvmlDevice<'a>,
}

impl GpuBackend for NvmlBackend {
    fn device_count(&self) -> DeviceResult<u32> {
        Ok(self.nvml.device_count()?)
    }

    fn device_by_index(&self, index: u32) -> DeviceResult<Box<dyn GpuDevice + '_>> {
        let device = self.nvml.device_by_index(index)?;
        Ok(Box::new(NvmlHandle { device }))
    }

    fn device_by_pci_bus_id(&self, pci_bus_id: &str) -> DeviceResult<Box<dyn GpuDevice + '_>> {
        let device = self.nvml.device_by_pci_bus_id(pci_bus_id)?;
        Ok(Box::new(NvmlHandle { device }))
    }
}

impl GpuDevice for NvmlHandle<'_> {
    fn name(&self) -> DeviceResult<String> {
        Ok(self.device.name()?)
    }

    fn uuid(&self) -> DeviceResult<String> {
        Ok(self.device.uuid()?)
    }

    fn pci_bus_id(&self) -> DeviceResult<String> {
        Ok(self.device.pci_info()?.bus_id)
    }

    fn power_management_limit(&self) -> DeviceResult<u32> {
        Ok(self.device.power_management_limit()?)
    }

    fn power_usage(&self) -> DeviceResult<u32> {
        Ok(self.device.power_usage()?)
    }

    fn total_energy_consumption(&self) -> DeviceResult<u64> {
        Ok(self.device.total_energy_consumption()?)
    }

    fn utilization_percent(&self) -> DeviceResult<u32> {
        Ok(self.device.utilization_rates()?.gpu)
    }
}
