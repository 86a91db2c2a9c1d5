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

use tracing::{debug, error, info, warn};

use super::common::constants::UNKNOWN_UUID;
use super::{Device, DeviceResult, GpuBackend};

/// Enumerate the devices visible to the management interface.
///
/// Fails only when the device count itself cannot be read. A device whose
/// handle cannot be obtained is logged and left out; a device without a
/// readable UUID is kept under the `"unknown"` label. Duplicate UUIDs are
/// not collapsed, every enumeration index yields its own entry.
pub fn discover_devices(backend: &dyn GpuBackend) -> DeviceResult<Vec<Device>> {
    let count = backend.device_count().map_err(|e| {
        error!("failed to get device count for GPU metrics: {e}");
        e
    })?;

    info!("found {count} GPUs supporting NVML metrics");

    let mut devices = Vec::with_capacity(count as usize);
    for index in 0..count {
        let handle = match backend.device_by_index(index) {
            Ok(handle) => handle,
            Err(e) => {
                error!("failed to get device handle for GPU {index}: {e}");
                continue;
            }
        };

        let name = match handle.name() {
            Ok(name) => {
                info!("  GPU {index}: {name}");
                name
            }
            Err(e) => {
                debug!("failed to get name for GPU {index}: {e}");
                String::new()
            }
        };

        let uuid = handle.uuid().unwrap_or_else(|e| {
            warn!("failed to get UUID for GPU {index}, labeling as {UNKNOWN_UUID}: {e}");
            UNKNOWN_UUID.to_string()
        });

        devices.push(Device { index, uuid, name });
    }

    Ok(devices)
}
