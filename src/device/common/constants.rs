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

// Common constants for device readers

/// Power conversion constants
pub const MILLIWATTS_PER_WATT: f64 = 1000.0;

/// Energy conversion constants
pub const MILLIJOULES_PER_JOULE: f64 = 1000.0;

/// Utilization is reported in whole percent
pub const PERCENT_PER_UNIT: f64 = 100.0;

/// Default values substituted when a reading fails
pub const DEFAULT_POWER_MW: u32 = 0;
pub const DEFAULT_UTILIZATION_PERCENT: u32 = 0;

/// Label value used when a device does not report a UUID
pub const UNKNOWN_UUID: &str = "unknown";

/// String parsing constants
pub const DEVICE_UUID_PREFIX_GPU: &str = "GPU-";
pub const DEVICE_UUID_PREFIX_MIG: &str = "MIG-";

/// Mock device defaults
pub mod mock {
    pub const POWER_LIMIT_MW: u32 = 300_000;
    pub const POWER_USAGE_MW: u32 = 150_000;
    pub const UTILIZATION_PERCENT: u32 = 42;
    /// Energy drawn at POWER_USAGE_MW over one default sampling interval
    pub const ENERGY_STEP_MJ: u64 = 300_000;
    pub const NAME: &str = "Mock GPU";
}
