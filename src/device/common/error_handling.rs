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

use nvml_wrapper::error::NvmlError;
use thiserror::Error;

/// Failure of a hardware-management call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Management library unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Operation not supported by this device")]
    NotSupported,

    #[error("Management call failed: {0}")]
    Call(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

impl From<NvmlError> for DeviceError {
    fn from(err: NvmlError) -> Self {
        match err {
            NvmlError::NotSupported => DeviceError::NotSupported,
            NvmlError::NotFound => DeviceError::NotFound(err.to_string()),
            NvmlError::LibloadingError(_)
            | NvmlError::LibraryNotFound
            | NvmlError::DriverNotLoaded
            | NvmlError::Uninitialized => DeviceError::LibraryUnavailable(err.to_string()),
            _ => DeviceError::Call(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvml_error_mapping() {
        assert_eq!(DeviceError::from(NvmlError::NotSupported), DeviceError::NotSupported);
        assert!(matches!(
            DeviceError::from(NvmlError::NotFound),
            DeviceError::NotFound(_)
        ));
        assert!(matches!(
            DeviceError::from(NvmlError::DriverNotLoaded),
            DeviceError::LibraryUnavailable(_)
        ));
        assert!(matches!(
            DeviceError::from(NvmlError::GpuLost),
            DeviceError::Call(_)
        ));
    }
}
