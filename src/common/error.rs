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

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceError;

/// Errors surfaced by the telemetry controller.
///
/// Per-device and per-signal sampling failures never reach this type; the
/// sampler logs them and moves on.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Hardware management error: {0}")]
    Hardware(#[from] DeviceError),

    #[error("Metric registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("Failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sampling worker did not exit within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("GPU telemetry is not available")]
    GpuDisabled,
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
