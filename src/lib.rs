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

//! Process-embedded GPU telemetry.
//!
//! A [`Telemetry`] context owns a Prometheus registry holding the inference
//! request families and one labeled instance per GPU for utilization, power
//! usage, power limit and energy consumption. Once initialized, a background
//! sampler refreshes the GPU instances on a fixed interval and an HTTP endpoint
//! serves the registry in text exposition format.

pub mod api;
pub mod cli;
pub mod common;
pub mod device;
pub mod telemetry;

pub use api::metrics::{InferenceMetrics, RequestTimings};
pub use common::config::TelemetryConfig;
pub use common::error::{TelemetryError, TelemetryResult};
pub use device::{Device, DeviceError, GpuBackend, GpuDevice};
pub use telemetry::{InitOutcome, Telemetry};
