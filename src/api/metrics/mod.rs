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

//! Metric families served on the exposition endpoint.
//!
//! Names and label keys are a compatibility contract with existing dashboards
//! and must not change.

pub mod gpu;
pub mod inference;

use prometheus::{Registry, TextEncoder};

use crate::common::error::TelemetryResult;

pub use gpu::{GpuDeviceMetrics, GpuMetricFamilies};
pub use inference::{InferenceMetrics, RequestTimings};

/// Label key carrying the device UUID on every GPU family
pub const GPU_UUID_LABEL: &str = "gpu_uuid";

pub const INFERENCE_REQUEST_SUCCESS: &str = "nv_inference_request_success";
pub const INFERENCE_REQUEST_FAILURE: &str = "nv_inference_request_failure";
pub const INFERENCE_COUNT: &str = "nv_inference_count";
pub const INFERENCE_EXEC_COUNT: &str = "nv_inference_exec_count";
pub const INFERENCE_REQUEST_DURATION_US: &str = "nv_inference_request_duration_us";
pub const INFERENCE_COMPUTE_DURATION_US: &str = "nv_inference_compute_duration_us";
pub const INFERENCE_QUEUE_DURATION_US: &str = "nv_inference_queue_duration_us";
pub const INFERENCE_LOAD_RATIO: &str = "nv_inference_load_ratio";
pub const GPU_UTILIZATION: &str = "nv_gpu_utilization";
pub const GPU_POWER_USAGE: &str = "nv_gpu_power_usage";
pub const GPU_POWER_LIMIT: &str = "nv_gpu_power_limit";
pub const GPU_ENERGY_CONSUMPTION: &str = "nv_energy_consumption";

/// Every family the controller owns, registered once per registry.
#[derive(Clone)]
pub struct TelemetryMetrics {
    pub inference: InferenceMetrics,
    pub gpu: GpuMetricFamilies,
}

impl TelemetryMetrics {
    pub fn register(registry: &Registry) -> TelemetryResult<Self> {
        let inference = InferenceMetrics::new()?;
        inference.register(registry)?;

        let gpu = GpuMetricFamilies::new()?;
        gpu.register(registry)?;

        Ok(Self { inference, gpu })
    }
}

/// Render the registry in Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = String::new();
    encoder.encode_utf8(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        assert!(TelemetryMetrics::register(&registry).is_ok());
        assert!(TelemetryMetrics::register(&registry).is_err());
    }

    #[test]
    fn test_encode_includes_labeled_gpu_series() {
        let registry = Registry::new();
        let metrics = TelemetryMetrics::register(&registry).unwrap();
        metrics.inference.record_execution();

        let device = Device {
            index: 0,
            uuid: "GPU-1234".to_string(),
            name: String::new(),
        };
        metrics.gpu.for_device(&device).set_power_usage_mw(123_000);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("nv_inference_exec_count 1"));
        assert!(text.contains(r#"nv_gpu_power_usage{gpu_uuid="GPU-1234"} 123"#));
        assert!(text.contains("# TYPE nv_inference_request_success counter"));
        assert!(text.contains(r#"nv_energy_consumption{gpu_uuid="GPU-1234"} 0"#));
    }

    #[test]
    fn test_gpu_families_absent_without_devices() {
        let registry = Registry::new();
        TelemetryMetrics::register(&registry).unwrap();

        let text = encode_text(&registry).unwrap();
        assert!(text.contains(INFERENCE_REQUEST_SUCCESS));
        assert!(!text.contains(GPU_UTILIZATION));
    }
}
