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

use prometheus::{Counter, Histogram, HistogramOpts, Opts, Registry};

use super::{
    INFERENCE_COMPUTE_DURATION_US, INFERENCE_COUNT, INFERENCE_EXEC_COUNT, INFERENCE_LOAD_RATIO,
    INFERENCE_QUEUE_DURATION_US, INFERENCE_REQUEST_DURATION_US, INFERENCE_REQUEST_FAILURE,
    INFERENCE_REQUEST_SUCCESS,
};

/// Load ratio buckets: end-to-end request time over compute time
pub const LOAD_RATIO_BUCKETS: &[f64] = &[1.05, 1.10, 1.25, 1.5, 2.0, 10.0, 50.0];

/// Durations of a single request in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestTimings {
    pub request_us: u64,
    pub compute_us: u64,
    pub queue_us: u64,
}

/// Request-level families. These carry no labels and no sampling logic;
/// the serving path writes them directly.
#[derive(Clone)]
pub struct InferenceMetrics {
    pub request_success: Counter,
    pub request_failure: Counter,
    pub inference_count: Counter,
    pub execution_count: Counter,
    pub request_duration_us: Counter,
    pub compute_duration_us: Counter,
    pub queue_duration_us: Counter,
    pub load_ratio: Histogram,
}

impl InferenceMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            request_success: Counter::with_opts(Opts::new(
                INFERENCE_REQUEST_SUCCESS,
                "Number of successful inference requests, all batch sizes",
            ))?,
            request_failure: Counter::with_opts(Opts::new(
                INFERENCE_REQUEST_FAILURE,
                "Number of failed inference requests, all batch sizes",
            ))?,
            inference_count: Counter::with_opts(Opts::new(
                INFERENCE_COUNT,
                "Number of inferences performed",
            ))?,
            execution_count: Counter::with_opts(Opts::new(
                INFERENCE_EXEC_COUNT,
                "Number of model executions performed",
            ))?,
            request_duration_us: Counter::with_opts(Opts::new(
                INFERENCE_REQUEST_DURATION_US,
                "Cumulative inference request duration in microseconds",
            ))?,
            compute_duration_us: Counter::with_opts(Opts::new(
                INFERENCE_COMPUTE_DURATION_US,
                "Cumulative inference compute duration in microseconds",
            ))?,
            queue_duration_us: Counter::with_opts(Opts::new(
                INFERENCE_QUEUE_DURATION_US,
                "Cumulative inference queuing duration in microseconds",
            ))?,
            load_ratio: Histogram::with_opts(
                HistogramOpts::new(
                    INFERENCE_LOAD_RATIO,
                    "Ratio of inference request end-to-end time to compute time",
                )
                .buckets(LOAD_RATIO_BUCKETS.to_vec()),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.request_success.clone()))?;
        registry.register(Box::new(self.request_failure.clone()))?;
        registry.register(Box::new(self.inference_count.clone()))?;
        registry.register(Box::new(self.execution_count.clone()))?;
        registry.register(Box::new(self.request_duration_us.clone()))?;
        registry.register(Box::new(self.compute_duration_us.clone()))?;
        registry.register(Box::new(self.queue_duration_us.clone()))?;
        registry.register(Box::new(self.load_ratio.clone()))?;
        Ok(())
    }

    /// Record a completed request that ran as one execution of `batch_size` inferences.
    pub fn record_success(&self, batch_size: u32, timings: RequestTimings) {
        self.request_success.inc();
        self.inference_count.inc_by(f64::from(batch_size));
        self.execution_count.inc();
        self.add_durations(timings);

        if timings.compute_us > 0 {
            self.load_ratio
                .observe(timings.request_us as f64 / timings.compute_us as f64);
        }
    }

    /// Record a failed request. Only the end-to-end duration is accounted.
    pub fn record_failure(&self, timings: RequestTimings) {
        self.request_failure.inc();
        self.request_duration_us.inc_by(timings.request_us as f64);
    }

    /// Count an execution that served several already-recorded requests.
    pub fn record_execution(&self) {
        self.execution_count.inc();
    }

    fn add_durations(&self, timings: RequestTimings) {
        self.request_duration_us.inc_by(timings.request_us as f64);
        self.compute_duration_us.inc_by(timings.compute_us as f64);
        self.queue_duration_us.inc_by(timings.queue_us as f64);
    }
}
