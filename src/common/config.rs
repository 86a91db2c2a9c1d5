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

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{TelemetryError, TelemetryResult};

/// Default sampling cadence for GPU counters
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 2000;

/// Default allowance for one sampling pass when waiting for the worker to exit
pub const DEFAULT_SAMPLING_BUDGET_MS: u64 = 1000;

/// Default port of the metrics endpoint
pub const DEFAULT_METRICS_PORT: u16 = 8002;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Address the metrics endpoint binds to
    pub bind_host: IpAddr,

    /// Sleep between two sampling passes
    pub sample_interval_ms: u64,

    /// Time a single sampling pass is allowed to take
    pub sampling_budget_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            sampling_budget_ms: DEFAULT_SAMPLING_BUDGET_MS,
        }
    }
}

impl TelemetryConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.sample_interval_ms == 0 {
            return Err(TelemetryError::Config(
                "sample_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Upper bound on how long teardown waits for the sampling worker:
    /// one full sleep plus one sampling pass.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.saturating_add(self.sampling_budget_ms))
    }

    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_host, port)
    }
}

/// Environment variable overrides applied on top of file or default values.
pub struct EnvConfig;

impl EnvConfig {
    pub const SAMPLE_INTERVAL_VAR: &'static str = "GPU_TELEMETRY_SAMPLE_INTERVAL_MS";
    pub const BIND_HOST_VAR: &'static str = "GPU_TELEMETRY_BIND_HOST";

    pub fn apply(config: &mut TelemetryConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup. Unparseable values
    /// are ignored with a warning.
    pub fn apply_from<F>(config: &mut TelemetryConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(Self::SAMPLE_INTERVAL_VAR) {
            match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.sample_interval_ms = ms,
                _ => tracing::warn!(
                    "ignoring invalid {}={value}",
                    Self::SAMPLE_INTERVAL_VAR
                ),
            }
        }

        if let Some(value) = lookup(Self::BIND_HOST_VAR) {
            match value.trim().parse::<IpAddr>() {
                Ok(host) => config.bind_host = host,
                Err(e) => tracing::warn!("ignoring invalid {}={value}: {e}", Self::BIND_HOST_VAR),
            }
        }
    }
}
