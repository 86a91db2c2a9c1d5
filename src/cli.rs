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

use std::path::PathBuf;

use clap::Parser;

use crate::common::config::{EnvConfig, TelemetryConfig, DEFAULT_METRICS_PORT};
use crate::common::error::TelemetryResult;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port for the metrics endpoint
    #[arg(short, long, default_value_t = DEFAULT_METRICS_PORT)]
    pub port: u16,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sampling interval in milliseconds (overrides file and environment)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Serve this many scripted GPUs instead of querying NVML
    #[arg(long)]
    pub mock_devices: Option<u32>,
}

impl Cli {
    /// Defaults, then the config file, then environment, then flags.
    pub fn telemetry_config(&self) -> TelemetryResult<TelemetryConfig> {
        let mut config = match &self.config {
            Some(path) => TelemetryConfig::from_file(path)?,
            None => TelemetryConfig::default(),
        };
        EnvConfig::apply(&mut config);
        if let Some(interval_ms) = self.interval_ms {
            config.sample_interval_ms = interval_ms;
        }
        config.validate()?;
        Ok(config)
    }
}
