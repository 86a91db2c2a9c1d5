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

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpu_telemetry::cli::Cli;
use gpu_telemetry::device::MockBackend;
use gpu_telemetry::{InitOutcome, Telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.telemetry_config().context("loading configuration")?;

    let telemetry = match cli.mock_devices {
        Some(count) => {
            info!("Using {count} mock GPUs");
            Telemetry::with_backend(config, Arc::new(MockBackend::with_devices(count)))?
        }
        None => Telemetry::new(config)?,
    };

    match telemetry
        .initialize(cli.port)
        .await
        .context("starting metrics endpoint")?
    {
        InitOutcome::Ready { gpu_devices } => {
            info!("GPU telemetry active for {gpu_devices} devices")
        }
        InitOutcome::GpuDisabled => info!("GPU telemetry unavailable, serving request metrics only"),
        InitOutcome::AlreadyInitialized => {}
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");

    telemetry.shutdown().await?;
    Ok(())
}
