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

pub mod energy;
pub mod sampler;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use prometheus::Registry;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::metrics::{InferenceMetrics, TelemetryMetrics};
use crate::api::MetricsServer;
use crate::common::config::TelemetryConfig;
use crate::common::error::{TelemetryError, TelemetryResult};
use crate::device::{
    discover_devices, resolve_uuid_for_compute_device, ComputeDeviceMap, Device, GpuBackend,
    NvmlBackend, PciOrderedComputeMap,
};
use sampler::{DeviceSlot, Sampler};

/// Result of [`Telemetry::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Endpoint started and GPU telemetry is active for this many devices
    Ready { gpu_devices: usize },
    /// Endpoint started, but the management interface was unusable; only
    /// request-level metrics are served
    GpuDisabled,
    /// A previous call already initialized telemetry; nothing was done
    AlreadyInitialized,
}

enum BackendSource {
    Nvml,
    Provided(Arc<dyn GpuBackend>),
}

enum Lifecycle {
    Idle,
    Running(Running),
    Stopped,
}

struct Running {
    server: MetricsServer,
    worker: Option<Worker>,
}

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(sampler: Sampler) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sampler.run(shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn stop(mut self, timeout: Duration) -> TelemetryResult<()> {
        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("GPU sampler task failed: {e}");
                Ok(())
            }
            Err(_) => {
                self.handle.abort();
                Err(TelemetryError::ShutdownTimeout(timeout))
            }
        }
    }
}

#[derive(Default)]
struct GpuState {
    backend: Option<Arc<dyn GpuBackend>>,
    devices: Vec<Device>,
}

/// Process-wide telemetry context.
///
/// Construct one at process start and hand references to whoever needs to
/// record request metrics, register extra families or look up device UUIDs.
/// [`initialize`](Self::initialize) takes effect once; teardown happens in
/// [`shutdown`](Self::shutdown).
pub struct Telemetry {
    config: TelemetryConfig,
    registry: Registry,
    metrics: TelemetryMetrics,
    source: BackendSource,
    compute_map: Box<dyn ComputeDeviceMap>,
    gpu: RwLock<GpuState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Telemetry {
    /// Telemetry backed by NVML, loaded when [`initialize`](Self::initialize) runs.
    pub fn new(config: TelemetryConfig) -> TelemetryResult<Self> {
        Self::build(config, BackendSource::Nvml)
    }

    pub fn with_backend(
        config: TelemetryConfig,
        backend: Arc<dyn GpuBackend>,
    ) -> TelemetryResult<Self> {
        Self::build(config, BackendSource::Provided(backend))
    }

    fn build(config: TelemetryConfig, source: BackendSource) -> TelemetryResult<Self> {
        config.validate()?;
        let registry = Registry::new();
        let metrics = TelemetryMetrics::register(&registry)?;

        Ok(Self {
            config,
            registry,
            metrics,
            source,
            compute_map: Box::new(PciOrderedComputeMap::from_env()),
            gpu: RwLock::new(GpuState::default()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Replace how compute-runtime indices map to PCI bus ids.
    pub fn with_compute_map(mut self, map: impl ComputeDeviceMap + 'static) -> Self {
        self.compute_map = Box::new(map);
        self
    }

    /// Discover GPUs, start the sampler and serve metrics on `port`.
    ///
    /// Only a failure to bind the endpoint is an error. An unusable
    /// management interface disables GPU telemetry and is reported as
    /// [`InitOutcome::GpuDisabled`].
    pub async fn initialize(&self, port: u16) -> TelemetryResult<InitOutcome> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Idle) {
            warn!("Metrics already initialized.");
            return Ok(InitOutcome::AlreadyInitialized);
        }

        // Bind first so a failed start leaves no GPU state or series behind
        let server = MetricsServer::start(self.config.bind_addr(port), self.registry.clone()).await?;

        let gpu = self.initialize_gpu_metrics();

        let (outcome, worker) = match gpu {
            Some((backend, slots)) => {
                let outcome = InitOutcome::Ready {
                    gpu_devices: slots.len(),
                };
                // Nothing to sample without devices
                let worker = (!slots.is_empty()).then(|| {
                    Worker::spawn(Sampler::new(
                        backend,
                        slots,
                        self.config.sample_interval(),
                    ))
                });
                (outcome, worker)
            }
            None => (InitOutcome::GpuDisabled, None),
        };

        *lifecycle = Lifecycle::Running(Running { server, worker });
        Ok(outcome)
    }

    /// Load the backend, enumerate devices and register their instances.
    /// Returns `None` when GPU telemetry has to be disabled.
    fn initialize_gpu_metrics(&self) -> Option<(Arc<dyn GpuBackend>, Vec<DeviceSlot>)> {
        let backend: Arc<dyn GpuBackend> = match &self.source {
            BackendSource::Provided(backend) => Arc::clone(backend),
            BackendSource::Nvml => match NvmlBackend::init() {
                Ok(nvml) => Arc::new(nvml),
                Err(e) => {
                    error!("failed to initialize NVML: {e}");
                    return None;
                }
            },
        };

        let devices = discover_devices(backend.as_ref()).ok()?;

        let slots: Vec<DeviceSlot> = devices
            .iter()
            .map(|device| DeviceSlot {
                device: device.clone(),
                metrics: self.metrics.gpu.for_device(device),
            })
            .collect();

        let mut gpu = self.gpu.write().unwrap_or_else(|e| e.into_inner());
        gpu.backend = Some(Arc::clone(&backend));
        gpu.devices = devices;

        Some((backend, slots))
    }

    /// Stop the sampler, then the endpoint. A no-op when nothing was started.
    ///
    /// Waits at most one sampling interval plus the sampling budget for the
    /// sampler; no GPU instance is written after this returns.
    pub async fn shutdown(&self) -> TelemetryResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(running) => running,
            other => {
                *lifecycle = other;
                return Ok(());
            }
        };

        let result = match running.worker {
            Some(worker) => worker.stop(self.config.shutdown_timeout()).await,
            None => Ok(()),
        };

        running.server.stop().await;
        info!("Telemetry stopped");
        result
    }

    /// Shared registry, for collaborators registering their own families
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn inference(&self) -> &InferenceMetrics {
        &self.metrics.inference
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Devices discovered by [`initialize`](Self::initialize), in enumeration order
    pub fn devices(&self) -> Vec<Device> {
        self.gpu
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .devices
            .clone()
    }

    /// Address the endpoint is bound to, once running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.server.local_addr()),
            _ => None,
        }
    }

    /// UUID of the device a compute runtime calls `compute_index`.
    pub fn resolve_uuid_for_compute_device(&self, compute_index: u32) -> TelemetryResult<String> {
        let backend = self
            .gpu
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .backend
            .clone()
            .ok_or(TelemetryError::GpuDisabled)?;

        Ok(resolve_uuid_for_compute_device(
            backend.as_ref(),
            self.compute_map.as_ref(),
            compute_index,
        )?)
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        // Best effort when shutdown() was never awaited
        if let Lifecycle::Running(running) = self.lifecycle.get_mut() {
            if let Some(worker) = &running.worker {
                let _ = worker.shutdown_tx.send(true);
            }
            running.server.signal_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::compute::PCI_BUS_ID_ORDER;
    use crate::device::{MockBackend, MockDevice};

    fn fast_config() -> TelemetryConfig {
        TelemetryConfig {
            bind_host: "127.0.0.1".parse().unwrap(),
            sample_interval_ms: 20,
            sampling_budget_ms: 200,
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let backend = Arc::new(MockBackend::with_devices(2));
        let telemetry = Telemetry::with_backend(fast_config(), backend).unwrap();

        let first = telemetry.initialize(0).await.unwrap();
        assert_eq!(first, InitOutcome::Ready { gpu_devices: 2 });
        let addr = telemetry.local_addr().await.unwrap();
        let families = telemetry.registry().gather().len();

        let second = telemetry.initialize(0).await.unwrap();
        assert_eq!(second, InitOutcome::AlreadyInitialized);
        assert_eq!(telemetry.local_addr().await, Some(addr));
        assert_eq!(telemetry.registry().gather().len(), families);
        assert_eq!(telemetry.devices().len(), 2);

        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_device_count_failure_disables_gpu_only() {
        let backend = Arc::new(MockBackend::with_devices(2));
        backend.set_count_available(false);
        let telemetry = Telemetry::with_backend(fast_config(), backend).unwrap();

        let outcome = telemetry.initialize(0).await.unwrap();
        assert_eq!(outcome, InitOutcome::GpuDisabled);
        assert!(telemetry.devices().is_empty());
        assert!(matches!(
            telemetry.resolve_uuid_for_compute_device(0),
            Err(TelemetryError::GpuDisabled)
        ));

        // Request-level metrics still work
        telemetry.inference().record_execution();
        assert_eq!(telemetry.inference().execution_count.get(), 1.0);

        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_exactly_one_instance_per_device_and_family() {
        let backend = Arc::new(MockBackend::with_devices(3));
        let telemetry = Telemetry::with_backend(fast_config(), backend).unwrap();
        telemetry.initialize(0).await.unwrap();

        let text = crate::api::metrics::encode_text(telemetry.registry()).unwrap();
        for name in [
            "nv_gpu_utilization",
            "nv_gpu_power_usage",
            "nv_gpu_power_limit",
            "nv_energy_consumption",
        ] {
            let prefix = format!("{name}{{gpu_uuid=");
            let series = text.lines().filter(|line| line.starts_with(&prefix)).count();
            assert_eq!(series, 3, "{name}");
        }

        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_sampling() {
        let backend = Arc::new(MockBackend::with_devices(1));
        let telemetry =
            Telemetry::with_backend(fast_config(), Arc::clone(&backend) as Arc<dyn GpuBackend>)
                .unwrap();
        telemetry.initialize(0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        telemetry.shutdown().await.unwrap();

        let requests = backend.handle_requests();
        let energy = telemetry.metrics.gpu.energy_consumption.with_label_values(&[
            "GPU-00000000-0000-0000-0000-000000000000",
        ]);
        let joules = energy.get();
        assert!(joules > 0.0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.handle_requests(), requests);
        assert_eq!(energy.get(), joules);
        assert_eq!(telemetry.local_addr().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_without_initialize_is_noop() {
        let backend = Arc::new(MockBackend::with_devices(1));
        let telemetry = Telemetry::with_backend(fast_config(), backend).unwrap();
        telemetry.shutdown().await.unwrap();
        assert_eq!(telemetry.initialize(0).await.unwrap(), InitOutcome::Ready { gpu_devices: 1 });
        telemetry.shutdown().await.unwrap();
        // Shutting down twice is harmless
        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_devices_starts_no_worker() {
        let backend = Arc::new(MockBackend::new(Vec::new()));
        let telemetry =
            Telemetry::with_backend(fast_config(), Arc::clone(&backend) as Arc<dyn GpuBackend>)
                .unwrap();

        let outcome = telemetry.initialize(0).await.unwrap();
        assert_eq!(outcome, InitOutcome::Ready { gpu_devices: 0 });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.handle_requests(), 0);
        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_uuid_for_compute_device() {
        let backend = Arc::new(MockBackend::new(vec![
            MockDevice {
                uuid: Some("GPU-late".to_string()),
                pci_bus_id: "00000000:81:00.0".to_string(),
                ..MockDevice::new(0)
            },
            MockDevice {
                uuid: Some("GPU-early".to_string()),
                pci_bus_id: "00000000:05:00.0".to_string(),
                ..MockDevice::new(1)
            },
        ]));
        let telemetry = Telemetry::with_backend(fast_config(), backend)
            .unwrap()
            .with_compute_map(PciOrderedComputeMap::new(Some(PCI_BUS_ID_ORDER), None));
        telemetry.initialize(0).await.unwrap();

        assert_eq!(telemetry.resolve_uuid_for_compute_device(0).unwrap(), "GPU-early");
        assert_eq!(telemetry.resolve_uuid_for_compute_device(1).unwrap(), "GPU-late");
        assert!(telemetry.resolve_uuid_for_compute_device(2).is_err());

        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_telemetry_idle() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let backend = Arc::new(MockBackend::with_devices(2));
        let telemetry =
            Telemetry::with_backend(fast_config(), Arc::clone(&backend) as Arc<dyn GpuBackend>)
                .unwrap();

        assert!(matches!(
            telemetry.initialize(port).await,
            Err(TelemetryError::Bind { .. })
        ));
        assert!(telemetry.devices().is_empty());
        assert!(matches!(
            telemetry.resolve_uuid_for_compute_device(0),
            Err(TelemetryError::GpuDisabled)
        ));
        assert_eq!(backend.handle_requests(), 0);
        let text = crate::api::metrics::encode_text(telemetry.registry()).unwrap();
        assert!(!text.contains("nv_gpu_utilization"));

        // A later attempt on a free port starts normally
        assert_eq!(
            telemetry.initialize(0).await.unwrap(),
            InitOutcome::Ready { gpu_devices: 2 }
        );
        assert_eq!(telemetry.devices().len(), 2);
        telemetry.shutdown().await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TelemetryConfig {
            sample_interval_ms: 0,
            ..fast_config()
        };
        assert!(matches!(
            Telemetry::new(config),
            Err(TelemetryError::Config(_))
        ));
    }
}
