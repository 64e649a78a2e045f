// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device registry and gauge binding
//!
//! The registry is built once at startup: every discovered device is
//! classified, and each metric of its kind gets exactly one gauge carrying
//! `device_id` and `device_name` as constant labels. Bindings are never
//! recreated, so the exposed series set is fixed for the process lifetime.
//!
//! Gauges are `prometheus::Gauge`, an atomic cell, so the scrape endpoint
//! can read them while the poll loop writes without locking the registry.

use crate::device::{Device, DeviceSource, DiscoveredDevice, Metric, StatusSample};
use crate::error::Result;
use prometheus::{Gauge, Opts, Registry};
use tracing::{debug, info};

/// Label carrying the vendor device ID
pub const DEVICE_ID_LABEL: &str = "device_id";
/// Label carrying the user-assigned device name
pub const DEVICE_NAME_LABEL: &str = "device_name";

/// Creates labelled gauges and registers them for exposition
#[derive(Clone)]
pub struct GaugeBinder {
    registry: Registry,
}

impl GaugeBinder {
    /// Create a binder registering into `registry`
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Create and register the gauge for one (device, metric) pair.
    ///
    /// Binding the same pair twice fails with a duplicate-registration error
    /// instead of exposing a second series.
    pub fn bind(&self, device: &Device, metric: Metric) -> Result<Gauge> {
        let opts = Opts::new(metric.name(), metric.help())
            .const_label(DEVICE_ID_LABEL, device.id.as_str())
            .const_label(DEVICE_NAME_LABEL, device.name.as_str());
        let gauge = Gauge::with_opts(opts)?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Registry the gauges are registered in
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// One (device, metric) binding
#[derive(Clone)]
pub struct MetricBinding {
    pub metric: Metric,
    gauge: Gauge,
}

impl MetricBinding {
    /// Current gauge value
    pub fn value(&self) -> f64 {
        self.gauge.get()
    }
}

/// A classified device together with its bindings
pub struct BoundDevice {
    device: Device,
    bindings: Vec<MetricBinding>,
}

impl BoundDevice {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn bindings(&self) -> &[MetricBinding] {
        &self.bindings
    }

    /// Gauge bound for `metric`, if the device's kind defines it
    pub fn binding(&self, metric: Metric) -> Option<&MetricBinding> {
        self.bindings.iter().find(|b| b.metric == metric)
    }

    /// Write every value present in `sample` into its bound gauge.
    ///
    /// Returns the number of gauges written. Metrics missing from the sample
    /// keep their previous value.
    pub fn apply(&self, sample: &StatusSample) -> usize {
        let mut written = 0;
        for binding in &self.bindings {
            if let Some(value) = sample.value(binding.metric) {
                binding.gauge.set(value);
                written += 1;
            }
        }
        written
    }
}

/// Registry of monitored devices; owns every metric binding
pub struct DeviceRegistry {
    devices: Vec<BoundDevice>,
}

impl DeviceRegistry {
    /// List devices from `source` and bind gauges for every recognised one.
    ///
    /// A listing failure is returned as-is; there is no partial registry.
    pub async fn discover<S>(source: &S, binder: &GaugeBinder) -> Result<Self>
    where
        S: DeviceSource + ?Sized,
    {
        let discovered = source.list_devices().await?;
        Self::from_discovered(discovered, binder)
    }

    /// Build the registry from an already fetched device list
    pub fn from_discovered(
        discovered: impl IntoIterator<Item = DiscoveredDevice>,
        binder: &GaugeBinder,
    ) -> Result<Self> {
        let mut devices = Vec::new();

        for entry in discovered {
            let device = Device::classify(entry);
            if !device.kind.is_recognized() {
                debug!(
                    device_id = %device.id,
                    device_name = %device.name,
                    kind = ?device.kind,
                    "skipping device with unsupported type"
                );
                continue;
            }

            let bindings = device
                .kind
                .metrics()
                .iter()
                .map(|&metric| {
                    binder
                        .bind(&device, metric)
                        .map(|gauge| MetricBinding { metric, gauge })
                })
                .collect::<Result<Vec<_>>>()?;

            info!(
                device_id = %device.id,
                device_name = %device.name,
                kind = ?device.kind,
                metrics = bindings.len(),
                "adding device"
            );
            devices.push(BoundDevice { device, bindings });
        }

        Ok(Self { devices })
    }

    /// Iterate over monitored devices in discovery order
    pub fn devices(&self) -> impl Iterator<Item = &BoundDevice> {
        self.devices.iter()
    }

    /// Look up a monitored device by ID
    pub fn get(&self, device_id: &str) -> Option<&BoundDevice> {
        self.devices.iter().find(|d| d.device.id == device_id)
    }

    /// Number of monitored devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no device is monitored
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Total number of bindings across all devices
    pub fn binding_count(&self) -> usize {
        self.devices.iter().map(|d| d.bindings.len()).sum()
    }
}
