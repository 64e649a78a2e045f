// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-interval poll loop
//!
//! Polls every registered device in turn, once immediately and then on each
//! tick of a fixed interval. A tick runs to completion before the next one
//! starts. Per-device failures are logged and skipped; the affected gauges
//! keep their last value until a later tick succeeds.

use crate::device::DeviceSource;
use crate::error::{Error, Result};
use crate::registry::{BoundDevice, DeviceRegistry, DEVICE_ID_LABEL};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Progress of the poll loop, readable from other tasks
#[derive(Debug, Default)]
pub struct PollState {
    /// Set once the initial poll has completed
    pub ready: AtomicBool,
    /// Completed poll cycles
    pub cycles: AtomicU64,
}

impl PollState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

/// Exporter self-metrics for the poll loop
#[derive(Clone)]
pub struct PollMetrics {
    cycles: IntCounter,
    status_errors: IntCounterVec,
    zero_samples: IntCounterVec,
}

impl PollMetrics {
    /// Create the counters and register them in `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let cycles = IntCounter::with_opts(Opts::new(
            "switchbot_exporter_poll_cycles_total",
            "Completed poll cycles",
        ))?;
        let status_errors = IntCounterVec::new(
            Opts::new(
                "switchbot_exporter_status_errors_total",
                "Failed device status requests",
            ),
            &[DEVICE_ID_LABEL],
        )?;
        let zero_samples = IntCounterVec::new(
            Opts::new(
                "switchbot_exporter_zero_samples_total",
                "Status samples discarded as all-zero glitches",
            ),
            &[DEVICE_ID_LABEL],
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(status_errors.clone()))?;
        registry.register(Box::new(zero_samples.clone()))?;

        Ok(Self {
            cycles,
            status_errors,
            zero_samples,
        })
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Devices whose gauges were written
    pub updated: usize,
    /// Devices whose status request failed
    pub failed: usize,
    /// Devices whose sample was discarded as a zero glitch
    pub discarded: usize,
}

/// Drives status polling for every device in a [`DeviceRegistry`]
pub struct PollLoop<S> {
    source: S,
    registry: DeviceRegistry,
    interval: Duration,
    state: Arc<PollState>,
    metrics: Option<PollMetrics>,
}

impl<S: DeviceSource> PollLoop<S> {
    /// Create a poll loop over `registry`; a zero interval is rejected
    pub fn new(source: S, registry: DeviceRegistry, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::config("poll interval must be positive"));
        }
        Ok(Self {
            source,
            registry,
            interval,
            state: Arc::new(PollState::default()),
            metrics: None,
        })
    }

    /// Record per-cycle and per-device counters in `metrics`
    pub fn with_metrics(mut self, metrics: PollMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Shared progress handle
    pub fn state(&self) -> Arc<PollState> {
        Arc::clone(&self.state)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Poll forever: once immediately, then every interval.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            devices = self.registry.len(),
            interval_secs = self.interval.as_secs(),
            "start collecting"
        );

        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            let report = self.poll_once().await;
            debug!(?report, "poll cycle complete");
        }
    }

    /// Poll every device once, sequentially.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();

        for bound in self.registry.devices() {
            self.poll_device(bound, &mut report).await;
        }

        if let Some(metrics) = &self.metrics {
            metrics.cycles.inc();
        }
        self.state.cycles.fetch_add(1, Ordering::SeqCst);
        self.state.ready.store(true, Ordering::SeqCst);

        report
    }

    async fn poll_device(&self, bound: &BoundDevice, report: &mut PollReport) {
        let device = bound.device();

        let sample = match self.source.status(&device.id).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(
                    device_id = %device.id,
                    device_name = %device.name,
                    error = %e,
                    "failed to update status"
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .status_errors
                        .with_label_values(&[device.id.as_str()])
                        .inc();
                }
                report.failed += 1;
                return;
            }
        };

        if device.kind.is_climate_sensor() && sample.is_zero_glitch() {
            warn!(
                device_id = %device.id,
                device_name = %device.name,
                "zero values reported, skipping update"
            );
            if let Some(metrics) = &self.metrics {
                metrics
                    .zero_samples
                    .with_label_values(&[device.id.as_str()])
                    .inc();
            }
            report.discarded += 1;
            return;
        }

        bound.apply(&sample);
        report.updated += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DiscoveredDevice, Metric, StatusSample};
    use crate::registry::GaugeBinder;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Device source answering from a mutable table; missing IDs fail
    #[derive(Default)]
    struct TableSource {
        samples: Mutex<HashMap<String, StatusSample>>,
    }

    impl TableSource {
        fn set(&self, id: &str, sample: StatusSample) {
            self.samples.lock().unwrap().insert(id.to_string(), sample);
        }

        fn remove(&self, id: &str) {
            self.samples.lock().unwrap().remove(id);
        }
    }

    #[async_trait]
    impl DeviceSource for TableSource {
        async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>> {
            Ok(Vec::new())
        }

        async fn status(&self, device_id: &str) -> Result<StatusSample> {
            self.samples
                .lock()
                .unwrap()
                .get(device_id)
                .copied()
                .ok_or_else(|| Error::DeviceApi {
                    code: 161,
                    message: "device offline".to_string(),
                })
        }
    }

    fn climate(temperature: f64, humidity: f64) -> StatusSample {
        StatusSample {
            temperature: Some(temperature),
            humidity: Some(humidity),
            ..Default::default()
        }
    }

    fn poll_loop(source: TableSource) -> PollLoop<TableSource> {
        let binder = GaugeBinder::new(Registry::new());
        let registry = DeviceRegistry::from_discovered(
            vec![
                DiscoveredDevice::new("M1", "Living", "Meter"),
                DiscoveredDevice::new("M2", "Bedroom", "Meter"),
                DiscoveredDevice::new("P1", "Heater", "Plug Mini (US)"),
            ],
            &binder,
        )
        .unwrap();
        PollLoop::new(source, registry, Duration::from_secs(60)).unwrap()
    }

    fn gauge(poller: &PollLoop<TableSource>, id: &str, metric: Metric) -> f64 {
        poller
            .registry()
            .get(id)
            .and_then(|d| d.binding(metric))
            .map(|b| b.value())
            .unwrap()
    }

    #[tokio::test]
    async fn test_poll_updates_all_devices() {
        let source = TableSource::default();
        source.set("M1", climate(21.0, 40.0));
        source.set("M2", climate(19.5, 55.0));
        source.set(
            "P1",
            StatusSample {
                voltage: Some(100.2),
                electric_current: Some(0.4),
                power: Some(38.0),
                electricity_minutes_today: Some(95.0),
                ..Default::default()
            },
        );

        let poller = poll_loop(source);
        let report = poller.poll_once().await;

        assert_eq!(report.updated, 3);
        assert_eq!(gauge(&poller, "M2", Metric::Humidity), 55.0);
        assert_eq!(gauge(&poller, "P1", Metric::Power), 38.0);
        assert!(poller.state().is_ready());
        assert_eq!(poller.state().cycles(), 1);
    }

    #[tokio::test]
    async fn test_failed_device_does_not_block_others() {
        let source = TableSource::default();
        source.set("M1", climate(21.0, 40.0));
        source.set("M2", climate(19.5, 55.0));

        let poller = poll_loop(source);
        poller.poll_once().await;

        poller.source.remove("M1");
        poller.source.set("M2", climate(20.5, 50.0));
        let report = poller.poll_once().await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(gauge(&poller, "M1", Metric::Temperature), 21.0);
        assert_eq!(gauge(&poller, "M2", Metric::Temperature), 20.5);
    }

    #[tokio::test]
    async fn test_zero_sample_keeps_previous_value() {
        let source = TableSource::default();
        source.set("M1", climate(23.4, 61.0));
        source.set("M2", climate(18.0, 45.0));

        let poller = poll_loop(source);
        poller.poll_once().await;

        poller.source.set("M1", climate(0.0, 0.0));
        let report = poller.poll_once().await;

        assert_eq!(report.discarded, 1);
        assert_eq!(gauge(&poller, "M1", Metric::Temperature), 23.4);
        assert_eq!(gauge(&poller, "M1", Metric::Humidity), 61.0);
    }

    #[tokio::test]
    async fn test_zero_power_is_not_a_glitch() {
        let source = TableSource::default();
        source.set(
            "P1",
            StatusSample {
                voltage: Some(0.0),
                electric_current: Some(0.0),
                power: Some(0.0),
                electricity_minutes_today: Some(0.0),
                ..Default::default()
            },
        );

        let poller = poll_loop(source);
        let report = poller.poll_once().await;

        assert_eq!(report.updated, 1);
        assert_eq!(report.discarded, 0);
    }

    #[tokio::test]
    async fn test_poll_metrics_counted() {
        let prom = Registry::new();
        let metrics = PollMetrics::register(&prom).unwrap();

        let source = TableSource::default();
        source.set("M1", climate(0.0, 0.0));
        let poller = poll_loop(source).with_metrics(metrics.clone());
        poller.poll_once().await;

        assert_eq!(metrics.cycles.get(), 1);
        assert_eq!(metrics.zero_samples.with_label_values(&["M1"]).get(), 1);
        assert_eq!(metrics.status_errors.with_label_values(&["M2"]).get(), 1);
        assert_eq!(metrics.status_errors.with_label_values(&["P1"]).get(), 1);
    }

    /// Device source counting status calls; always answers
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicU64,
    }

    impl CountingSource {
        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceSource for CountingSource {
        async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>> {
            Ok(Vec::new())
        }

        async fn status(&self, _device_id: &str) -> Result<StatusSample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(climate(21.0, 40.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_immediately_then_each_interval() {
        let source = Arc::new(CountingSource::default());
        let binder = GaugeBinder::new(Registry::new());
        let registry = DeviceRegistry::from_discovered(
            vec![DiscoveredDevice::new("M1", "Living", "Meter")],
            &binder,
        )
        .unwrap();
        let poller =
            PollLoop::new(Arc::clone(&source), registry, Duration::from_secs(60)).unwrap();
        let state = poller.state();
        let handle = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(state.is_ready());
        assert_eq!(source.calls(), 1);
        assert_eq!(state.cycles(), 1);

        // halfway through the first interval nothing more happens
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(state.cycles(), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 4);
        assert_eq!(state.cycles(), 4);

        handle.abort();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let binder = GaugeBinder::new(Registry::new());
        let registry = DeviceRegistry::from_discovered(Vec::<DiscoveredDevice>::new(), &binder).unwrap();
        let result = PollLoop::new(TableSource::default(), registry, Duration::ZERO);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
