// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device model
//!
//! Devices are discovered once through a [`DeviceSource`], classified into a
//! [`CapabilityKind`], and never change afterwards. The kind decides which
//! [`Metric`]s apply to a device.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A device as reported by the device listing, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Vendor device ID
    pub id: String,
    /// User-assigned device name
    pub name: String,
    /// Raw vendor type identifier (e.g. "Meter", "Plug Mini (JP)")
    pub device_type: String,
}

impl DiscoveredDevice {
    /// Create a new discovered device
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
        }
    }
}

/// Capability classification of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Temperature/humidity sensor
    TempHumidity,
    /// Temperature/humidity/CO2 sensor
    TempHumidityCo2,
    /// Power-monitoring plug
    PowerPlug,
    /// Type identifier not known to this build; carries the raw identifier
    Unrecognized(String),
}

impl CapabilityKind {
    /// Classify a vendor type identifier
    pub fn from_device_type(device_type: &str) -> Self {
        match device_type {
            "Meter" | "MeterPlus" | "MeterPro" | "WoIOSensor" | "Hub 2" => Self::TempHumidity,
            "MeterPro(CO2)" => Self::TempHumidityCo2,
            "Plug Mini (US)" | "Plug Mini (JP)" => Self::PowerPlug,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Fixed metric set for this kind
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            Self::TempHumidity => &[Metric::Temperature, Metric::Humidity],
            Self::TempHumidityCo2 => &[Metric::Temperature, Metric::Humidity, Metric::Co2],
            Self::PowerPlug => &[
                Metric::Voltage,
                Metric::ElectricCurrent,
                Metric::Power,
                Metric::ElectricityMinutesToday,
            ],
            Self::Unrecognized(_) => &[],
        }
    }

    /// Whether this kind reports temperature and humidity
    pub fn is_climate_sensor(&self) -> bool {
        matches!(self, Self::TempHumidity | Self::TempHumidityCo2)
    }

    /// Whether the kind is known to this build
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// A classified device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: CapabilityKind,
}

impl Device {
    /// Classify a discovered device
    pub fn classify(discovered: DiscoveredDevice) -> Self {
        let kind = CapabilityKind::from_device_type(&discovered.device_type);
        Self {
            id: discovered.id,
            name: discovered.name,
            kind,
        }
    }
}

/// Metrics a device can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Temperature,
    Humidity,
    Co2,
    Voltage,
    ElectricCurrent,
    Power,
    ElectricityMinutesToday,
}

impl Metric {
    /// Exposed series name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "switchbot_temperature",
            Self::Humidity => "switchbot_humidity",
            Self::Co2 => "switchbot_co2",
            Self::Voltage => "switchbot_voltage",
            Self::ElectricCurrent => "switchbot_electric_current",
            Self::Power => "switchbot_power",
            Self::ElectricityMinutesToday => "switchbot_electricity_minutes_today",
        }
    }

    /// Help text for the exposed series
    pub fn help(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature in degrees Celsius",
            Self::Humidity => "Relative humidity in percent",
            Self::Co2 => "CO2 concentration in ppm",
            Self::Voltage => "Supply voltage in volts",
            Self::ElectricCurrent => "Electric current drawn by the plug",
            Self::Power => "Power drawn by the plug in watts",
            Self::ElectricityMinutesToday => "Minutes the plug has been powered today",
        }
    }
}

/// One status reading for one device; fields absent from the response are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusSample {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub voltage: Option<f64>,
    pub electric_current: Option<f64>,
    pub power: Option<f64>,
    pub electricity_minutes_today: Option<f64>,
}

impl StatusSample {
    /// Reading for a metric, if the response carried it
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Co2 => self.co2,
            Metric::Voltage => self.voltage,
            Metric::ElectricCurrent => self.electric_current,
            Metric::Power => self.power,
            Metric::ElectricityMinutesToday => self.electricity_minutes_today,
        }
    }

    /// The API sometimes answers with zero temperature and humidity.
    /// Such samples are discarded; an absent field counts as zero.
    pub fn is_zero_glitch(&self) -> bool {
        self.temperature.unwrap_or(0.0) == 0.0 && self.humidity.unwrap_or(0.0) == 0.0
    }
}

/// Source of device listings and per-device status readings
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// List every device visible to the account
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Fetch the current status of one device
    async fn status(&self, device_id: &str) -> Result<StatusSample>;
}

#[async_trait]
impl<T: DeviceSource + ?Sized> DeviceSource for Arc<T> {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        (**self).list_devices().await
    }

    async fn status(&self, device_id: &str) -> Result<StatusSample> {
        (**self).status(device_id).await
    }
}
