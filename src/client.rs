// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! SwitchBot Open API client (v1.1)
//!
//! Every request is signed with the account token and secret:
//! `sign = base64(HMAC-SHA256(secret, token + t + nonce))` where `t` is the
//! Unix time in milliseconds and `nonce` a random UUID.

use crate::device::{DeviceSource, DiscoveredDevice, StatusSample};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "https://api.switch-bot.com";

/// Status code of a successful API response
const STATUS_SUCCESS: i64 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

/// Compute the `sign` header for a request
pub fn sign(token: &str, secret: &str, t: i64, nonce: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::config("invalid secret key"))?;
    mac.update(token.as_bytes());
    mac.update(t.to_string().as_bytes());
    mac.update(nonce.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Common response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "statusCode")]
    status_code: i64,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

impl<T> Envelope<T> {
    fn into_body(self) -> Result<T> {
        match (self.status_code, self.body) {
            (STATUS_SUCCESS, Some(body)) => Ok(body),
            (code, _) => Err(Error::DeviceApi {
                code,
                message: self.message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceListBody {
    #[serde(default)]
    device_list: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceEntry {
    device_id: String,
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    device_type: String,
}

impl From<DeviceEntry> for DiscoveredDevice {
    fn from(entry: DeviceEntry) -> Self {
        DiscoveredDevice::new(entry.device_id, entry.device_name, entry.device_type)
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    temperature: Option<f64>,
    humidity: Option<f64>,
    #[serde(rename = "CO2")]
    co2: Option<f64>,
    voltage: Option<f64>,
    #[serde(rename = "electricCurrent")]
    electric_current: Option<f64>,
    /// Power in watts
    weight: Option<f64>,
    #[serde(rename = "electricityOfDay")]
    electricity_of_day: Option<f64>,
}

impl From<StatusBody> for StatusSample {
    fn from(body: StatusBody) -> Self {
        StatusSample {
            temperature: body.temperature,
            humidity: body.humidity,
            co2: body.co2,
            voltage: body.voltage,
            electric_current: body.electric_current,
            power: body.weight,
            electricity_minutes_today: body.electricity_of_day,
        }
    }
}

/// HTTP client for the SwitchBot Open API
#[derive(Debug, Clone)]
pub struct SwitchBotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    secret: String,
}

impl SwitchBotClient {
    /// Create a client for the public API
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::DeviceHttp)?;
        Ok(Self {
            http,
            base_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            secret: secret.into(),
        })
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let t = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().to_string();
        let signature = sign(&self.token, &self.secret, t, &nonce)?;
        let url = format!("{}{}", self.base_url, path);

        debug!(%url, "device API request");
        let envelope: Envelope<T> = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.token)
            .header("t", t.to_string())
            .header("nonce", nonce)
            .header("sign", signature)
            .send()
            .await
            .map_err(Error::DeviceHttp)?
            .error_for_status()
            .map_err(Error::DeviceHttp)?
            .json()
            .await
            .map_err(Error::DeviceHttp)?;

        envelope.into_body()
    }
}

#[async_trait]
impl DeviceSource for SwitchBotClient {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let body: DeviceListBody = self.get("/v1.1/devices").await?;
        Ok(body.device_list.into_iter().map(Into::into).collect())
    }

    async fn status(&self, device_id: &str) -> Result<StatusSample> {
        let body: StatusBody = self
            .get(&format!("/v1.1/devices/{}/status", device_id))
            .await?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("token", "secret", 1_700_000_000_000, "nonce").unwrap();
        let b = sign("token", "secret", 1_700_000_000_000, "nonce").unwrap();
        let c = sign("token", "secret", 1_700_000_000_001, "nonce").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32-byte digest, base64 padded
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_decode_device_list() {
        let json = r#"{
            "statusCode": 100,
            "message": "success",
            "body": {
                "deviceList": [
                    {"deviceId": "C271111EC0AB", "deviceName": "Meter 0A", "deviceType": "Meter", "hubDeviceId": "E0"},
                    {"deviceId": "6055F92FCFD2", "deviceName": "Plug", "deviceType": "Plug Mini (JP)"}
                ],
                "infraredRemoteList": []
            }
        }"#;
        let envelope: Envelope<DeviceListBody> = serde_json::from_str(json).unwrap();
        let devices: Vec<DiscoveredDevice> = envelope
            .into_body()
            .unwrap()
            .device_list
            .into_iter()
            .map(Into::into)
            .collect();

        assert_eq!(devices.len(), 2);
        assert_eq!(
            devices[0],
            DiscoveredDevice::new("C271111EC0AB", "Meter 0A", "Meter")
        );
        assert_eq!(devices[1].device_type, "Plug Mini (JP)");
    }

    #[test]
    fn test_decode_status() {
        let json = r#"{
            "statusCode": 100,
            "message": "success",
            "body": {"deviceId": "C1", "deviceType": "MeterPro(CO2)", "temperature": 22.3, "humidity": 41, "CO2": 812, "battery": 100}
        }"#;
        let envelope: Envelope<StatusBody> = serde_json::from_str(json).unwrap();
        let sample: StatusSample = envelope.into_body().unwrap().into();

        assert_eq!(sample.temperature, Some(22.3));
        assert_eq!(sample.humidity, Some(41.0));
        assert_eq!(sample.co2, Some(812.0));
        assert_eq!(sample.power, None);
    }

    #[test]
    fn test_decode_plug_status() {
        let json = r#"{
            "statusCode": 100,
            "body": {"voltage": 101.3, "weight": 12.5, "electricityOfDay": 320, "electricCurrent": 0.12}
        }"#;
        let envelope: Envelope<StatusBody> = serde_json::from_str(json).unwrap();
        let sample: StatusSample = envelope.into_body().unwrap().into();

        assert_eq!(sample.power, Some(12.5));
        assert_eq!(sample.electricity_minutes_today, Some(320.0));
        assert_eq!(sample.electric_current, Some(0.12));
    }

    #[test]
    fn test_api_error_status() {
        let json = r#"{"statusCode": 190, "message": "device internal error", "body": {}}"#;
        let envelope: Envelope<StatusBody> = serde_json::from_str(json).unwrap();
        match envelope.into_body() {
            Err(Error::DeviceApi { code, message }) => {
                assert_eq!(code, 190);
                assert_eq!(message, "device internal error");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = SwitchBotClient::new("t", "s")
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
