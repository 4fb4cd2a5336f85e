//! Sensor records shared by the stores, the service and the HTTP layer.

use crate::error::{RegistryError, Result};
use crate::geo::{is_valid_latitude, is_valid_longitude, GeoPoint};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Existence record owned by the identity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub id: i64,
    pub name: String,
}

/// Payload accepted when registering a sensor
#[derive(Debug, Clone, Deserialize)]
pub struct SensorCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub mac_address: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl SensorCreate {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("type", &self.sensor_type),
            ("mac_address", &self.mac_address),
            ("manufacturer", &self.manufacturer),
            ("model", &self.model),
            ("serial_number", &self.serial_number),
            ("firmware_version", &self.firmware_version),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(RegistryError::validation(field, "must not be empty"));
            }
        }

        if !is_valid_mac_address(&self.mac_address) {
            return Err(RegistryError::validation(
                "mac_address",
                format!("'{}' is not a MAC address", self.mac_address),
            ));
        }
        if !is_valid_latitude(self.latitude) {
            return Err(RegistryError::validation(
                "latitude",
                "must be between -90 and 90",
            ));
        }
        if !is_valid_longitude(self.longitude) {
            return Err(RegistryError::validation(
                "longitude",
                "must be between -180 and 180",
            ));
        }

        Ok(())
    }

    /// Build the geo document for the identity the identity store assigned
    pub fn into_geo_document(self, id: i64) -> SensorGeoDocument {
        SensorGeoDocument {
            id,
            location: GeoPoint::new(self.latitude, self.longitude),
            name: self.name,
            sensor_type: self.sensor_type,
            mac_address: self.mac_address,
            manufacturer: self.manufacturer,
            model: self.model,
            serial_number: self.serial_number,
            firmware_version: self.firmware_version,
        }
    }
}

/// Location and static metadata owned by the geo store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorGeoDocument {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub mac_address: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub location: GeoPoint,
}

/// Telemetry report body; the sensor id comes from the route
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryReport {
    pub temperature: f64,
    pub humidity: f64,
    pub battery_level: f64,
    pub velocity: f64,
    pub last_seen: DateTime<Utc>,
}

impl TelemetryReport {
    pub fn validate(&self) -> Result<()> {
        let readings = [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("battery_level", self.battery_level),
            ("velocity", self.velocity),
        ];
        for (field, value) in readings {
            if !value.is_finite() {
                return Err(RegistryError::validation(field, "must be a finite number"));
            }
        }

        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(RegistryError::validation("humidity", "must be between 0 and 100"));
        }
        if !(0.0..=100.0).contains(&self.battery_level) {
            return Err(RegistryError::validation(
                "battery_level",
                "must be between 0 and 100",
            ));
        }
        if self.velocity < 0.0 {
            return Err(RegistryError::validation("velocity", "must not be negative"));
        }

        Ok(())
    }

    pub fn into_snapshot(self, sensor_id: i64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            sensor_id,
            temperature: self.temperature,
            humidity: self.humidity,
            battery_level: self.battery_level,
            velocity: self.velocity,
            last_seen: self.last_seen,
        }
    }
}

/// Latest readings for one sensor, replaced wholesale on every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub sensor_id: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_level: f64,
    pub velocity: f64,
    pub last_seen: DateTime<Utc>,
}

/// Geo document merged with its telemetry.
///
/// Telemetry fields are `None` for sensors that never reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedSensor {
    #[serde(flatten)]
    pub sensor: SensorGeoDocument,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery_level: Option<f64>,
    pub velocity: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl EnrichedSensor {
    pub fn merge(sensor: SensorGeoDocument, telemetry: Option<&TelemetrySnapshot>) -> Self {
        Self {
            sensor,
            temperature: telemetry.map(|t| t.temperature),
            humidity: telemetry.map(|t| t.humidity),
            battery_level: telemetry.map(|t| t.battery_level),
            velocity: telemetry.map(|t| t.velocity),
            last_seen: telemetry.map(|t| t.last_seen),
        }
    }
}

fn is_valid_mac_address(mac: &str) -> bool {
    static MAC_PATTERN: OnceLock<Regex> = OnceLock::new();

    let re = MAC_PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{2}(?:(?::[0-9A-Fa-f]{2}){5}|(?:-[0-9A-Fa-f]{2}){5})$")
            .expect("MAC address pattern is valid")
    });
    re.is_match(mac)
}
