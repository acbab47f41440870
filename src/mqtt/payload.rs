// Copyright 2026 Daniel Pelikan
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

//! Topic names and JSON bodies.

use serde::Serialize;

use crate::bluetooth::Measurement;
use crate::host::TelemetrySnapshot;

/// Object id Home Assistant gives every tracker entity.
const TRACKER_OBJECT_ID: &str = "bluetooth_tracker";

/// Broker-side id of a device: the address without colons, lower-cased.
pub fn device_id(address: &str) -> String {
    address.replace(':', "").to_lowercase()
}

/// Topic a device's readings are published on.
pub fn attributes_topic(address: &str) -> String {
    format!("{}/attributes", device_id(address))
}

/// Home Assistant registration topic for a device.
pub fn discovery_topic(address: &str) -> String {
    format!("homeassistant/device_tracker/{}/config", device_id(address))
}

/// Body of a reading. All values are strings on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributesPayload {
    pub voltage: String,
    pub temperature: String,
    pub tracker_battery: String,
    pub longitude: String,
    pub latitude: String,
}

impl AttributesPayload {
    pub fn new(measurement: &Measurement, telemetry: &TelemetrySnapshot) -> Self {
        Self {
            voltage: measurement.voltage_volts.to_string(),
            temperature: measurement.temperature_c.to_string(),
            tracker_battery: telemetry.battery_label(),
            longitude: telemetry.longitude.clone(),
            latitude: telemetry.latitude.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Body of a Home Assistant registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    pub json_attributes_topic: String,
    pub name: String,
    pub unique_id: String,
    pub object_id: String,
}

impl DiscoveryPayload {
    pub fn new(address: &str) -> Self {
        Self {
            json_attributes_topic: attributes_topic(address),
            name: address.to_string(),
            unique_id: device_id(address),
            object_id: TRACKER_OBJECT_ID.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{decode, encode, sensor::headers};

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    #[test]
    fn test_topics() {
        assert_eq!(device_id(ADDR), "aabbccddeeff");
        assert_eq!(attributes_topic(ADDR), "aabbccddeeff/attributes");
        assert_eq!(
            discovery_topic(ADDR),
            "homeassistant/device_tracker/aabbccddeeff/config"
        );
    }

    #[test]
    fn test_attributes_payload_is_all_strings() {
        let measurement = decode(ADDR, &encode(headers::MILLIVOLT, 12_600, 0, 0, 21, 70)).unwrap();
        let telemetry = TelemetrySnapshot {
            battery: Some(64),
            latitude: "45.46".to_string(),
            longitude: "N/A".to_string(),
        };

        let json = AttributesPayload::new(&measurement, &telemetry).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["voltage"], "12.6");
        assert_eq!(value["temperature"], "21");
        assert_eq!(value["tracker_battery"], "64");
        assert_eq!(value["latitude"], "45.46");
        assert_eq!(value["longitude"], "N/A");
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_discovery_payload() {
        let json = DiscoveryPayload::new(ADDR).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["json_attributes_topic"], "aabbccddeeff/attributes");
        assert_eq!(value["name"], ADDR);
        assert_eq!(value["unique_id"], "aabbccddeeff");
        assert_eq!(value["object_id"], "bluetooth_tracker");
    }
}
