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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bluetooth::sensor::DEFAULT_RFCOMM_CHANNEL;

/// Directory name under the platform config and data dirs.
const APP_DIR: &str = "voltwatcher-bridge";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the log database.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Sensor settings.
    pub bluetooth: BluetoothConfig,

    /// Broker settings.
    pub mqtt: MqttConfig,

    /// Static location reported with every reading.
    pub location: LocationConfig,

    /// Human-facing log settings.
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Comma-separated sensor addresses.
    pub devices: String,

    /// Master switch for the capture loop.
    pub enabled: bool,

    /// Seconds between capture cycles.
    pub poll_interval_secs: u64,

    /// RFCOMM channel of the sensor's serial port service.
    pub channel: u8,

    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub command_delay_ms: u64,
    pub listen_timeout_secs: u64,

    /// Use generated frames instead of a real adapter.
    pub simulate: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            devices: String::new(),
            enabled: true,
            poll_interval_secs: 90,
            channel: DEFAULT_RFCOMM_CHANNEL,
            connect_attempts: 2,
            connect_retry_delay_ms: 1000,
            connect_timeout_secs: 10,
            command_delay_ms: 100,
            listen_timeout_secs: 15,
            simulate: false,
        }
    }
}

impl BluetoothConfig {
    /// Parsed device list: trimmed, empty entries dropped, order kept.
    pub fn device_addresses(&self) -> Vec<String> {
        self.devices
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address. Empty disables publishing.
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub client_id: String,

    /// Total publish attempts per reading, first one included.
    pub publish_attempts: u32,
    pub retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub keep_alive_secs: u64,

    /// Register devices with Home Assistant on start.
    pub discovery: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            username: String::new(),
            password: None,
            client_id: "bluetooth_watcher".to_string(),
            publish_attempts: 3,
            retry_delay_secs: 5,
            connect_timeout_secs: 7,
            keep_alive_secs: 10,
            discovery: true,
        }
    }
}

impl MqttConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: String,
    pub longitude: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: "N/A".to_string(),
            longitude: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Entries kept in the in-memory recent list.
    pub recent_capacity: usize,

    /// Also write entries to the SQLite log.
    pub persist: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 16,
            persist: true,
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self::load_from(&config_dir.join("config.toml"), data_dir)
    }

    /// Load from `config_path`, writing defaults there when it does not exist.
    pub fn load_from(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(config_path, content)?;
            config
        };

        config.data_dir = data_dir;
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Save configuration to file.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Problems that disable part of the bridge. None of them is fatal.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if !self.mqtt.is_configured() {
            problems.push("No mqtt url in settings");
        }
        if self.bluetooth.device_addresses().is_empty() {
            problems.push("No devices in settings");
        }
        problems
    }
}
