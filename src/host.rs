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

//! Host telemetry attached to every published reading.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::LocationConfig;

/// Reported when a value is unknown.
pub const NOT_AVAILABLE: &str = "N/A";

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Battery level of the first `Battery` supply under `dir`, in percent.
pub fn battery_percentage_in(dir: &Path) -> Option<u8> {
    let mut supplies: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    supplies.sort();

    for supply in supplies {
        let kind = fs::read_to_string(supply.join("type")).unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }
        match fs::read_to_string(supply.join("capacity")) {
            Ok(raw) => match raw.trim().parse::<u8>() {
                Ok(pct) => return Some(pct.min(100)),
                Err(e) => debug!("Bad capacity in {:?}: {}", supply, e),
            },
            Err(e) => debug!("No capacity for {:?}: {}", supply, e),
        }
    }

    None
}

/// Battery level of this machine, if it has one.
pub fn battery_percentage() -> Option<u8> {
    battery_percentage_in(Path::new(POWER_SUPPLY_DIR))
}

/// Values sampled at publish time.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub battery: Option<u8>,
    pub latitude: String,
    pub longitude: String,
}

impl TelemetrySnapshot {
    pub fn battery_label(&self) -> String {
        self.battery
            .map(|pct| pct.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Source of [`TelemetrySnapshot`]s.
#[derive(Debug, Clone)]
pub struct HostTelemetry {
    power_supply_dir: PathBuf,
    location: LocationConfig,
}

impl HostTelemetry {
    pub fn new(location: LocationConfig) -> Self {
        Self::with_power_supply_dir(location, PathBuf::from(POWER_SUPPLY_DIR))
    }

    pub fn with_power_supply_dir(location: LocationConfig, power_supply_dir: PathBuf) -> Self {
        Self {
            power_supply_dir,
            location,
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            battery: battery_percentage_in(&self.power_supply_dir),
            latitude: or_not_available(&self.location.latitude),
            longitude: or_not_available(&self.location.longitude),
        }
    }
}

fn or_not_available(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn supply(dir: &Path, name: &str, kind: &str, capacity: Option<&str>) {
        let path = dir.join(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("type"), format!("{}\n", kind)).unwrap();
        if let Some(capacity) = capacity {
            fs::write(path.join("capacity"), format!("{}\n", capacity)).unwrap();
        }
    }

    #[test]
    fn test_battery_found() {
        let dir = tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", None);
        supply(dir.path(), "BAT0", "Battery", Some("87"));

        assert_eq!(battery_percentage_in(dir.path()), Some(87));
    }

    #[test]
    fn test_no_battery() {
        let dir = tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", None);

        assert_eq!(battery_percentage_in(dir.path()), None);
        assert_eq!(battery_percentage_in(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_snapshot_labels() {
        let dir = tempdir().unwrap();
        let location = LocationConfig {
            latitude: "45.46".to_string(),
            longitude: String::new(),
        };
        let snapshot =
            HostTelemetry::with_power_supply_dir(location, dir.path().to_path_buf()).snapshot();

        assert_eq!(snapshot.battery_label(), "N/A");
        assert_eq!(snapshot.latitude, "45.46");
        assert_eq!(snapshot.longitude, "N/A");
    }
}
