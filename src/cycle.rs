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

//! One capture pass over the configured sensors.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{ClientSettings, ClientState, LinkConnector, SensorClient};
use crate::config::BluetoothConfig;
use crate::error::ErrorCategory;
use crate::events::BridgeEvent;
use crate::state::{AppState, CycleStatus, Severity};

/// Outcome counts of one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    /// Retrievals that ran through to a closed link.
    pub closed: usize,
    pub failed: usize,
}

/// Walks the device list, one retrieval at a time.
pub struct CaptureCycle {
    devices: Vec<String>,
    enabled: bool,
    connector: Arc<dyn LinkConnector>,
    settings: ClientSettings,
    event_tx: mpsc::Sender<BridgeEvent>,
    state: Arc<AppState>,
}

impl CaptureCycle {
    pub fn new(
        config: &BluetoothConfig,
        connector: Arc<dyn LinkConnector>,
        event_tx: mpsc::Sender<BridgeEvent>,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            devices: config.device_addresses(),
            enabled: config.enabled,
            connector,
            settings: ClientSettings::from(config),
            event_tx,
            state,
        }
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Retrieve from every device in order. The next device is only
    /// contacted once the previous retrieval has released its link.
    pub async fn run(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        if !self.enabled {
            warn!("Service disabled in settings");
            self.emit(BridgeEvent::log(
                "Service disabled in settings",
                Severity::Warning,
            ))
            .await;
            return report;
        }

        if self.devices.is_empty() {
            error!("No devices in settings");
            self.emit(BridgeEvent::Error {
                category: ErrorCategory::Configuration,
                message: "No devices in settings".to_string(),
            })
            .await;
            return report;
        }

        for address in &self.devices {
            if cancel.is_cancelled() {
                break;
            }

            report.attempted += 1;
            self.state.set_status(CycleStatus::Capturing {
                device: address.clone(),
            });
            info!("Capturing from {}", address);

            let client = SensorClient::new(
                address.clone(),
                self.connector.clone(),
                self.settings.clone(),
                self.event_tx.clone(),
            );

            match client.retrieve(cancel).await {
                Ok(handle) => match handle.wait().await {
                    ClientState::Closed => report.closed += 1,
                    state => {
                        debug!("{} ended in {}", address, state.as_str());
                        report.failed += 1;
                    }
                },
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    error!("{}", e);
                    self.emit(BridgeEvent::error(&e)).await;
                    report.failed += 1;
                }
            }
        }

        let status = if cancel.is_cancelled() {
            CycleStatus::Stopped
        } else {
            CycleStatus::Idle
        };
        self.state.set_status(status);

        debug!("Capture cycle done: {:?}", report);
        report
    }

    async fn emit(&self, event: BridgeEvent) {
        let _ = self.event_tx.send(event).await;
    }
}
