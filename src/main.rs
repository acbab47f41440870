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

//! Voltwatcher Bridge daemon

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voltwatcher_bridge::bluetooth::{LinkConnector, RfcommConnector, SimulatedConnector};
use voltwatcher_bridge::config::Config;
use voltwatcher_bridge::cycle::CaptureCycle;
use voltwatcher_bridge::error::ErrorCategory;
use voltwatcher_bridge::events::{run_processor, BridgeEvent, EventProcessor, LogCapture};
use voltwatcher_bridge::host::HostTelemetry;
use voltwatcher_bridge::mqtt::{announce_devices, Publisher, RetryPolicy, RumqttcConnector};
use voltwatcher_bridge::network::RouteTableProbe;
use voltwatcher_bridge::scheduler::start_periodic;
use voltwatcher_bridge::state::{AppState, CycleStatus};
use voltwatcher_bridge::storage::{LogSink, LogStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voltwatcher_bridge=info".parse()?),
        )
        .init();

    info!(
        "Starting Voltwatcher Bridge v{}...",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize log storage
    let sink: Option<Arc<dyn LogSink>> = if config.log.persist {
        let store = LogStore::new(&config.data_dir)?;
        info!("Log storage initialized");
        Some(Arc::new(store))
    } else {
        None
    };

    // Create application state
    let state = AppState::new(config.log.recent_capacity);
    let log = LogCapture::new(state.clone(), sink);

    for problem in config.problems() {
        warn!("{}", problem);
        log.capture_error(ErrorCategory::Configuration, problem);
    }

    let cancel = CancellationToken::new();

    // Sensor transport
    let connector: Arc<dyn LinkConnector> = if config.bluetooth.simulate {
        info!("Using simulated sensors");
        Arc::new(SimulatedConnector)
    } else {
        let connector = RfcommConnector::new(config.bluetooth.channel)
            .await
            .context("Failed to open Bluetooth adapter")?;
        Arc::new(connector)
    };

    // Broker
    let publisher = if config.mqtt.is_configured() {
        let publisher = Publisher::new(
            Arc::new(RumqttcConnector::new(config.mqtt.clone())),
            Arc::new(RouteTableProbe::new()),
            RetryPolicy::from(&config.mqtt),
        );
        info!(
            "Publishing to {}:{} as '{}'",
            config.mqtt.host, config.mqtt.port, config.mqtt.client_id
        );
        Some(Arc::new(publisher))
    } else {
        None
    };

    if let (Some(publisher), true) = (&publisher, config.mqtt.discovery) {
        let discovery = publisher.with_policy(RetryPolicy::discovery());
        let devices = config.bluetooth.device_addresses();
        let token = cancel.clone();
        tokio::spawn(async move {
            let announced = announce_devices(&discovery, &devices, &token).await;
            info!("Registered {}/{} devices", announced, devices.len());
        });
    }

    // Event processing
    let (event_tx, event_rx) = mpsc::channel::<BridgeEvent>(32);
    let processor = EventProcessor::new(
        state.clone(),
        log.clone(),
        publisher,
        HostTelemetry::new(config.location.clone()),
        cancel.clone(),
    );
    let processor_task = tokio::spawn(run_processor(processor, event_rx, cancel.clone()));

    // Periodic capture
    let cycle = Arc::new(CaptureCycle::new(
        &config.bluetooth,
        connector,
        event_tx,
        state.clone(),
    ));
    let period = Duration::from_secs(config.bluetooth.poll_interval_secs.max(1));
    let capture = start_periodic(period, &cancel, move |token| {
        let cycle = cycle.clone();
        async move {
            cycle.run(&token).await;
        }
    });

    info!("Ready. Capturing every {:?}", period);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    cancel.cancel();
    capture.stop().await;
    if let Err(e) = processor_task.await {
        error!("Event processor failed: {}", e);
    }
    state.set_status(CycleStatus::Stopped);
    log.flush().await;

    info!("Voltwatcher Bridge stopped");
    Ok(())
}
