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

//! Broker sessions over rumqttc.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, trace, warn};

use super::publisher::{BrokerConnector, BrokerSession};
use crate::config::MqttConfig;

/// Requests buffered between the client handle and its event loop.
const REQUEST_CAPACITY: usize = 10;

/// Shortest keep-alive rumqttc accepts; smaller values panic in `set_keep_alive`.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Opens clean sessions against the configured broker.
pub struct RumqttcConnector {
    config: MqttConfig,
    /// All sessions share one client id, and a broker drops the older of two
    /// sessions with the same id, so only one session is open at a time.
    gate: Arc<Mutex<()>>,
}

impl RumqttcConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            gate: Arc::new(Mutex::new(())),
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        let keep_alive = self.config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS);
        if keep_alive != self.config.keep_alive_secs {
            warn!(
                "MQTT keep-alive {}s is below the minimum, using {}s",
                self.config.keep_alive_secs, keep_alive
            );
        }
        options.set_keep_alive(Duration::from_secs(keep_alive));
        options.set_clean_session(true);

        if !self.config.username.is_empty() {
            options.set_credentials(
                self.config.username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }

        options
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.connect_timeout_secs)
    }
}

#[async_trait]
impl BrokerConnector for RumqttcConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>> {
        let gate = self.gate.clone().lock_owned().await;
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        let timeout = self.timeout();
        tokio::time::timeout(
            timeout,
            poll_until(&mut eventloop, |event| {
                matches!(event, Event::Incoming(Packet::ConnAck(_)))
            }),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "MQTT connect to {}:{} timed out after {:?}",
                self.config.host,
                self.config.port,
                timeout
            )
        })??;

        info!("Connected to MQTT broker {}:{}", self.config.host, self.config.port);

        Ok(Box::new(RumqttcSession {
            client,
            eventloop,
            timeout,
            _gate: gate,
        }))
    }
}

/// One connected client and the event loop driving it.
pub struct RumqttcSession {
    client: AsyncClient,
    eventloop: EventLoop,
    timeout: Duration,
    _gate: OwnedMutexGuard<()>,
}

#[async_trait]
impl BrokerSession for RumqttcSession {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;

        tokio::time::timeout(
            self.timeout,
            poll_until(&mut self.eventloop, |event| {
                matches!(event, Event::Incoming(Packet::PubAck(_)))
            }),
        )
        .await
        .map_err(|_| anyhow!("No PUBACK for {} after {:?}", topic, self.timeout))??;

        debug!("Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect().await?;

        // The loop errors out once the socket is closed, which is fine here.
        let flushed = tokio::time::timeout(
            self.timeout,
            poll_until(&mut self.eventloop, |event| {
                matches!(event, Event::Outgoing(Outgoing::Disconnect))
            }),
        )
        .await;

        match flushed {
            Ok(_) => Ok(()),
            Err(_) => Err(anyhow!("Disconnect not flushed after {:?}", self.timeout)),
        }
    }
}

/// Drive the event loop until `done` matches an event.
async fn poll_until(eventloop: &mut EventLoop, done: impl Fn(&Event) -> bool) -> Result<()> {
    loop {
        let event = eventloop.poll().await?;
        trace!("MQTT event: {:?}", event);
        if done(&event) {
            return Ok(());
        }
    }
}
