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

//! Publish with reconnect.
//!
//! A publish checks reachability once, then runs up to
//! [`RetryPolicy::attempts`] full connect, publish, disconnect sequences,
//! sleeping [`RetryPolicy::delay`] between them. A reading that still fails
//! is dropped.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::MqttConfig;
use crate::error::{Result, WatcherError};
use crate::network::NetworkProbe;

/// One open broker session.
#[async_trait]
pub trait BrokerSession: Send {
    /// Publish `payload` on `topic` and wait for the broker to accept it.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> AnyResult<()>;

    async fn disconnect(&mut self) -> AnyResult<()>;
}

/// Opens fresh, clean broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> AnyResult<Box<dyn BrokerSession>>;
}

/// Bound and spacing of publish attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Home Assistant registration: two tries, one second apart.
    pub fn discovery() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl From<&MqttConfig> for RetryPolicy {
    fn from(config: &MqttConfig) -> Self {
        Self::new(
            config.publish_attempts,
            Duration::from_secs(config.retry_delay_secs),
        )
    }
}

/// Delivers payloads to the broker.
pub struct Publisher {
    connector: Arc<dyn BrokerConnector>,
    probe: Arc<dyn NetworkProbe>,
    policy: RetryPolicy,
}

impl Publisher {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        probe: Arc<dyn NetworkProbe>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            probe,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Same connector and probe, different retry bound.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self::new(self.connector.clone(), self.probe.clone(), policy)
    }

    /// Publish one payload.
    ///
    /// Fails at once with [`WatcherError::NoNetworkAvailable`] when the
    /// network is down, without opening a session.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self.probe.is_reachable() {
            return Err(WatcherError::NoNetworkAvailable);
        }

        let attempts = self.policy.attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!("Retrying publish to {} in {:?}", topic, self.policy.delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(WatcherError::Cancelled),
                    _ = tokio::time::sleep(self.policy.delay) => {}
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(WatcherError::Cancelled),
                result = self.publish_once(topic, payload) => result,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "MQTT publish to {} failed (attempt {}/{}): {:#}",
                        topic, attempt, attempts, e
                    );
                    last_error = format!("{:#}", e);
                }
            }
        }

        error!("Reached maximum reconnect attempts. Data is now considered outdated.");
        Err(WatcherError::PublishExhausted {
            attempts,
            last_error,
        })
    }

    async fn publish_once(&self, topic: &str, payload: &[u8]) -> AnyResult<()> {
        let mut session = self.connector.connect().await?;
        let result = session.publish(topic, payload).await;

        if let Err(e) = session.disconnect().await {
            debug!("Error during MQTT client disconnect: {:#}", e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticProbe;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeBroker {
        connects: AtomicU32,
        fail_connects: u32,
        published: Mutex<Vec<(String, Vec<u8>)>>,
        disconnects: AtomicU32,
    }

    struct FakeSession(Arc<FakeBroker>);

    #[async_trait]
    impl BrokerSession for FakeSession {
        async fn publish(&mut self, topic: &str, payload: &[u8]) -> AnyResult<()> {
            self.0
                .published
                .lock()
                .push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        async fn disconnect(&mut self) -> AnyResult<()> {
            self.0.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeConnector(Arc<FakeBroker>);

    #[async_trait]
    impl BrokerConnector for FakeConnector {
        async fn connect(&self) -> AnyResult<Box<dyn BrokerSession>> {
            let n = self.0.connects.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.0.fail_connects {
                return Err(anyhow!("connection refused"));
            }
            Ok(Box::new(FakeSession(self.0.clone())))
        }
    }

    fn publisher(broker: &Arc<FakeBroker>, reachable: bool, attempts: u32) -> Publisher {
        Publisher::new(
            Arc::new(FakeConnector(broker.clone())),
            Arc::new(StaticProbe(reachable)),
            RetryPolicy::new(attempts, Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_publish_uses_fresh_session() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker, true, 3);
        let cancel = CancellationToken::new();

        publisher.publish("a/attributes", b"{}", &cancel).await.unwrap();
        publisher.publish("b/attributes", b"{}", &cancel).await.unwrap();

        assert_eq!(broker.connects.load(Ordering::SeqCst), 2);
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 2);
        assert_eq!(broker.published.lock()[1].0, "b/attributes");
    }

    #[tokio::test]
    async fn test_no_network_never_connects() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker, false, 3);

        let err = publisher
            .publish("a/attributes", b"{}", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WatcherError::NoNetworkAvailable));
        assert_eq!(broker.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let broker = Arc::new(FakeBroker {
            fail_connects: 2,
            ..Default::default()
        });
        let publisher = publisher(&broker, true, 3);

        publisher
            .publish("a/attributes", b"{}", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(broker.connects.load(Ordering::SeqCst), 3);
        assert_eq!(broker.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_after_bound() {
        let broker = Arc::new(FakeBroker {
            fail_connects: u32::MAX,
            ..Default::default()
        });
        let publisher = publisher(&broker, true, 2);

        let err = publisher
            .publish("a/attributes", b"{}", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            WatcherError::PublishExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(broker.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let broker = Arc::new(FakeBroker {
            fail_connects: u32::MAX,
            ..Default::default()
        });
        let publisher = Publisher::new(
            Arc::new(FakeConnector(broker.clone())),
            Arc::new(StaticProbe(true)),
            RetryPolicy::new(3, Duration::from_secs(60)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = publisher.publish("a/attributes", b"{}", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(broker.connects.load(Ordering::SeqCst), 1);
    }
}
