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

//! Sensor client: one connect, configure, listen, decode, close cycle.
//!
//! ```text
//! Idle -> Connecting -> Connected -> Listening -> FrameComplete -> Closed
//!             |                          |
//!             +--------> Failed <--------+
//! ```
//!
//! Connecting happens in the caller's task. Listening runs on its own task;
//! completion is signalled by the emitted [`BridgeEvent`], and the returned
//! [`ListenHandle`] lets the caller request a close or wait for teardown.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::frame::{decode, FrameAccumulator};
use super::link::{LinkConnector, SensorLink};
use super::sensor::{commands, FRAME_LENGTH};
use crate::config::BluetoothConfig;
use crate::error::{Result, WatcherError};
use crate::events::BridgeEvent;

/// Lifecycle state of a [`SensorClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Listening,
    FrameComplete,
    Closed,
    Failed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Idle => "Idle",
            ClientState::Connecting => "Connecting...",
            ClientState::Connected => "Connected",
            ClientState::Listening => "Listening",
            ClientState::FrameComplete => "Frame complete",
            ClientState::Closed => "Closed",
            ClientState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientState::Closed | ClientState::Failed)
    }
}

/// Timing and retry settings for one retrieval.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Physical connect attempts, inclusive.
    pub connect_attempts: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    /// Pause before each command byte.
    pub command_delay: Duration,
    /// Give up listening when no full frame arrived in this time.
    pub listen_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_attempts: 2,
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            command_delay: Duration::from_millis(100),
            listen_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&BluetoothConfig> for ClientSettings {
    fn from(config: &BluetoothConfig) -> Self {
        Self {
            connect_attempts: config.connect_attempts,
            retry_delay: Duration::from_millis(config.connect_retry_delay_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            command_delay: Duration::from_millis(config.command_delay_ms),
            listen_timeout: Duration::from_secs(config.listen_timeout_secs),
        }
    }
}

/// Handle to a running listen worker.
pub struct ListenHandle {
    close: CancellationToken,
    join: JoinHandle<ClientState>,
}

impl ListenHandle {
    /// Ask the worker to stop listening and release the link.
    pub fn request_close(&self) {
        self.close.cancel();
    }

    /// Wait for the worker to tear down. Returns the final state.
    pub async fn wait(self) -> ClientState {
        match self.join.await {
            Ok(state) => state,
            Err(e) => {
                error!("Listen worker failed: {}", e);
                ClientState::Failed
            }
        }
    }
}

/// Client for a single sensor address.
pub struct SensorClient {
    address: String,
    connector: Arc<dyn LinkConnector>,
    settings: ClientSettings,
    event_tx: mpsc::Sender<BridgeEvent>,
    state: watch::Sender<ClientState>,
}

impl SensorClient {
    pub fn new(
        address: impl Into<String>,
        connector: Arc<dyn LinkConnector>,
        settings: ClientSettings,
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        Self {
            address: address.into(),
            connector,
            settings,
            event_tx,
            state,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ClientState) {
        debug!("{}: {}", self.address, state.as_str());
        self.state.send_replace(state);
    }

    /// Emit an event.
    async fn emit(&self, event: BridgeEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Connect, configure the sensor and start the listen worker.
    ///
    /// Returns once the worker is running. Cancelling `cancel` aborts
    /// connecting and also closes the worker.
    pub async fn retrieve(self, cancel: &CancellationToken) -> Result<ListenHandle> {
        let mut link = match self.open(cancel).await {
            Ok(link) => link,
            Err(e) => {
                self.set_state(ClientState::Failed);
                return Err(e);
            }
        };

        if let Err(e) = self.configure(link.as_mut(), cancel).await {
            release(&self.address, link.as_mut()).await;
            self.set_state(ClientState::Closed);
            return Err(e);
        }

        let close = cancel.child_token();
        let worker_close = close.clone();
        let join = tokio::spawn(async move { self.listen(link, worker_close).await });

        Ok(ListenHandle { close, join })
    }

    async fn open(&self, cancel: &CancellationToken) -> Result<Box<dyn SensorLink>> {
        if !self.connector.is_enabled().await {
            return Err(WatcherError::BluetoothNotEnabled);
        }

        self.set_state(ClientState::Connecting);
        let attempts = self.settings.connect_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Connecting to {} (attempt {})", self.address, attempt);

            let connect = tokio::time::timeout(
                self.settings.connect_timeout,
                self.connector.connect(&self.address),
            );
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(WatcherError::Cancelled),
                result = connect => result.unwrap_or_else(|_| {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
                }),
            };

            match result {
                Ok(link) => {
                    info!("Connected to {}", self.address);
                    self.set_state(ClientState::Connected);
                    return Ok(link);
                }
                Err(e) => {
                    error!(
                        "Error during connection to {} (attempt {}): {}",
                        self.address, attempt, e
                    );
                    if attempt >= attempts {
                        return Err(WatcherError::ConnectExhausted {
                            address: self.address.clone(),
                            attempts,
                            source: e,
                        });
                    }
                    pause(self.settings.retry_delay, cancel).await?;
                }
            }
        }
    }

    /// Send the setup commands followed by the data dump request.
    async fn configure(
        &self,
        link: &mut dyn SensorLink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for (command, name) in commands::SETUP {
            pause(self.settings.command_delay, cancel).await?;
            send_command(link, command, name).await;
        }

        pause(self.settings.command_delay, cancel).await?;
        debug!("Requesting data from {}...", self.address);
        send_command(link, commands::DATA_DUMP, "dataDump").await;
        Ok(())
    }

    async fn listen(self, mut link: Box<dyn SensorLink>, close: CancellationToken) -> ClientState {
        self.set_state(ClientState::Listening);

        let outcome = match self.read_frame(link.as_mut(), &close).await {
            Ok(frame) => {
                self.set_state(ClientState::FrameComplete);
                match decode(&self.address, &frame) {
                    Ok(measurement) => self.emit(BridgeEvent::DataRetrieved(measurement)).await,
                    Err(e) => {
                        error!("Error processing buffer: {}", e);
                        self.emit(BridgeEvent::error(&e)).await;
                    }
                }
                ClientState::Closed
            }
            Err(WatcherError::Cancelled) => {
                info!("Listening to {} stopped on close request", self.address);
                ClientState::Closed
            }
            Err(e) => {
                error!("{}", e);
                self.emit(BridgeEvent::error(&e)).await;
                ClientState::Failed
            }
        };

        release(&self.address, link.as_mut()).await;
        self.set_state(outcome);
        outcome
    }

    /// Accumulate bytes until a full frame, a close request, an I/O error or
    /// the listen timeout.
    async fn read_frame(
        &self,
        link: &mut dyn SensorLink,
        close: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut accumulator = FrameAccumulator::new();
        let mut chunk = [0u8; FRAME_LENGTH];
        let deadline = tokio::time::sleep(self.settings.listen_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = close.cancelled() => return Err(WatcherError::Cancelled),
                _ = &mut deadline => {
                    return Err(self.listen_error(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "no complete frame after {:?} ({} of {} bytes)",
                            self.settings.listen_timeout,
                            accumulator.position(),
                            FRAME_LENGTH
                        ),
                    )));
                }
                read = link.read(&mut chunk) => match read {
                    Ok(0) => {
                        return Err(self.listen_error(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed by remote",
                        )));
                    }
                    Ok(n) => {
                        if let Some(frame) = accumulator.push(&chunk[..n]) {
                            return Ok(frame);
                        }
                    }
                    Err(e) => return Err(self.listen_error(e)),
                },
            }
        }
    }

    fn listen_error(&self, source: io::Error) -> WatcherError {
        WatcherError::IoDuringListen {
            address: self.address.clone(),
            source,
        }
    }
}

/// Sleep unless cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(WatcherError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

async fn send_command(link: &mut dyn SensorLink, command: u8, name: &str) {
    debug!("{}", name);
    if let Err(e) = link.write(&[command]).await {
        error!("Error in {}: {}", name, e);
    }
}

/// Release output, input and socket. A failure at one step never skips the
/// next one.
async fn release(address: &str, link: &mut dyn SensorLink) {
    match link.close_output().await {
        Ok(()) => debug!("Output stream closed"),
        Err(e) => warn!("Error closing output stream: {}", e),
    }
    match link.close_input().await {
        Ok(()) => debug!("Input stream closed"),
        Err(e) => warn!("Error closing input stream: {}", e),
    }
    match link.close_socket().await {
        Ok(()) => debug!("Socket closed"),
        Err(e) => warn!("Error closing socket: {}", e),
    }
    debug!("Bluetooth closed for {}", address);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::frame::encode;
    use crate::bluetooth::sensor::headers;
    use crate::error::ErrorCategory;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Gives other tasks a chance to run between link steps.
    async fn step(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    struct ScriptedLink {
        reads: VecDeque<io::Result<Vec<u8>>>,
        journal: Journal,
        fail_close_output: bool,
        step_delay: Option<Duration>,
    }

    #[async_trait]
    impl SensorLink for ScriptedLink {
        async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.journal.lock().push(format!("write {:02X}", bytes[0]));
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            step(self.step_delay).await;
            match self.reads.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => std::future::pending().await,
            }
        }

        async fn close_output(&mut self) -> io::Result<()> {
            step(self.step_delay).await;
            self.journal.lock().push("close output".into());
            if self.fail_close_output {
                return Err(io::Error::new(io::ErrorKind::Other, "boom"));
            }
            Ok(())
        }

        async fn close_input(&mut self) -> io::Result<()> {
            self.journal.lock().push("close input".into());
            Ok(())
        }

        async fn close_socket(&mut self) -> io::Result<()> {
            self.journal.lock().push("close socket".into());
            Ok(())
        }
    }

    struct ScriptedConnector {
        enabled: bool,
        failures: u32,
        attempts: AtomicU32,
        reads: Mutex<Option<Vec<io::Result<Vec<u8>>>>>,
        journal: Journal,
        fail_close_output: bool,
        hang_connect: bool,
        step_delay: Option<Duration>,
    }

    impl ScriptedConnector {
        fn new(failures: u32, reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                enabled: true,
                failures,
                attempts: AtomicU32::new(0),
                reads: Mutex::new(Some(reads)),
                journal: Arc::new(Mutex::new(Vec::new())),
                fail_close_output: false,
                hang_connect: false,
                step_delay: None,
            }
        }
    }

    #[async_trait]
    impl LinkConnector for ScriptedConnector {
        async fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn connect(&self, _address: &str) -> io::Result<Box<dyn SensorLink>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang_connect {
                return std::future::pending().await;
            }
            step(self.step_delay).await;
            if attempt <= self.failures {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            let reads = self.reads.lock().take().unwrap_or_default();
            Ok(Box::new(ScriptedLink {
                reads: reads.into(),
                journal: self.journal.clone(),
                fail_close_output: self.fail_close_output,
                step_delay: self.step_delay,
            }))
        }
    }

    fn fast_settings() -> ClientSettings {
        ClientSettings {
            connect_attempts: 2,
            retry_delay: Duration::from_millis(5),
            connect_timeout: Duration::from_secs(1),
            command_delay: Duration::from_millis(1),
            listen_timeout: Duration::from_millis(200),
        }
    }

    fn split_frame() -> Vec<io::Result<Vec<u8>>> {
        let frame = encode(headers::CENTIVOLT, 1260, 1000, 12_600, 25, 77);
        vec![
            Ok(frame[..40].to_vec()),
            Ok(frame[40..100].to_vec()),
            Ok(frame[100..].to_vec()),
        ]
    }

    fn client(connector: Arc<ScriptedConnector>) -> (SensorClient, mpsc::Receiver<BridgeEvent>) {
        client_with(connector, fast_settings())
    }

    fn client_with(
        connector: Arc<ScriptedConnector>,
        settings: ClientSettings,
    ) -> (SensorClient, mpsc::Receiver<BridgeEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (SensorClient::new(ADDR, connector, settings, tx), rx)
    }

    #[tokio::test]
    async fn test_full_cycle_emits_measurement() {
        let connector = Arc::new(ScriptedConnector::new(0, split_frame()));
        let (client, mut rx) = client(connector.clone());
        let state = client.subscribe();

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Closed);
        assert_eq!(*state.borrow(), ClientState::Closed);

        match rx.recv().await.unwrap() {
            BridgeEvent::DataRetrieved(m) => {
                assert_eq!(m.device_address, ADDR);
                assert_eq!(m.voltage_volts, 12.6);
                assert_eq!(m.temperature_c, 25);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let journal = connector.journal.lock().clone();
        assert_eq!(
            journal,
            vec![
                "write D0",
                "write E0",
                "write F0",
                "close output",
                "close input",
                "close socket"
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_then_connect() {
        let connector = Arc::new(ScriptedConnector::new(1, split_frame()));
        let (client, mut rx) = client(connector.clone());

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        handle.wait().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert!(matches!(rx.recv().await, Some(BridgeEvent::DataRetrieved(_))));
    }

    #[tokio::test]
    async fn test_connect_exhausted_is_inclusive() {
        let connector = Arc::new(ScriptedConnector::new(u32::MAX, vec![]));
        let (client, _rx) = client(connector.clone());
        let state = client.subscribe();

        let err = client.retrieve(&CancellationToken::new()).await.err().unwrap();
        match err {
            WatcherError::ConnectExhausted { address, attempts, .. } => {
                assert_eq!(address, ADDR);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(*state.borrow(), ClientState::Failed);
    }

    #[tokio::test]
    async fn test_hanging_connect_times_out_each_attempt() {
        let mut connector = ScriptedConnector::new(0, split_frame());
        connector.hang_connect = true;
        let connector = Arc::new(connector);
        let settings = ClientSettings {
            connect_timeout: Duration::from_millis(20),
            ..fast_settings()
        };
        let (client, _rx) = client_with(connector.clone(), settings);

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            client.retrieve(&CancellationToken::new()),
        )
        .await
        .unwrap()
        .err()
        .unwrap();

        match err {
            WatcherError::ConnectExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_state_sequence() {
        let mut connector = ScriptedConnector::new(0, split_frame());
        connector.step_delay = Some(Duration::from_millis(5));
        let (client, _rx) = client(Arc::new(connector));

        let mut state = client.subscribe();
        let seen = tokio::spawn(async move {
            let mut seen = Vec::new();
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                seen.push(current);
                if current.is_terminal() {
                    break;
                }
            }
            seen
        });

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Closed);

        assert_eq!(
            seen.await.unwrap(),
            vec![
                ClientState::Connecting,
                ClientState::Connected,
                ClientState::Listening,
                ClientState::FrameComplete,
                ClientState::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_bluetooth_disabled() {
        let mut connector = ScriptedConnector::new(0, vec![]);
        connector.enabled = false;
        let connector = Arc::new(connector);
        let (client, _rx) = client(connector.clone());

        let err = client.retrieve(&CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, WatcherError::BluetoothNotEnabled));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_io_error_during_listen_fails() {
        let reads = vec![
            Ok(vec![0x09, 0x63, 0x04]),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let connector = Arc::new(ScriptedConnector::new(0, reads));
        let (client, mut rx) = client(connector.clone());

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Failed);

        match rx.recv().await.unwrap() {
            BridgeEvent::Error { category, .. } => {
                assert_eq!(category, ErrorCategory::IoDuringListen)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(connector.journal.lock().contains(&"close socket".to_string()));
    }

    #[tokio::test]
    async fn test_partial_frame_times_out() {
        let connector = Arc::new(ScriptedConnector::new(0, vec![Ok(vec![0x09; 64])]));
        let (client, mut rx) = client(connector);

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Failed);

        match rx.recv().await.unwrap() {
            BridgeEvent::Error { category, message } => {
                assert_eq!(category, ErrorCategory::IoDuringListen);
                assert!(message.contains("64 of 130 bytes"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_header_reported() {
        let frame = encode([0x00, 0x00], 1260, 0, 0, 0, 0);
        let connector = Arc::new(ScriptedConnector::new(0, vec![Ok(frame)]));
        let (client, mut rx) = client(connector);

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Closed);

        match rx.recv().await.unwrap() {
            BridgeEvent::Error { category, message } => {
                assert_eq!(category, ErrorCategory::UnknownFrameHeader);
                assert!(message.contains(ADDR));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_request_stops_listening() {
        let connector = Arc::new(ScriptedConnector::new(0, vec![]));
        let (mut client, mut rx) = client(connector.clone());
        client.settings.listen_timeout = Duration::from_secs(60);

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        handle.request_close();
        assert_eq!(handle.wait().await, ClientState::Closed);

        assert!(rx.try_recv().is_err());
        assert!(connector.journal.lock().contains(&"close socket".to_string()));
    }

    #[tokio::test]
    async fn test_release_continues_after_failure() {
        let mut connector = ScriptedConnector::new(0, split_frame());
        connector.fail_close_output = true;
        let connector = Arc::new(connector);
        let (client, _rx) = client(connector.clone());

        let handle = client.retrieve(&CancellationToken::new()).await.unwrap();
        assert_eq!(handle.wait().await, ClientState::Closed);

        let journal = connector.journal.lock().clone();
        assert_eq!(
            &journal[journal.len() - 3..],
            &["close output", "close input", "close socket"]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let connector = Arc::new(ScriptedConnector::new(u32::MAX, vec![]));
        let (mut client, _rx) = client(connector.clone());
        client.settings.retry_delay = Duration::from_secs(60);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = client.retrieve(&cancel).await.err().unwrap();
        assert!(err.is_cancelled());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
