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

//! Event processing and publish dispatch.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bluetooth::Measurement;
use crate::error::{ErrorCategory, WatcherError};
use crate::host::HostTelemetry;
use crate::mqtt::{attributes_topic, AttributesPayload, Publisher};
use crate::state::{AppState, LogEntry, Severity};
use crate::storage::LogSink;

/// Events emitted by the capture side.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A frame was decoded.
    DataRetrieved(Measurement),
    /// A capture step failed.
    Error {
        category: ErrorCategory,
        message: String,
    },
    /// Informational line for the log.
    Log { message: String, severity: Severity },
}

impl BridgeEvent {
    pub fn error(err: &WatcherError) -> Self {
        BridgeEvent::Error {
            category: err.category(),
            message: err.to_string(),
        }
    }

    pub fn log(message: impl Into<String>, severity: Severity) -> Self {
        BridgeEvent::Log {
            message: message.into(),
            severity,
        }
    }
}

/// Work for the persisted log writer.
enum PersistOp {
    Append(LogEntry),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Start the writer on the blocking pool. Ops are applied in send order;
/// the writer stops once every sender is gone.
fn spawn_writer(sink: Arc<dyn LogSink>) -> mpsc::UnboundedSender<PersistOp> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || {
        while let Some(op) = rx.blocking_recv() {
            match op {
                PersistOp::Append(entry) => {
                    if let Err(e) = sink.append(&entry) {
                        error!("Failed to persist log entry: {}", e);
                    }
                }
                PersistOp::Clear => {
                    if let Err(e) = sink.clear() {
                        error!("Failed to clear persisted log: {}", e);
                    }
                }
                PersistOp::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Log writer stopped");
    });

    tx
}

/// Writes a log entry to the recent list and, when present, the persisted sink.
///
/// Sink writes run off the async workers. Must be created inside a tokio
/// runtime when a sink is given.
#[derive(Clone)]
pub struct LogCapture {
    state: Arc<AppState>,
    writer: Option<mpsc::UnboundedSender<PersistOp>>,
}

impl LogCapture {
    pub fn new(state: Arc<AppState>, sink: Option<Arc<dyn LogSink>>) -> Self {
        Self {
            state,
            writer: sink.map(spawn_writer),
        }
    }

    pub fn capture(&self, message: impl Into<String>, severity: Severity) {
        self.record(LogEntry::new(message, severity));
    }

    /// Capture a failure with its category tag.
    pub fn capture_error(&self, category: ErrorCategory, message: impl Into<String>) {
        self.record(LogEntry::error(category, message));
    }

    pub fn record(&self, entry: LogEntry) {
        self.persist(PersistOp::Append(entry.clone()));
        self.state.recent_log.capture(entry);
    }

    pub fn clear(&self) {
        self.persist(PersistOp::Clear);
        self.state.recent_log.clear();
    }

    /// Wait until every entry captured so far is in the sink.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.persist(PersistOp::Flush(done));
        let _ = wait.await;
    }

    fn persist(&self, op: PersistOp) {
        let Some(writer) = &self.writer else {
            if let PersistOp::Flush(done) = op {
                let _ = done.send(());
            }
            return;
        };
        if writer.send(op).is_err() {
            error!("Log writer is gone, entry not persisted");
        }
    }
}

/// Routes capture events to the log and to the publisher.
pub struct EventProcessor {
    state: Arc<AppState>,
    log: LogCapture,
    publisher: Option<Arc<Publisher>>,
    telemetry: HostTelemetry,
    cancel: CancellationToken,
    publishes: JoinSet<()>,
}

impl EventProcessor {
    pub fn new(
        state: Arc<AppState>,
        log: LogCapture,
        publisher: Option<Arc<Publisher>>,
        telemetry: HostTelemetry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            log,
            publisher,
            telemetry,
            cancel,
            publishes: JoinSet::new(),
        }
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::DataRetrieved(measurement) => self.handle_measurement(measurement),
            BridgeEvent::Error { category, message } => {
                warn!("[{}] {}", category, message);
                self.log.capture_error(category, message);
            }
            BridgeEvent::Log { message, severity } => {
                debug!("{}", message);
                self.log.capture(message, severity);
            }
        }
    }

    /// Wait for every dispatched publish to finish.
    pub async fn drain(&mut self) {
        while let Some(result) = self.publishes.join_next().await {
            self.reap(result);
        }
    }

    /// Report a publish task that did not finish normally.
    fn reap(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            let message = format!("Publish task failed: {}", e);
            error!("{}", message);
            self.log.capture(message, Severity::Error);
        }
    }

    /// Number of publishes still in flight.
    pub fn in_flight(&self) -> usize {
        self.publishes.len()
    }

    fn handle_measurement(&mut self, measurement: Measurement) {
        let summary = measurement.summary();
        info!("{}", summary);
        self.log.capture(summary.clone(), Severity::Info);
        self.state.record_measurement(measurement.clone());

        let Some(publisher) = self.publisher.clone() else {
            debug!("No broker configured, not publishing");
            return;
        };

        let snapshot = self.telemetry.snapshot();
        let payload = AttributesPayload::new(&measurement, &snapshot);
        let topic = attributes_topic(&measurement.device_address);
        let log = self.log.clone();
        let cancel = self.cancel.clone();

        // Publishing runs detached from capture.
        self.publishes.spawn(async move {
            let body = match payload.to_json() {
                Ok(body) => body,
                Err(e) => {
                    log.capture(format!("Exception: {}", e), Severity::Error);
                    return;
                }
            };

            match publisher.publish(&topic, body.as_bytes(), &cancel).await {
                Ok(()) => {
                    debug!("Published {} to {}", body, topic);
                    log.capture(format!("Data sent {}", summary), Severity::Info);
                }
                Err(WatcherError::Cancelled) => {
                    debug!("Publish to {} cancelled", topic);
                }
                Err(e) => {
                    error!("[{}] {}", e.category(), e);
                    log.capture_error(e.category(), e.to_string());
                }
            }
        });
    }
}

/// Drain `events` into `processor` until the channel closes or `cancel` fires,
/// then wait for in-flight publishes.
pub async fn run_processor(
    mut processor: EventProcessor,
    mut events: mpsc::Receiver<BridgeEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => processor.process_event(event),
                None => break,
            },
            Some(result) = processor.publishes.join_next(), if !processor.publishes.is_empty() => {
                processor.reap(result);
            }
            _ = cancel.cancelled() => break,
        }
    }

    processor.drain().await;
    info!("Event processor stopped");
}
