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

//! Application state management.

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::bluetooth::Measurement;
use crate::error::ErrorCategory;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Info,
    Warning,
    Debug,
}

impl Severity {
    /// Single-letter tag used by the persisted log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "E",
            Severity::Info => "I",
            Severity::Warning => "W",
            Severity::Debug => "D",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "E" => Severity::Error,
            "W" => Severity::Warning,
            "D" => Severity::Debug,
            _ => Severity::Info,
        }
    }
}

/// One human-facing log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub severity: Severity,
    /// Set for failures.
    pub category: Option<ErrorCategory>,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
            severity,
            category: None,
        }
    }

    /// Error entry tagged with its category.
    pub fn error(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category: Some(category),
            ..Self::new(message, Severity::Error)
        }
    }
}

/// Bounded most-recent-first list of log entries.
#[derive(Debug)]
pub struct RecentLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl RecentLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest entries past capacity.
    pub fn capture(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// What the capture loop is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Idle,
    Capturing { device: String },
    Stopped,
}

impl CycleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CycleStatus::Idle => "Idle",
            CycleStatus::Capturing { .. } => "Capturing...",
            CycleStatus::Stopped => "Stopped",
        }
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Capture loop status.
    pub status: RwLock<CycleStatus>,

    /// Latest measurement per device address.
    pub last_measurements: RwLock<HashMap<String, Measurement>>,

    /// Recent log lines.
    pub recent_log: RecentLog,
}

impl AppState {
    pub fn new(log_capacity: usize) -> Arc<Self> {
        let state = Self {
            status: RwLock::new(CycleStatus::Idle),
            last_measurements: RwLock::new(HashMap::new()),
            recent_log: RecentLog::new(log_capacity),
        };
        state
            .recent_log
            .capture(LogEntry::new("System ready", Severity::Info));
        Arc::new(state)
    }

    pub fn set_status(&self, status: CycleStatus) {
        *self.status.write() = status;
    }

    pub fn get_status(&self) -> CycleStatus {
        self.status.read().clone()
    }

    pub fn record_measurement(&self, measurement: Measurement) {
        self.last_measurements
            .write()
            .insert(measurement.device_address.clone(), measurement);
    }

    pub fn last_measurement(&self, address: &str) -> Option<Measurement> {
        self.last_measurements.read().get(address).cloned()
    }
}
