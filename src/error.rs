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

//! Error taxonomy for the capture and publish pipeline.
//!
//! Every variant is recoverable at the level of "skip this device or this
//! cycle, report it, carry on with the next scheduled cycle".

use std::io;
use thiserror::Error;

/// Failures surfaced by the sensor client, the frame decoder and the publisher.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Bluetooth not enabled")]
    BluetoothNotEnabled,

    #[error("Unable to connect to {address} after {attempts} attempts: {source}")]
    ConnectExhausted {
        address: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Error while listening to {address}: {source}")]
    IoDuringListen {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Unknown header: {header:02X?} for device {address}")]
    UnknownFrameHeader { header: [u8; 2], address: String },

    #[error("Byte length mismatch: expected {expected} bytes, got {actual}")]
    FormatLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid format specifier '{0}'")]
    InvalidFormat(char),

    #[error("MQTT Exception: No internet available")]
    NoNetworkAvailable,

    #[error("Reached maximum reconnect attempts ({attempts}), data is outdated: {last_error}")]
    PublishExhausted { attempts: u32, last_error: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Category tag carried next to the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    BluetoothNotEnabled,
    ConnectExhausted,
    IoDuringListen,
    UnknownFrameHeader,
    FormatLengthMismatch,
    InvalidFormat,
    NoNetworkAvailable,
    PublishExhausted,
    Cancelled,
    Configuration,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        Self::BluetoothNotEnabled,
        Self::ConnectExhausted,
        Self::IoDuringListen,
        Self::UnknownFrameHeader,
        Self::FormatLengthMismatch,
        Self::InvalidFormat,
        Self::NoNetworkAvailable,
        Self::PublishExhausted,
        Self::Cancelled,
        Self::Configuration,
    ];

    /// Parse a tag produced by [`ErrorCategory::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BluetoothNotEnabled => "BLUETOOTH_NOT_ENABLED",
            Self::ConnectExhausted => "CONNECT_EXHAUSTED",
            Self::IoDuringListen => "IO_ERROR_DURING_LISTEN",
            Self::UnknownFrameHeader => "UNKNOWN_FRAME_HEADER",
            Self::FormatLengthMismatch => "FORMAT_LENGTH_MISMATCH",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::NoNetworkAvailable => "NO_NETWORK_AVAILABLE",
            Self::PublishExhausted => "PUBLISH_EXHAUSTED",
            Self::Cancelled => "CANCELLED",
            Self::Configuration => "CONFIGURATION",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WatcherError {
    /// Category tag for the log collaborator.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BluetoothNotEnabled => ErrorCategory::BluetoothNotEnabled,
            Self::ConnectExhausted { .. } => ErrorCategory::ConnectExhausted,
            Self::IoDuringListen { .. } => ErrorCategory::IoDuringListen,
            Self::UnknownFrameHeader { .. } => ErrorCategory::UnknownFrameHeader,
            Self::FormatLengthMismatch { .. } => ErrorCategory::FormatLengthMismatch,
            Self::InvalidFormat(_) => ErrorCategory::InvalidFormat,
            Self::NoNetworkAvailable => ErrorCategory::NoNetworkAvailable,
            Self::PublishExhausted { .. } => ErrorCategory::PublishExhausted,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WatcherError>;
