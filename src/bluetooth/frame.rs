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

//! Frame accumulation and decoding into measurements.

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

use super::sensor::{headers, layout, FRAME_LENGTH};
use super::unpack::unpack;
use crate::error::{Result, WatcherError};

/// Voltage scale selected by the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageScale {
    Centivolts,
    Millivolts,
}

impl VoltageScale {
    pub fn from_header(header: [u8; 2]) -> Option<Self> {
        match header {
            headers::CENTIVOLT => Some(Self::Centivolts),
            headers::MILLIVOLT => Some(Self::Millivolts),
            _ => None,
        }
    }

    /// Convert a raw reading to hundredths of a volt, rounding half-up.
    pub fn to_centivolts(self, raw: i64) -> i64 {
        match self {
            Self::Centivolts => raw,
            Self::Millivolts => (raw + 5) / 10,
        }
    }
}

/// One decoded sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub device_address: String,
    pub voltage_volts: f64,
    pub current_amps: f64,
    pub power_milliwatts: f64,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub captured_at: DateTime<Local>,
}

impl Measurement {
    /// Short human-readable line, e.g. `AA:BB:.. 12.6v 24°`.
    pub fn summary(&self) -> String {
        format!(
            "{} {}v {}°",
            self.device_address, self.voltage_volts, self.temperature_c
        )
    }
}

/// Decode a complete frame. Strict: any failure yields an error and no
/// measurement.
pub fn decode(address: &str, frame: &[u8]) -> Result<Measurement> {
    if frame.len() != FRAME_LENGTH {
        return Err(WatcherError::FormatLengthMismatch {
            expected: FRAME_LENGTH,
            actual: frame.len(),
        });
    }

    let start = layout::HEADER.0;
    let header = [frame[start], frame[start + 1]];
    let scale = VoltageScale::from_header(header).ok_or_else(|| {
        WatcherError::UnknownFrameHeader {
            header,
            address: address.to_string(),
        }
    })?;

    let fields = unpack(layout::FIELDS_FORMAT, &frame[..layout::FIELDS_END])?;
    let (volts_raw, amps_raw, mw_raw, temp_c, temp_f) =
        (fields[1], fields[2], fields[3], fields[4], fields[5]);

    let measurement = Measurement {
        device_address: address.to_string(),
        voltage_volts: scale.to_centivolts(volts_raw) as f64 / 100.0,
        current_amps: amps_raw as f64 / 1000.0,
        power_milliwatts: mw_raw as f64 / 1000.0,
        temperature_c: temp_c as i32,
        temperature_f: temp_f as i32,
        captured_at: Local::now(),
    };

    debug!(
        "Device {}: {} V, {} A, {} mW, {}°C, {}°F",
        measurement.device_address,
        measurement.voltage_volts,
        measurement.current_amps,
        measurement.power_milliwatts,
        measurement.temperature_c,
        measurement.temperature_f
    );

    Ok(measurement)
}

/// Accumulates streamed bytes until a full frame is available.
pub struct FrameAccumulator {
    buffer: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_LENGTH),
        }
    }

    /// Append a chunk at the current write position.
    ///
    /// Returns `Some(frame)` once exactly [`FRAME_LENGTH`] bytes are held.
    /// Bytes past the end of the frame are discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let room = FRAME_LENGTH - self.buffer.len();
        let take = chunk.len().min(room);
        self.buffer.extend_from_slice(&chunk[..take]);

        if take < chunk.len() {
            warn!("Discarding {} bytes past end of frame", chunk.len() - take);
        }

        if self.buffer.len() == FRAME_LENGTH {
            debug!("Frame complete: {} bytes", FRAME_LENGTH);
            return Some(std::mem::take(&mut self.buffer));
        }

        None
    }

    /// Bytes accumulated so far.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a frame with the given header and raw field values.
pub fn encode(
    header: [u8; 2],
    volts_raw: u16,
    amps_raw: u16,
    mw_raw: u32,
    temp_c: u16,
    temp_f: u16,
) -> Vec<u8> {
    fn put(frame: &mut [u8], (offset, len): (usize, usize), bytes: &[u8]) {
        frame[offset..offset + len].copy_from_slice(bytes);
    }

    let mut frame = vec![0u8; FRAME_LENGTH];
    put(&mut frame, layout::HEADER, &header);
    put(&mut frame, layout::VOLTAGE, &volts_raw.to_be_bytes());
    put(&mut frame, layout::CURRENT, &amps_raw.to_be_bytes());
    put(&mut frame, layout::POWER, &mw_raw.to_be_bytes());
    put(&mut frame, layout::TEMPERATURE_C, &temp_c.to_be_bytes());
    put(&mut frame, layout::TEMPERATURE_F, &temp_f.to_be_bytes());
    frame
}
