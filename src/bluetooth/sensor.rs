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

//! Sensor wire protocol constants.

/// Length of one response frame.
pub const FRAME_LENGTH: usize = 130;

/// Default RFCOMM channel of the sensor's serial port service.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Single-byte command codes.
pub mod commands {
    pub const BACKLIGHT: u8 = 0xD0; // Set backlight
    pub const SCREEN_TIMEOUT: u8 = 0xE0; // Set screen timeout
    pub const DATA_DUMP: u8 = 0xF0; // Request a full data frame

    /// Configuration commands sent before the dump request, in order.
    pub const SETUP: [(u8, &str); 2] = [
        (BACKLIGHT, "setBacklight"),
        (SCREEN_TIMEOUT, "setScreenTimeout"),
    ];
}

/// Frame header signatures. The header selects the voltage scale.
pub mod headers {
    /// Voltage reported in hundredths of a volt.
    pub const CENTIVOLT: [u8; 2] = [0x09, 0x63];
    /// Voltage reported in thousandths of a volt.
    pub const MILLIVOLT: [u8; 2] = [0x09, 0xC9];
}

/// Byte layout of a frame (offset, length).
pub mod layout {
    pub const HEADER: (usize, usize) = (0, 2);
    pub const VOLTAGE: (usize, usize) = (2, 2);
    pub const CURRENT: (usize, usize) = (4, 2);
    pub const POWER: (usize, usize) = (6, 4);
    pub const TEMPERATURE_C: (usize, usize) = (10, 2);
    pub const TEMPERATURE_F: (usize, usize) = (12, 2);

    /// Bytes covered by the fields above.
    pub const FIELDS_END: usize = 14;
    /// Format string matching the fields above.
    pub const FIELDS_FORMAT: &str = "!HHHIHH";
}
