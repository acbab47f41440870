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

//! Bluetooth side of the bridge.
//!
//! Talks to the voltage sensors over RFCOMM: opens a link, sends the setup
//! commands, requests a data dump and decodes the 130-byte frame it answers
//! with.

mod client;
mod frame;
mod link;
pub mod sensor;
mod simulated;
pub mod unpack;

pub use client::{ClientSettings, ClientState, ListenHandle, SensorClient};
pub use frame::{decode, encode, FrameAccumulator, Measurement, VoltageScale};
pub use link::{LinkConnector, RfcommConnector, RfcommLink, SensorLink};
pub use simulated::{random_frame, SimulatedConnector};
