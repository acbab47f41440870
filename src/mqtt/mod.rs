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

//! MQTT side of the bridge.
//!
//! Every reading is delivered on its own short-lived broker session:
//! connect, publish once, disconnect.

mod broker;
mod discovery;
mod payload;
mod publisher;

pub use broker::RumqttcConnector;
pub use discovery::announce_devices;
pub use payload::{
    attributes_topic, device_id, discovery_topic, AttributesPayload, DiscoveryPayload,
};
pub use publisher::{BrokerConnector, BrokerSession, Publisher, RetryPolicy};
