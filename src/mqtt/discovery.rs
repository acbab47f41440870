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

//! Home Assistant device registration.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::payload::{discovery_topic, DiscoveryPayload};
use super::publisher::Publisher;

/// Register every device once. Returns how many registrations went through.
///
/// Failures are logged and skipped; `publisher` carries the retry bound.
pub async fn announce_devices(
    publisher: &Publisher,
    devices: &[String],
    cancel: &CancellationToken,
) -> usize {
    let mut announced = 0;

    for address in devices {
        if cancel.is_cancelled() {
            break;
        }

        let body = match DiscoveryPayload::new(address).to_json() {
            Ok(body) => body,
            Err(e) => {
                error!("Discovery payload for {}: {}", address, e);
                continue;
            }
        };

        let topic = discovery_topic(address);
        match publisher.publish(&topic, body.as_bytes(), cancel).await {
            Ok(()) => {
                info!("Registered {} on {}", address, topic);
                announced += 1;
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!("Discovery for {} failed: {}", address, e),
        }
    }

    announced
}
