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

//! Network reachability check used before talking to the broker.

use std::path::PathBuf;
use tracing::debug;

/// `RTF_UP` flag of a kernel route entry.
const RTF_UP: u32 = 0x0001;

/// Answers whether the broker could be reachable at all.
pub trait NetworkProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Probe backed by the kernel IPv4 routing table.
#[derive(Debug, Clone)]
pub struct RouteTableProbe {
    path: PathBuf,
}

impl RouteTableProbe {
    pub fn new() -> Self {
        Self::with_path(PathBuf::from("/proc/net/route"))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Default for RouteTableProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProbe for RouteTableProbe {
    fn is_reachable(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(table) => has_default_route(&table),
            Err(e) => {
                debug!("Cannot read {:?}: {}", self.path, e);
                false
            }
        }
    }
}

/// Whether a `/proc/net/route` table holds an UP default route on a
/// non-loopback interface.
pub fn has_default_route(table: &str) -> bool {
    table.lines().skip(1).any(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            return false;
        }
        let (iface, destination, flags) = (cols[0], cols[1], cols[3]);
        let up = u32::from_str_radix(flags, 16)
            .map(|f| f & RTF_UP != 0)
            .unwrap_or(false);
        iface != "lo" && destination == "00000000" && up
    })
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl NetworkProbe for StaticProbe {
    fn is_reachable(&self) -> bool {
        self.0
    }
}
