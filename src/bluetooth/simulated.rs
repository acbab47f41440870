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

//! Simulated sensor for running without hardware.

use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::io;
use tracing::debug;

use super::frame::encode;
use super::link::{LinkConnector, SensorLink};
use super::sensor::{commands, headers};

/// Voltage range of simulated readings, in millivolts.
const MIN_MILLIVOLTS: u16 = 11_600;
const MAX_MILLIVOLTS: u16 = 13_010;

/// Bytes handed out per read, so frames arrive in several chunks.
const CHUNK_SIZE: usize = 48;

/// Connector whose links answer a data dump with a random plausible frame.
#[derive(Debug, Default)]
pub struct SimulatedConnector;

#[async_trait]
impl LinkConnector for SimulatedConnector {
    async fn is_enabled(&self) -> bool {
        true
    }

    async fn connect(&self, address: &str) -> io::Result<Box<dyn SensorLink>> {
        debug!("Simulated connection to {}", address);
        Ok(Box::new(SimulatedLink::default()))
    }
}

/// Random frame: 30 °C, 100 °F, 1 A, voltage in 11.60..13.01 V.
pub fn random_frame() -> Vec<u8> {
    let millivolts = rand::thread_rng().gen_range(MIN_MILLIVOLTS..MAX_MILLIVOLTS);
    let milliwatts = millivolts as u32;
    encode(headers::MILLIVOLT, millivolts, 1000, milliwatts, 30, 100)
}

#[derive(Debug, Default)]
struct SimulatedLink {
    pending: VecDeque<u8>,
    closed: bool,
}

#[async_trait]
impl SensorLink for SimulatedLink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.contains(&commands::DATA_DUMP) {
            self.pending.extend(random_frame());
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        if self.pending.is_empty() {
            // Nothing requested yet: behave like an idle serial line.
            std::future::pending::<()>().await;
        }

        let n = buf.len().min(CHUNK_SIZE).min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close_output(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn close_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    async fn close_socket(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
