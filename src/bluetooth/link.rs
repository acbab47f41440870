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

//! Physical link to a sensor.
//!
//! [`LinkConnector`] opens links, [`SensorLink`] is one open connection with
//! separately releasable output, input and socket. The RFCOMM backend talks
//! to BlueZ through `bluer`.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, Address};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// One open connection to a sensor.
#[async_trait]
pub trait SensorLink: Send {
    /// Write raw bytes to the sensor.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`. Returns 0 on end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the output direction.
    async fn close_output(&mut self) -> io::Result<()>;

    /// Release the input direction.
    async fn close_input(&mut self) -> io::Result<()>;

    /// Release the underlying socket.
    async fn close_socket(&mut self) -> io::Result<()>;
}

/// Opens links to sensors by address.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Whether the local radio is usable at all.
    async fn is_enabled(&self) -> bool;

    /// Open a link to the device at `address`.
    async fn connect(&self, address: &str) -> io::Result<Box<dyn SensorLink>>;
}

/// RFCOMM (serial port profile) connector backed by the default BlueZ adapter.
pub struct RfcommConnector {
    adapter: Adapter,
    channel: u8,
}

impl RfcommConnector {
    /// Open a BlueZ session and bind to the default adapter.
    pub async fn new(channel: u8) -> Result<Self> {
        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self { adapter, channel })
    }
}

#[async_trait]
impl LinkConnector for RfcommConnector {
    async fn is_enabled(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn connect(&self, address: &str) -> io::Result<Box<dyn SensorLink>> {
        let device: Address = address.parse().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{}: {}", address, e))
        })?;

        debug!("Opening RFCOMM stream to {} channel {}", device, self.channel);
        let stream = Stream::connect(SocketAddr::new(device, self.channel)).await?;

        Ok(Box::new(RfcommLink::new(stream)))
    }
}

/// An open RFCOMM stream.
pub struct RfcommLink {
    stream: Option<Stream>,
    input_open: bool,
}

impl RfcommLink {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream: Some(stream),
            input_open: true,
        }
    }

    fn stream(&mut self) -> io::Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }
}

#[async_trait]
impl SensorLink for RfcommLink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.input_open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "input closed"));
        }
        self.stream()?.read(buf).await
    }

    async fn close_output(&mut self) -> io::Result<()> {
        self.stream()?.shutdown().await
    }

    async fn close_input(&mut self) -> io::Result<()> {
        self.input_open = false;
        Ok(())
    }

    async fn close_socket(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket already closed",
            )),
        }
    }
}
