// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Connectionless delivery of broadcast sentences.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::info;

use crate::config::BroadcastConfig;
use crate::error::{Error, Result};

/// Sends one datagram per sentence.
pub trait BroadcastTransport: Send + Sync {
    /// Send a framed sentence. Must not block.
    fn send(&self, sentence: &[u8]) -> Result<()>;
}

/// UDP transport with broadcast enabled, connected to a fixed destination.
#[derive(Debug)]
pub struct UdpBroadcaster {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpBroadcaster {
    /// Bind an ephemeral socket and connect it to `address:port`.
    pub fn connect(address: &str, port: u16) -> Result<Self> {
        let destination = (address, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::Config(format!("cannot resolve broadcast address {}", address))
            })?;
        let bind: SocketAddr = if destination.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.connect(destination)?;
        info!(destination = %destination, "Time broadcast socket ready");
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn from_config(config: &BroadcastConfig) -> Result<Self> {
        Self::connect(&config.address, config.port)
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl BroadcastTransport for UdpBroadcaster {
    fn send(&self, sentence: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send(sentence)
            .map_err(|e| Error::Transport(format!("send to {} failed: {}", self.destination, e)))?;
        if sent != sentence.len() {
            return Err(Error::Transport(format!(
                "short send to {}: {} of {} bytes",
                self.destination,
                sent,
                sentence.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_reaches_destination() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let broadcaster = UdpBroadcaster::connect("127.0.0.1", port).unwrap();
        assert_eq!(broadcaster.destination().port(), port);
        broadcaster.send(b"$A*41\r\n").unwrap();

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"$A*41\r\n");
    }
}
