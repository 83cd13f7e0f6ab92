// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time broadcast fired by the trigger channel.

pub mod nmea;
pub mod udp;

pub use udp::{BroadcastTransport, UdpBroadcaster};

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::WallClock;

/// Formats the current wall-clock time and hands it to a transport.
pub struct TimeBroadcaster {
    clock: Arc<dyn WallClock>,
    transport: Box<dyn BroadcastTransport>,
}

impl TimeBroadcaster {
    pub fn new(clock: Arc<dyn WallClock>, transport: Box<dyn BroadcastTransport>) -> Self {
        Self { clock, transport }
    }

    /// Sample the clock and send one time sentence.
    pub fn broadcast_now(&self) -> Result<()> {
        let now = self.clock.now();
        let local = now.to_local().ok_or_else(|| {
            Error::Transport(format!("clock reading {}s is not representable", now.seconds))
        })?;
        let sentence = nmea::time_sentence(&local);
        self.transport.send(sentence.as_bytes())?;
        debug!(sentence = %sentence.trim_end(), "Sent time broadcast");
        Ok(())
    }
}
