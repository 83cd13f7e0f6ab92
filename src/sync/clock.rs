// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Clock sources sampled by the correlator.

use chrono::{DateTime, Local, TimeZone, Utc};

/// A free-running microsecond tick counter that wraps at 2^32.
pub trait TickSource {
    fn read_tick(&self) -> u32;
}

/// Wall-clock reading split into whole seconds and the sub-second part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Nanoseconds within the second, `0..1_000_000_000`.
    pub nanos: u32,
}

impl WallTime {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Microseconds within the second, rounded to the nearest microsecond.
    pub fn micros_within_second(&self) -> i64 {
        (i64::from(self.nanos) + 500) / 1_000
    }

    /// The same instant in the local time zone.
    pub fn to_local(&self) -> Option<DateTime<Local>> {
        Local.timestamp_opt(self.seconds, self.nanos).single()
    }
}

impl From<DateTime<Utc>> for WallTime {
    fn from(t: DateTime<Utc>) -> Self {
        Self {
            seconds: t.timestamp(),
            nanos: t.timestamp_subsec_nanos(),
        }
    }
}

/// Source of wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> WallTime;
}

/// Reads the system real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> WallTime {
        Utc::now().into()
    }
}
