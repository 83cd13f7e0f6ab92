// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse synchronization: tick/wall-clock correlation and the drift loop.
//!
//! - [`TickClockCorrelator`]: matches a hardware tick to the wall clock
//! - [`DriftController`] and [`SyncState`]: the software PLL
//! - [`TickSource`] and [`WallClock`]: the clocks it samples

pub mod clock;
pub mod correlator;
pub mod drift;

pub use clock::{SystemWallClock, TickSource, WallClock, WallTime};
pub use correlator::{CorrelationResult, TickClockCorrelator, TickSample};
pub use drift::{DriftController, DriftRecord, SyncState};
