// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! PPS Discipline
//!
//! This crate disciplines a hardware-timed once-per-second pulse to the
//! wall clock and derives phase-offset camera triggers and a time
//! broadcast from it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Pulse Engine                │
//! │   (plays the program, raises edges)      │
//! ├──────────────────┬──────────────────────┤
//! │  base line edge  │  trigger line edge   │
//! ├──────────────────┴──────────────────────┤
//! │            Edge Dispatcher               │
//! ├────────────────┬────────────────────────┤
//! │ Correlator →   │   Time Broadcaster     │
//! │ Drift Loop →   │   (NMEA over UDP)      │
//! │ slack write    │                        │
//! └────────────────┴────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`waveform`]: Segments, programs and the composer
//! - [`sync`]: Tick/wall-clock correlation and the drift loop
//! - [`engine`]: Pulse engine trait and the software engine
//! - [`dispatch`]: Edge routing
//! - [`broadcast`]: Time sentence formatting and transport
//! - [`journal`]: Per-day drift log
//! - [`error`]: Error types

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod journal;
pub mod sync;
pub mod waveform;

pub use config::Config;
pub use error::{Error, Result};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
