// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse engine implementations.
//!
//! This module provides the [`PulseEngine`] trait and its implementations:
//!
//! - `simulated::SimulatedEngine`: plays programs on a tokio timer task

pub mod simulated;
pub mod r#trait;

pub use r#trait::{EdgeCallback, EdgeEvent, Level, ProgramHandle, PulseEngine};
pub use simulated::SimulatedEngine;
