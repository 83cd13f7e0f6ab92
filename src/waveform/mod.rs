// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-channel pulse programs.
//!
//! - [`WaveformSegment`] and [`LineMask`]: one step of the program
//! - [`PulseProgram`]: the repeating program with its one [`SlackSlot`]
//! - [`WaveformComposer`]: builds a program from [`ChannelSpec`]s

pub mod composer;
pub mod segment;

pub use composer::{ChannelSpec, WaveformComposer};
pub use segment::{ChannelRole, ChannelTrack, LineMask, PulseProgram, SlackSlot, WaveformSegment};
