// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse engine trait definition.

use std::sync::Arc;

use crate::error::EngineError;
use crate::sync::TickSource;
use crate::waveform::PulseProgram;

/// Identifies a program loaded into an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Output line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// A level change observed on an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Output line that changed
    pub line: u8,
    /// New level
    pub level: Level,
    /// Hardware tick of the change
    pub tick: u32,
}

impl EdgeEvent {
    pub fn is_rising(&self) -> bool {
        self.level == Level::High
    }
}

/// Handler invoked by the engine for edges on a registered line.
///
/// Engines invoke callbacks one at a time.
pub type EdgeCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// The trait every pulse engine must implement.
///
/// An engine plays a [`PulseProgram`] on its output lines, repeating it
/// until stopped, and exposes a free-running microsecond tick counter.
pub trait PulseEngine: Send + Sync {
    /// Get the engine name.
    fn name(&self) -> &str;

    /// Load a program, replacing any previously loaded one.
    fn load_program(&self, program: PulseProgram) -> Result<ProgramHandle, EngineError>;

    /// Start playing the program repeatedly.
    fn start_repeating(&self, handle: ProgramHandle) -> Result<(), EngineError>;

    /// Current tick counter value (microseconds, wraps at 2^32).
    fn read_tick_counter(&self) -> u32;

    /// Tick latched at the start of the capture segment during the most
    /// recent traversal.
    fn captured_tick(&self, handle: ProgramHandle) -> Result<u32, EngineError>;

    /// Register a handler for edges on `line`.
    fn register_edge_callback(&self, line: u8, callback: EdgeCallback) -> Result<(), EngineError>;

    /// Rewrite a segment duration, in engine units. Only the slack segment
    /// accepts writes; the change applies from the next traversal.
    fn mutate_segment_duration(
        &self,
        handle: ProgramHandle,
        segment_index: usize,
        duration_units: u32,
    ) -> Result<(), EngineError>;

    /// Stop playback. Callbacks are no longer delivered afterwards.
    fn stop(&self);
}

impl TickSource for dyn PulseEngine {
    fn read_tick(&self) -> u32 {
        self.read_tick_counter()
    }
}
