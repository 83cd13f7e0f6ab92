// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities: scripted clocks, recording transports and a
//! recording pulse engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::broadcast::BroadcastTransport;
use crate::engine::{EdgeCallback, EdgeEvent, ProgramHandle, PulseEngine};
use crate::error::{EngineError, Error, Result};
use crate::sync::{TickSource, WallClock, WallTime};
use crate::waveform::PulseProgram;

/// Replays a fixed sequence of values, repeating the last one when exhausted.
#[derive(Debug)]
struct Script<T: Copy> {
    values: Vec<T>,
    reads: usize,
}

impl<T: Copy + Default> Script<T> {
    fn new(values: &[T]) -> Self {
        Self {
            values: values.to_vec(),
            reads: 0,
        }
    }

    fn next(&mut self) -> T {
        let value = self
            .values
            .get(self.reads)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or_default();
        self.reads += 1;
        value
    }
}

/// Tick counter returning scripted values.
#[derive(Debug)]
pub struct ScriptedTicks {
    script: Mutex<Script<u32>>,
}

impl ScriptedTicks {
    pub fn new(values: &[u32]) -> Self {
        Self {
            script: Mutex::new(Script::new(values)),
        }
    }

    /// Number of reads so far.
    pub fn reads(&self) -> usize {
        self.script.lock().reads
    }
}

impl TickSource for ScriptedTicks {
    fn read_tick(&self) -> u32 {
        self.script.lock().next()
    }
}

/// Wall clock returning scripted readings.
#[derive(Debug)]
pub struct ScriptedClock {
    script: Mutex<Script<(i64, u32)>>,
}

impl ScriptedClock {
    pub fn new(readings: &[WallTime]) -> Self {
        let values: Vec<_> = readings.iter().map(|t| (t.seconds, t.nanos)).collect();
        Self {
            script: Mutex::new(Script::new(&values)),
        }
    }

    pub fn reads(&self) -> usize {
        self.script.lock().reads
    }
}

impl WallClock for ScriptedClock {
    fn now(&self) -> WallTime {
        let (seconds, nanos) = self.script.lock().next();
        WallTime::new(seconds, nanos)
    }
}

/// Transport that keeps every datagram it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the sent datagrams.
    pub fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.sent.clone()
    }
}

impl BroadcastTransport for RecordingTransport {
    fn send(&self, sentence: &[u8]) -> Result<()> {
        self.sent.lock().push(sentence.to_vec());
        Ok(())
    }
}

/// Transport whose every send fails.
#[derive(Debug, Default)]
pub struct FailingTransport;

impl BroadcastTransport for FailingTransport {
    fn send(&self, _sentence: &[u8]) -> Result<()> {
        Err(Error::Transport("network unreachable".into()))
    }
}

/// Pulse engine that records calls and lets tests raise edges by hand.
pub struct RecordingEngine {
    ticks: ScriptedTicks,
    captured: AtomicU32,
    mutations: Mutex<Vec<(ProgramHandle, usize, u32)>>,
    callbacks: Mutex<HashMap<u8, Vec<EdgeCallback>>>,
}

impl RecordingEngine {
    /// Engine whose tick counter replays `ticks`.
    pub fn new(ticks: &[u32]) -> Self {
        Self {
            ticks: ScriptedTicks::new(ticks),
            captured: AtomicU32::new(0),
            mutations: Mutex::new(Vec::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Set the tick reported by `captured_tick`.
    pub fn set_captured(&self, tick: u32) {
        self.captured.store(tick, Ordering::SeqCst);
    }

    /// Every `mutate_segment_duration` call as `(handle, index, units)`.
    pub fn mutations(&self) -> Vec<(ProgramHandle, usize, u32)> {
        self.mutations.lock().clone()
    }

    /// Lines with at least one registered callback, ascending.
    pub fn callback_lines(&self) -> Vec<u8> {
        let mut lines: Vec<u8> = self.callbacks.lock().keys().copied().collect();
        lines.sort_unstable();
        lines
    }

    /// Invoke the callbacks registered for `event.line`.
    pub fn emit(&self, event: EdgeEvent) {
        let handlers = self
            .callbacks
            .lock()
            .get(&event.line)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(event);
        }
    }
}

impl PulseEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn load_program(&self, _program: PulseProgram) -> std::result::Result<ProgramHandle, EngineError> {
        Ok(ProgramHandle(7))
    }

    fn start_repeating(&self, _handle: ProgramHandle) -> std::result::Result<(), EngineError> {
        Ok(())
    }

    fn read_tick_counter(&self) -> u32 {
        self.ticks.read_tick()
    }

    fn captured_tick(&self, _handle: ProgramHandle) -> std::result::Result<u32, EngineError> {
        Ok(self.captured.load(Ordering::SeqCst))
    }

    fn register_edge_callback(
        &self,
        line: u8,
        callback: EdgeCallback,
    ) -> std::result::Result<(), EngineError> {
        self.callbacks.lock().entry(line).or_default().push(callback);
        Ok(())
    }

    fn mutate_segment_duration(
        &self,
        handle: ProgramHandle,
        segment_index: usize,
        duration_units: u32,
    ) -> std::result::Result<(), EngineError> {
        self.mutations
            .lock()
            .push((handle, segment_index, duration_units));
        Ok(())
    }

    fn stop(&self) {}
}
