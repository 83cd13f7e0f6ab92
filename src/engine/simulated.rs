// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Software pulse engine.
//!
//! Plays a [`PulseProgram`] on a tokio timer task instead of DMA hardware.
//! Lines are not physically driven; edges are delivered to registered
//! callbacks at the time the hardware would have produced them, and the
//! tick counter is the elapsed time since the engine was created.
//!
//! Every track starts with a slack-length idle segment, so the live slack
//! delays all channels of a traversal equally, exactly like the single
//! merged timeline the hardware plays.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::r#trait::{EdgeCallback, EdgeEvent, Level, ProgramHandle, PulseEngine};
use crate::error::EngineError;
use crate::waveform::segment::MAX_LINES;
use crate::waveform::PulseProgram;

/// One scheduled output event within a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledEdge {
    offset_micros: u64,
    line: u8,
    level: Option<Level>,
    capture: bool,
}

/// Edge schedule of one traversal with the program's live slack, plus the
/// traversal length.
fn edge_schedule(program: &PulseProgram) -> (Vec<ScheduledEdge>, u64) {
    let nominal = u64::from(program.nominal_slack_micros());
    let live = u64::from(program.slack_micros());
    let segments = program.segments();
    let mut edges = Vec::new();

    for track in program.tracks() {
        let mut level = Level::Low;
        let mut at = 0u64;
        for (n, i) in track.indices().enumerate() {
            let seg = &segments[i];
            let next = if seg.mask_on.contains(track.line) {
                Level::High
            } else if seg.mask_off.contains(track.line) {
                Level::Low
            } else {
                level
            };
            let transition = (next != level).then_some(next);
            if transition.is_some() || seg.capture_tick_on_start {
                edges.push(ScheduledEdge {
                    offset_micros: at,
                    line: track.line,
                    level: transition,
                    capture: seg.capture_tick_on_start,
                });
            }
            level = next;
            at += if n == 0 {
                live
            } else {
                u64::from(seg.duration_micros)
            };
        }
    }

    edges.sort_by_key(|e| (e.offset_micros, e.line));
    let cycle = u64::from(program.interval_micros()) + live - nominal;
    (edges, cycle)
}

#[derive(Debug)]
struct Playback {
    program: Option<PulseProgram>,
    handle: Option<ProgramHandle>,
    next_handle: u32,
    running: bool,
}

struct Shared {
    origin: Instant,
    units_per_micro: u32,
    playback: Mutex<Playback>,
    captured: AtomicU32,
    callbacks: RwLock<HashMap<u8, Vec<EdgeCallback>>>,
}

impl Shared {
    fn tick_at(&self, at: Instant) -> u32 {
        at.saturating_duration_since(self.origin).as_micros() as u32
    }

    fn fire(&self, event: EdgeEvent) {
        let handlers = self
            .callbacks
            .read()
            .get(&event.line)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(event);
        }
    }
}

/// Pulse engine that plays programs in software.
pub struct SimulatedEngine {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedEngine {
    /// Create an engine whose segment durations are expressed in
    /// `units_per_micro` units per microsecond.
    pub fn new(units_per_micro: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                origin: Instant::now(),
                units_per_micro: units_per_micro.max(1),
                playback: Mutex::new(Playback {
                    program: None,
                    handle: None,
                    next_handle: 0,
                    running: false,
                }),
                captured: AtomicU32::new(0),
                callbacks: RwLock::new(HashMap::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Copy of the loaded program, including the live slack.
    pub fn program(&self) -> Option<PulseProgram> {
        self.shared.playback.lock().program.clone()
    }

    fn check_handle(playback: &Playback, handle: ProgramHandle) -> Result<(), EngineError> {
        match playback.handle {
            Some(h) if h == handle => Ok(()),
            Some(_) => Err(EngineError::UnknownHandle(handle.0)),
            None => Err(EngineError::NotLoaded),
        }
    }
}

async fn play(shared: Arc<Shared>, mut cycle_start: Instant) {
    let mut traversals = 0u64;
    loop {
        tokio::time::sleep_until(cycle_start).await;
        let (edges, cycle_micros) = {
            let playback = shared.playback.lock();
            match (&playback.program, playback.running) {
                (Some(program), true) => edge_schedule(program),
                _ => return,
            }
        };

        for edge in edges {
            let at = cycle_start + Duration::from_micros(edge.offset_micros);
            tokio::time::sleep_until(at).await;
            let tick = shared.tick_at(at);
            if edge.capture {
                shared.captured.store(tick, Ordering::Release);
            }
            if let Some(level) = edge.level {
                shared.fire(EdgeEvent {
                    line: edge.line,
                    level,
                    tick,
                });
            }
        }

        traversals += 1;
        debug!(traversal = traversals, cycle_micros, "Traversal scheduled");
        cycle_start += Duration::from_micros(cycle_micros);
    }
}

impl PulseEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn load_program(&self, program: PulseProgram) -> Result<ProgramHandle, EngineError> {
        let mut playback = self.shared.playback.lock();
        if playback.running {
            return Err(EngineError::AlreadyRunning);
        }
        let handle = ProgramHandle(playback.next_handle);
        playback.next_handle += 1;
        info!(
            handle = handle.0,
            segments = program.segments().len(),
            tracks = program.tracks().len(),
            "Program loaded"
        );
        playback.program = Some(program);
        playback.handle = Some(handle);
        Ok(handle)
    }

    fn start_repeating(&self, handle: ProgramHandle) -> Result<(), EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::InitFailed(format!("no async runtime: {}", e)))?;
        {
            let mut playback = self.shared.playback.lock();
            Self::check_handle(&playback, handle)?;
            if playback.running {
                return Err(EngineError::AlreadyRunning);
            }
            playback.running = true;
        }
        let task = runtime.spawn(play(self.shared.clone(), Instant::now()));
        *self.task.lock() = Some(task);
        info!(handle = handle.0, "Playback started");
        Ok(())
    }

    fn read_tick_counter(&self) -> u32 {
        self.shared.tick_at(Instant::now())
    }

    fn captured_tick(&self, handle: ProgramHandle) -> Result<u32, EngineError> {
        Self::check_handle(&self.shared.playback.lock(), handle)?;
        Ok(self.shared.captured.load(Ordering::Acquire))
    }

    fn register_edge_callback(&self, line: u8, callback: EdgeCallback) -> Result<(), EngineError> {
        if line >= MAX_LINES {
            return Err(EngineError::InvalidChannel(line));
        }
        self.shared
            .callbacks
            .write()
            .entry(line)
            .or_default()
            .push(callback);
        debug!(line, "Edge callback registered");
        Ok(())
    }

    fn mutate_segment_duration(
        &self,
        handle: ProgramHandle,
        segment_index: usize,
        duration_units: u32,
    ) -> Result<(), EngineError> {
        let mut playback = self.shared.playback.lock();
        Self::check_handle(&playback, handle)?;
        let program = playback.program.as_mut().ok_or(EngineError::NotLoaded)?;
        if segment_index != program.slack_index() {
            return Err(EngineError::ImmutableSegment {
                index: segment_index,
            });
        }
        program
            .slack_slot()
            .set(duration_units / self.shared.units_per_micro);
        Ok(())
    }

    fn stop(&self) {
        self.shared.playback.lock().running = false;
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Playback stopped");
        } else {
            warn!("Stop requested but playback was not running");
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
