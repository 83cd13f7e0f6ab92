// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Edge routing from the pulse engine into the loop and the broadcaster.
//!
//! Rising edges on the base line run correlation, the drift update and the
//! slack write under one lock. Rising edges on the trigger line send the
//! time broadcast. Falling edges are ignored.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::broadcast::TimeBroadcaster;
use crate::config::Config;
use crate::engine::{EdgeEvent, ProgramHandle, PulseEngine};
use crate::error::EngineError;
use crate::journal::DriftJournal;
use crate::sync::{DriftController, SyncState, TickClockCorrelator, WallClock};
use crate::waveform::PulseProgram;

/// Loop state guarded together with the slack write.
#[derive(Debug, Default)]
struct SyncCore {
    state: SyncState,
    journal: Option<DriftJournal>,
}

/// Callback surface installed on a [`PulseEngine`].
pub struct EdgeDispatcher {
    engine: Arc<dyn PulseEngine>,
    handle: ProgramHandle,
    slack_index: usize,
    base_line: u8,
    trigger_line: u8,
    correlator: TickClockCorrelator,
    controller: DriftController,
    clock: Arc<dyn WallClock>,
    core: Mutex<SyncCore>,
    broadcaster: Option<TimeBroadcaster>,
}

impl EdgeDispatcher {
    /// Dispatcher for `program`, already loaded into `engine` as `handle`.
    pub fn new(
        engine: Arc<dyn PulseEngine>,
        handle: ProgramHandle,
        program: &PulseProgram,
        config: &Config,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let timing = &config.timing;
        Self {
            engine,
            handle,
            slack_index: program.slack_index(),
            base_line: config.base_channel.line,
            trigger_line: config.trigger_channel.line,
            correlator: TickClockCorrelator::new(
                timing.interval_micros,
                timing.early_threshold(),
                timing.correlation_attempts,
            ),
            controller: DriftController::new(
                timing.target_slack_micros,
                timing.interval_micros,
                timing.tick_units_per_micro,
            ),
            clock,
            core: Mutex::new(SyncCore::default()),
            broadcaster: None,
        }
    }

    /// Send a time broadcast on every trigger edge.
    pub fn with_broadcaster(mut self, broadcaster: TimeBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Persist every drift record.
    pub fn with_journal(self, journal: DriftJournal) -> Self {
        self.core.lock().journal = Some(journal);
        self
    }

    /// Snapshot of the loop state.
    pub fn sync_state(&self) -> SyncState {
        self.core.lock().state.clone()
    }

    /// Register callbacks for the base and trigger lines.
    ///
    /// The engine only holds weak references, so dropping the last
    /// dispatcher handle silences the callbacks.
    pub fn install(self: &Arc<Self>) -> Result<(), EngineError> {
        for line in [self.base_line, self.trigger_line] {
            let dispatcher: Weak<Self> = Arc::downgrade(self);
            self.engine.register_edge_callback(
                line,
                Arc::new(move |event| {
                    if let Some(dispatcher) = dispatcher.upgrade() {
                        dispatcher.on_edge(event);
                    }
                }),
            )?;
        }
        debug!(
            base = self.base_line,
            trigger = self.trigger_line,
            "Edge dispatcher installed"
        );
        Ok(())
    }

    /// Route one edge.
    pub fn on_edge(&self, event: EdgeEvent) {
        if !event.is_rising() {
            return;
        }
        if event.line == self.base_line {
            self.on_base_pulse();
        } else if event.line == self.trigger_line {
            self.on_trigger();
        }
    }

    fn on_base_pulse(&self) {
        let pulse_start_tick = match self.engine.captured_tick(self.handle) {
            Ok(tick) => tick,
            Err(e) => {
                error!(error = %e, "Cannot read captured pulse tick");
                return;
            }
        };

        let mut guard = self.core.lock();
        let core = &mut *guard;
        let correlation = self
            .correlator
            .correlate(&*self.engine, &*self.clock, pulse_start_tick);
        if correlation.bracket_width > 0 {
            debug!(
                bracket = correlation.bracket_width,
                "No zero-width correlation bracket"
            );
        }

        let slack = self.controller.on_pulse_edge(&correlation, &mut core.state);
        let units = self.controller.to_hardware_units(slack);
        if let Err(e) = self
            .engine
            .mutate_segment_duration(self.handle, self.slack_index, units)
        {
            error!(error = %e, slack, "Slack write rejected");
        }

        if let (Some(journal), Some(record)) = (core.journal.as_mut(), core.state.last_record()) {
            let Some(local) = self.clock.now().to_local() else {
                warn!("Clock reading has no local time; drift record not journaled");
                return;
            };
            if let Err(e) = journal.append(local.naive_local(), record) {
                warn!(error = %e, "Drift journal write failed");
            }
        }
    }

    fn on_trigger(&self) {
        let Some(broadcaster) = &self.broadcaster else {
            return;
        };
        if let Err(e) = broadcaster.broadcast_now() {
            warn!(error = %e, "Time broadcast skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Level;
    use crate::sync::WallTime;
    use crate::test_utils::{FailingTransport, RecordingEngine, RecordingTransport, ScriptedClock};
    use crate::waveform::WaveformComposer;
    use tempfile::TempDir;

    fn program(config: &Config) -> PulseProgram {
        WaveformComposer::from_timing(&config.timing, config.cameras.lines.len())
            .build_program(&[], &config.base_channel, &config.trigger_channel)
            .unwrap()
    }

    fn dispatcher(
        engine: &Arc<RecordingEngine>,
        clock: Arc<ScriptedClock>,
    ) -> EdgeDispatcher {
        let config = Config::default();
        EdgeDispatcher::new(
            engine.clone(),
            ProgramHandle(7),
            &program(&config),
            &config,
            clock,
        )
    }

    fn edge(line: u8, level: Level) -> EdgeEvent {
        EdgeEvent {
            line,
            level,
            tick: 0,
        }
    }

    // =========================================================================
    // Base pulse route
    // =========================================================================

    #[test]
    fn test_two_cycle_scenario() {
        let engine = Arc::new(RecordingEngine::new(&[
            1_000, 1_000, 1_000_000, 1_000_000,
        ]));
        let clock = Arc::new(ScriptedClock::new(&[
            WallTime::new(100, 150_000),
            WallTime::new(101, 180_000),
        ]));
        let d = dispatcher(&engine, clock);

        engine.set_captured(1_000);
        d.on_edge(edge(4, Level::High));
        engine.set_captured(1_000_000);
        d.on_edge(edge(4, Level::High));

        // slack 50 us, then 999_930 us, four units per microsecond
        assert_eq!(
            engine.mutations(),
            vec![
                (ProgramHandle(7), 0, 200),
                (ProgramHandle(7), 0, 3_999_720)
            ]
        );
        let state = d.sync_state();
        assert!(state.initialized);
        assert_eq!(state.drift_micros, 90);
        assert_eq!(state.cycle_count, 2);
        assert_eq!(state.last_record().unwrap().offby, 180);
    }

    #[test]
    fn test_falling_and_unknown_edges_ignored() {
        let engine = Arc::new(RecordingEngine::new(&[0]));
        let clock = Arc::new(ScriptedClock::new(&[WallTime::new(0, 0)]));
        let d = dispatcher(&engine, clock.clone());

        d.on_edge(edge(4, Level::Low));
        d.on_edge(edge(12, Level::Low));
        d.on_edge(edge(21, Level::High));

        assert!(engine.mutations().is_empty());
        assert_eq!(clock.reads(), 0);
        assert_eq!(d.sync_state().cycle_count, 0);
    }

    #[test]
    fn test_journal_records_each_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(RecordingEngine::new(&[1_000, 1_000]));
        let clock = Arc::new(ScriptedClock::new(&[WallTime::new(1_704_110_400, 150_000)]));
        let d = dispatcher(&engine, clock).with_journal(DriftJournal::open(dir.path()).unwrap());

        engine.set_captured(1_000);
        d.on_edge(edge(4, Level::High));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let text = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.trim_end().ends_with(" 0 150 50"));
    }

    // =========================================================================
    // Trigger route
    // =========================================================================

    #[test]
    fn test_trigger_sends_broadcast() {
        let engine = Arc::new(RecordingEngine::new(&[0]));
        let clock = Arc::new(ScriptedClock::new(&[WallTime::new(1_704_110_400, 0)]));
        let transport = RecordingTransport::new();
        let sent = transport.sent();
        let d = dispatcher(&engine, clock.clone())
            .with_broadcaster(TimeBroadcaster::new(clock, Box::new(transport)));

        d.on_edge(edge(12, Level::High));
        d.on_edge(edge(12, Level::Low));

        assert_eq!(sent.lock().len(), 1);
        assert!(sent.lock()[0].starts_with(b"$GPRMC,"));
        assert!(engine.mutations().is_empty());
    }

    #[test]
    fn test_trigger_failure_is_not_fatal() {
        let engine = Arc::new(RecordingEngine::new(&[5, 5]));
        let clock = Arc::new(ScriptedClock::new(&[WallTime::new(0, 0)]));
        let d = dispatcher(&engine, clock.clone())
            .with_broadcaster(TimeBroadcaster::new(clock, Box::new(FailingTransport)));

        d.on_edge(edge(12, Level::High));
        engine.set_captured(5);
        d.on_edge(edge(4, Level::High));

        assert_eq!(engine.mutations().len(), 1);
    }

    // =========================================================================
    // Installation
    // =========================================================================

    #[test]
    fn test_install_registers_base_and_trigger() {
        let engine = Arc::new(RecordingEngine::new(&[1_000, 1_000]));
        let clock = Arc::new(ScriptedClock::new(&[WallTime::new(0, 150_000)]));
        let d = Arc::new(dispatcher(&engine, clock));
        d.install().unwrap();
        assert_eq!(engine.callback_lines(), vec![4, 12]);

        engine.set_captured(1_000);
        engine.emit(edge(4, Level::High));
        assert_eq!(engine.mutations().len(), 1);

        drop(d);
        engine.emit(edge(4, Level::High));
        assert_eq!(engine.mutations().len(), 1);
    }
}
