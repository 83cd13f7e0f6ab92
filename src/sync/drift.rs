// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Software phase-locked loop steering the slack segment.
//!
//! Each base-pulse edge yields an error signal `offby`: how far the wall
//! clock says the pulse is from the second boundary, net of the ticks
//! already spent handling the edge. Half of it is integrated into `drift`
//! every cycle. The next slack is the target minus both terms.
//!
//! A correction written during cycle N only reaches the outputs at the
//! start of cycle N+1, so `offby` always reflects the previous correction.
//! A full-gain integrator would overshoot; half gain settles.

use tracing::info;

use super::correlator::CorrelationResult;

/// Process-wide loop state. Mutated once per base-pulse edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Set on the first observed edge.
    pub initialized: bool,
    /// Integrated half-gain correction.
    pub drift_micros: i32,
    /// Edges handled since start.
    pub cycle_count: u64,
    last_record: Option<DriftRecord>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostic record of the most recent edge.
    pub fn last_record(&self) -> Option<&DriftRecord> {
        self.last_record.as_ref()
    }
}

/// Diagnostic row emitted once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftRecord {
    pub cycle_count: u64,
    pub drift_micros: i32,
    pub offby: i64,
    pub slack_micros: u32,
    /// Emitted on the first edge, before any correction was applied.
    pub header: bool,
}

/// Feedback controller turning correlations into slack durations.
#[derive(Debug, Clone)]
pub struct DriftController {
    target_slack_micros: i64,
    interval_micros: i64,
    tick_units_per_micro: u32,
}

impl DriftController {
    pub fn new(target_slack_micros: u32, interval_micros: u32, tick_units_per_micro: u32) -> Self {
        Self {
            target_slack_micros: i64::from(target_slack_micros),
            interval_micros: i64::from(interval_micros),
            tick_units_per_micro: tick_units_per_micro.max(1),
        }
    }

    /// Largest slack the controller ever returns.
    pub fn max_slack_micros(&self) -> u32 {
        (self.target_slack_micros + self.interval_micros).clamp(1, i64::from(u32::MAX)) as u32
    }

    /// Update `state` from one correlated edge and return the next slack in
    /// microseconds, always at least 1.
    pub fn on_pulse_edge(&self, correlation: &CorrelationResult, state: &mut SyncState) -> u32 {
        let offby = correlation.stamp_micros - correlation.ticks_since_pulse();

        let header = !state.initialized;
        if state.initialized {
            let step =
                i32::try_from(offby / 2).unwrap_or(if offby < 0 { i32::MIN } else { i32::MAX });
            state.drift_micros = state.drift_micros.saturating_add(step);
        } else {
            state.drift_micros = 0;
            state.initialized = true;
        }

        let mut slack = self.target_slack_micros - offby - i64::from(state.drift_micros);
        if slack < 0 {
            // Missed the edge; aim for the next boundary.
            slack = slack.rem_euclid(self.interval_micros);
        }
        if slack == 0 {
            slack = 1;
        }
        let slack = slack.min(i64::from(self.max_slack_micros())) as u32;

        state.cycle_count += 1;
        let record = DriftRecord {
            cycle_count: state.cycle_count,
            drift_micros: state.drift_micros,
            offby,
            slack_micros: slack,
            header,
        };
        if header {
            info!(target: "pps_discipline::drift", "#  count drift offby slack");
        } else {
            info!(
                target: "pps_discipline::drift",
                cycle = record.cycle_count,
                drift = record.drift_micros,
                offby = record.offby,
                slack = record.slack_micros,
                "Drift update"
            );
        }
        state.last_record = Some(record);

        slack
    }

    /// Slack converted to the engine's segment duration units.
    pub fn to_hardware_units(&self, slack_micros: u32) -> u32 {
        slack_micros.saturating_mul(self.tick_units_per_micro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: u32 = 1_000_000;
    const TARGET: u32 = 200;

    fn controller() -> DriftController {
        DriftController::new(TARGET, INTERVAL, 4)
    }

    fn edge(pulse_start_tick: u32, stamp_tick: u32, stamp_micros: i64) -> CorrelationResult {
        CorrelationResult {
            stamp_tick,
            stamp_micros,
            pulse_start_tick,
            bracket_width: 0,
        }
    }

    // =========================================================================
    // Reference scenario
    // =========================================================================

    #[test]
    fn test_first_edge_initializes_without_correction() {
        let mut state = SyncState::new();
        state.drift_micros = 1234;
        let slack = controller().on_pulse_edge(&edge(1000, 1000, 150), &mut state);
        assert_eq!(slack, 50);
        assert!(state.initialized);
        assert_eq!(state.drift_micros, 0);
        assert_eq!(state.cycle_count, 1);
        let record = state.last_record().unwrap();
        assert!(record.header);
        assert_eq!(record.offby, 150);
    }

    #[test]
    fn test_second_edge_wraps_to_next_boundary() {
        let c = controller();
        let mut state = SyncState::new();
        c.on_pulse_edge(&edge(1000, 1000, 150), &mut state);
        let slack = c.on_pulse_edge(&edge(1_000_000, 1_000_000, 180), &mut state);
        assert_eq!(state.drift_micros, 90);
        assert_eq!(slack, INTERVAL - 70);
        let record = state.last_record().unwrap();
        assert!(!record.header);
        assert_eq!(record.cycle_count, 2);
        assert_eq!(record.offby, 180);
        assert_eq!(record.slack_micros, INTERVAL - 70);
    }

    #[test]
    fn test_offby_subtracts_handling_ticks() {
        let mut state = SyncState::new();
        // wall clock says 300 us past the boundary, 120 us were spent since the pulse
        let slack = controller().on_pulse_edge(&edge(5_000, 5_120, 300), &mut state);
        assert_eq!(state.last_record().unwrap().offby, 180);
        assert_eq!(slack, 20);
    }

    // =========================================================================
    // Bounds
    // =========================================================================

    #[test]
    fn test_zero_slack_becomes_one() {
        let mut state = SyncState::new();
        let slack = controller().on_pulse_edge(&edge(0, 0, i64::from(TARGET)), &mut state);
        assert_eq!(slack, 1);
    }

    #[test]
    fn test_slack_bounds_over_plausible_inputs() {
        let c = controller();
        for drift in (-400_000..=400_000).step_by(50_000) {
            for offby in (-499_999i64..=500_000).step_by(9_973) {
                let mut state = SyncState {
                    initialized: true,
                    drift_micros: drift,
                    ..SyncState::default()
                };
                let slack = c.on_pulse_edge(&edge(0, 0, offby), &mut state);
                assert!(slack >= 1);
                assert!(slack <= TARGET + INTERVAL);
            }
        }
    }

    #[test]
    fn test_hardware_units() {
        assert_eq!(controller().to_hardware_units(999_930), 3_999_720);
        assert_eq!(controller().to_hardware_units(u32::MAX), u32::MAX);
    }

    // =========================================================================
    // Loop stability
    // =========================================================================

    #[test]
    fn test_constant_error_drift_moves_monotonically() {
        let c = controller();
        let mut state = SyncState::new();
        c.on_pulse_edge(&edge(0, 0, 40), &mut state);
        let mut previous = state.drift_micros;
        for _ in 0..50 {
            c.on_pulse_edge(&edge(0, 0, 40), &mut state);
            assert!(state.drift_micros >= previous);
            previous = state.drift_micros;
        }
        assert_eq!(state.drift_micros, 50 * 20);
    }

    /// Closed-loop simulation: the pulse moves by `slack - target` each
    /// cycle plus a constant rate error between tick and wall clock.
    #[test]
    fn test_closed_loop_converges() {
        let c = controller();
        for rate_error in [25i64, -40, 7] {
            let mut state = SyncState::new();
            let latency = 35i64;
            let mut phase = 400i64;
            let mut offbys = Vec::new();
            for _ in 0..80 {
                let offby = phase + latency;
                let slack = c.on_pulse_edge(&edge(0, 0, offby), &mut state);
                offbys.push(offby);
                let slack = i64::from(slack);
                let slack = if slack > i64::from(INTERVAL) / 2 {
                    slack - i64::from(INTERVAL)
                } else {
                    slack
                };
                phase += slack - i64::from(TARGET) + rate_error;
            }
            let tail = &offbys[offbys.len() - 10..];
            assert!(tail.iter().all(|o| o.abs() <= 2), "offby tail {:?}", tail);
            assert!((i64::from(state.drift_micros) - rate_error).abs() <= 2);
        }
    }
}
