// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tick/wall-clock correlation at a pulse edge.
//!
//! The wall clock is read between two tick counter reads. The pair with
//! the narrowest bracket gives the best estimate of which tick matched
//! the wall-clock reading. A bracket of zero ticks cannot be improved on,
//! so sampling stops there.

use super::clock::{TickSource, WallClock};

/// One bracketed wall-clock read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSample {
    /// Tick read just before the wall clock.
    pub hardware_tick: u32,
    /// Wall clock, microseconds within the second.
    pub wall_clock_micros_within_second: i64,
    /// Ticks elapsed across the wall-clock read.
    pub bracket_width: u32,
}

/// Outcome of correlating one pulse edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationResult {
    /// Tick matched to `stamp_micros`.
    pub stamp_tick: u32,
    /// Wall clock within the second, shifted into the early half when past
    /// the threshold.
    pub stamp_micros: i64,
    /// Tick latched at the physical start of the pulse.
    pub pulse_start_tick: u32,
    /// Bracket width of the retained sample.
    pub bracket_width: u32,
}

impl CorrelationResult {
    /// Ticks between the pulse start and the stamp, across counter wrap.
    pub fn ticks_since_pulse(&self) -> i64 {
        i64::from(self.stamp_tick.wrapping_sub(self.pulse_start_tick) as i32)
    }
}

/// Estimates the tick value corresponding to the current wall-clock time.
#[derive(Debug, Clone)]
pub struct TickClockCorrelator {
    interval_micros: i64,
    early_threshold_micros: i64,
    max_attempts: u32,
}

impl TickClockCorrelator {
    /// Create a correlator. Readings past `early_threshold_micros` within
    /// the second are treated as early and shifted back one interval.
    pub fn new(interval_micros: u32, early_threshold_micros: u32, max_attempts: u32) -> Self {
        Self {
            interval_micros: i64::from(interval_micros),
            early_threshold_micros: i64::from(early_threshold_micros),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Take one bracketed sample.
    pub fn sample<T, C>(&self, ticks: &T, clock: &C) -> TickSample
    where
        T: TickSource + ?Sized,
        C: WallClock + ?Sized,
    {
        let tick1 = ticks.read_tick();
        let wall = clock.now();
        let tick2 = ticks.read_tick();
        TickSample {
            hardware_tick: tick1,
            wall_clock_micros_within_second: wall.micros_within_second(),
            bracket_width: tick2.wrapping_sub(tick1),
        }
    }

    /// Correlate the pulse that started at `pulse_start_tick`.
    ///
    /// Never fails: the first sample is always kept, so the result only
    /// degrades in precision when no narrow bracket is observed.
    pub fn correlate<T, C>(&self, ticks: &T, clock: &C, pulse_start_tick: u32) -> CorrelationResult
    where
        T: TickSource + ?Sized,
        C: WallClock + ?Sized,
    {
        let mut best = self.sample(ticks, clock);
        for _ in 1..self.max_attempts {
            if best.bracket_width == 0 {
                break;
            }
            let next = self.sample(ticks, clock);
            if next.bracket_width < best.bracket_width {
                best = next;
            }
        }

        let mut stamp_micros = best.wall_clock_micros_within_second;
        if stamp_micros > self.early_threshold_micros {
            stamp_micros -= self.interval_micros;
        }

        CorrelationResult {
            stamp_tick: best.hardware_tick,
            stamp_micros,
            pulse_start_tick,
            bracket_width: best.bracket_width,
        }
    }
}
