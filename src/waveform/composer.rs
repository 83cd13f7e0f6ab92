// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Builds the repeating multi-channel pulse program.
//!
//! Every channel starts with a `slack` idle segment. On the base channel
//! that segment is the program's slack segment; the drift controller
//! rewrites it each cycle to steer the phase of the next base pulse.
//! Every other segment keeps its composed duration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::segment::{ChannelRole, LineMask, ProgramBuilder, PulseProgram, WaveformSegment};
use crate::config::{BaseChannelConfig, TimingConfig, TriggerChannelConfig};
use crate::error::WaveformError;

/// Declarative description of one camera trigger channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Output line driven by this channel.
    pub channel_id: u8,
    /// Trigger delay in degrees of the repetition period, `[0, 360)`.
    pub phase_offset_degrees: f64,
    /// High time of each trigger pulse.
    pub pulse_width_micros: u32,
    /// Trigger pulses per interval.
    pub pulses_per_second: u32,
}

impl ChannelSpec {
    /// Length of one trigger repetition.
    ///
    /// # Errors
    ///
    /// The rate must be non-zero and divide the interval exactly.
    pub fn repetition_period_micros(&self, interval_micros: u32) -> Result<u32, WaveformError> {
        if self.pulses_per_second == 0 || interval_micros % self.pulses_per_second != 0 {
            return Err(WaveformError::Field {
                field: format!("channel {} pulses_per_second", self.channel_id),
                message: format!(
                    "{} does not evenly divide the {} us interval",
                    self.pulses_per_second, interval_micros
                ),
            });
        }
        Ok(interval_micros / self.pulses_per_second)
    }

    /// Phase offset converted to microseconds, truncated.
    ///
    /// # Errors
    ///
    /// The offset must be a finite value in `[0, 360)`.
    pub fn phase_micros(&self, repetition_period_micros: u32) -> Result<u32, WaveformError> {
        let degrees = self.phase_offset_degrees;
        if !degrees.is_finite() || !(0.0..360.0).contains(&degrees) {
            return Err(WaveformError::Field {
                field: format!("channel {} phase_offset_degrees", self.channel_id),
                message: format!("{} is outside [0, 360)", degrees),
            });
        }
        Ok((f64::from(repetition_period_micros) * degrees / 360.0) as u32)
    }
}

/// Composes pulse programs for a fixed interval and slack.
#[derive(Debug, Clone)]
pub struct WaveformComposer {
    interval_micros: u32,
    slack_micros: u32,
    max_channels: usize,
}

impl WaveformComposer {
    /// Create a composer.
    ///
    /// `max_channels` is the number of output lines available to camera
    /// channels.
    pub fn new(interval_micros: u32, slack_micros: u32, max_channels: usize) -> Self {
        Self {
            interval_micros,
            slack_micros,
            max_channels,
        }
    }

    /// Composer for the configured timing.
    pub fn from_timing(timing: &TimingConfig, max_channels: usize) -> Self {
        Self::new(timing.interval_micros, timing.target_slack_micros, max_channels)
    }

    /// Build the full program: base channel, broadcast trigger channel, then
    /// one track per camera channel in order.
    ///
    /// # Errors
    ///
    /// - more camera channels than `max_channels`
    /// - an output line out of range or used twice
    /// - any computed segment duration below zero
    pub fn build_program(
        &self,
        channels: &[ChannelSpec],
        base: &BaseChannelConfig,
        trigger: &TriggerChannelConfig,
    ) -> Result<PulseProgram, WaveformError> {
        if channels.len() > self.max_channels {
            return Err(WaveformError::ChannelLimit {
                limit: self.max_channels,
                requested: channels.len(),
            });
        }

        let mut seen = HashSet::new();
        for line in [base.line, trigger.line]
            .into_iter()
            .chain(channels.iter().map(|c| c.channel_id))
        {
            LineMask::line(line)?;
            if !seen.insert(line) {
                return Err(WaveformError::DuplicateLine(line));
            }
        }

        let mut builder = ProgramBuilder::new();
        builder.push_track(base.line, ChannelRole::Base, self.base_track(base)?, Some(0));
        builder.push_track(
            trigger.line,
            ChannelRole::BroadcastTrigger,
            self.trigger_track(base, trigger)?,
            None,
        );
        for (index, spec) in channels.iter().enumerate() {
            builder.push_track(
                spec.channel_id,
                ChannelRole::Camera { index },
                self.camera_track(spec)?,
                None,
            );
        }

        let program = builder.finish(self.interval_micros)?;
        debug!(
            segments = program.segments().len(),
            tracks = program.tracks().len(),
            "Composed pulse program"
        );
        Ok(program)
    }

    /// Slack idle, captured pulse, idle remainder.
    fn base_track(&self, base: &BaseChannelConfig) -> Result<Vec<WaveformSegment>, WaveformError> {
        let mask = LineMask::line(base.line)?;
        let remainder = self.remaining(
            base.line,
            "remainder",
            &[self.slack_micros, base.pulse_width_micros],
        )?;
        Ok(vec![
            WaveformSegment::idle(mask, self.slack_micros),
            WaveformSegment::active(mask, base.pulse_width_micros).capturing(),
            WaveformSegment::idle(mask, remainder),
        ])
    }

    /// Slack idle, idle through the base pulse plus settle delay, trigger
    /// pulse, idle remainder.
    fn trigger_track(
        &self,
        base: &BaseChannelConfig,
        trigger: &TriggerChannelConfig,
    ) -> Result<Vec<WaveformSegment>, WaveformError> {
        let mask = LineMask::line(trigger.line)?;
        let wait = checked_sum(
            trigger.line,
            "settle",
            &[base.pulse_width_micros, trigger.settle_delay_micros],
        )?;
        let remainder = self.remaining(
            trigger.line,
            "remainder",
            &[self.slack_micros, wait, trigger.pulse_width_micros],
        )?;
        Ok(vec![
            WaveformSegment::idle(mask, self.slack_micros),
            WaveformSegment::idle(mask, wait),
            WaveformSegment::active(mask, trigger.pulse_width_micros),
            WaveformSegment::idle(mask, remainder),
        ])
    }

    /// Slack idle, phase idle, then `pulses_per_second` repetitions of
    /// pulse + idle. The last idle returns the leading slack and phase.
    fn camera_track(&self, spec: &ChannelSpec) -> Result<Vec<WaveformSegment>, WaveformError> {
        let line = spec.channel_id;
        let mask = LineMask::line(line)?;
        let period = spec.repetition_period_micros(self.interval_micros)?;
        let phase = spec.phase_micros(period)?;

        if spec.pulse_width_micros == 0 {
            return Err(WaveformError::Field {
                field: format!("channel {} pulse_width_micros", line),
                message: "must be greater than 0".into(),
            });
        }
        let gap = i64::from(period) - i64::from(spec.pulse_width_micros);
        if gap < 0 {
            return Err(WaveformError::NegativeDuration {
                channel: line,
                segment: "repetition idle",
                micros: gap,
            });
        }
        let last_gap = gap - i64::from(self.slack_micros) - i64::from(phase);
        if last_gap < 0 {
            return Err(WaveformError::NegativeDuration {
                channel: line,
                segment: "final idle",
                micros: last_gap,
            });
        }

        let repetitions = spec.pulses_per_second as usize;
        let mut segments = Vec::with_capacity(2 + 2 * repetitions);
        segments.push(WaveformSegment::idle(mask, self.slack_micros));
        segments.push(WaveformSegment::idle(mask, phase));
        for i in 0..repetitions {
            segments.push(WaveformSegment::active(mask, spec.pulse_width_micros));
            let idle = if i + 1 == repetitions { last_gap } else { gap };
            segments.push(WaveformSegment::idle(mask, idle as u32));
        }
        Ok(segments)
    }

    /// `interval - sum(used)`, rejected if negative.
    fn remaining(
        &self,
        line: u8,
        segment: &'static str,
        used: &[u32],
    ) -> Result<u32, WaveformError> {
        let used: i64 = used.iter().map(|&d| i64::from(d)).sum();
        let rest = i64::from(self.interval_micros) - used;
        if rest < 0 {
            return Err(WaveformError::NegativeDuration {
                channel: line,
                segment,
                micros: rest,
            });
        }
        Ok(rest as u32)
    }
}

fn checked_sum(line: u8, segment: &'static str, parts: &[u32]) -> Result<u32, WaveformError> {
    let total: u64 = parts.iter().map(|&d| u64::from(d)).sum();
    u32::try_from(total).map_err(|_| WaveformError::Field {
        field: format!("channel {} {}", line, segment),
        message: format!("{} us overflows a segment duration", total),
    })
}
