// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Waveform segments and the repeating pulse program.
//!
//! A [`PulseProgram`] stores every channel's segments in one contiguous
//! arena. Each [`ChannelTrack`] names the slice belonging to one output
//! line. Exactly one segment, the slack segment, may change after the
//! program is built, and only through [`SlackSlot`].

use serde::Serialize;

use crate::error::WaveformError;

/// Number of addressable output lines.
pub const MAX_LINES: u8 = 32;

/// Bitset of output lines, bit `n` = line `n`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LineMask(u32);

impl LineMask {
    /// Mask with no lines set.
    pub const EMPTY: LineMask = LineMask(0);

    /// Mask for a single output line.
    ///
    /// # Errors
    ///
    /// Returns [`WaveformError::InvalidLine`] if `line >= 32`.
    pub fn line(line: u8) -> Result<Self, WaveformError> {
        if line >= MAX_LINES {
            return Err(WaveformError::InvalidLine(line));
        }
        Ok(LineMask(1 << line))
    }

    /// Raw bit pattern.
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, line: u8) -> bool {
        line < MAX_LINES && self.0 & (1 << line) != 0
    }

    pub fn union(self, other: LineMask) -> LineMask {
        LineMask(self.0 | other.0)
    }

    /// Iterate over the set lines in ascending order.
    pub fn lines(self) -> impl Iterator<Item = u8> {
        (0..MAX_LINES).filter(move |&l| self.contains(l))
    }
}

/// One step of the pulse program.
///
/// At the start of the segment the lines in `mask_on` go high and the
/// lines in `mask_off` go low; the levels then hold for `duration_micros`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaveformSegment {
    /// Lines driven high at segment start.
    pub mask_on: LineMask,
    /// Lines driven low at segment start.
    pub mask_off: LineMask,
    /// How long the levels hold.
    pub duration_micros: u32,
    /// Latch the hardware tick when this segment starts.
    pub capture_tick_on_start: bool,
}

impl WaveformSegment {
    /// Hold `mask` low for `duration_micros`.
    pub fn idle(mask: LineMask, duration_micros: u32) -> Self {
        Self {
            mask_on: LineMask::EMPTY,
            mask_off: mask,
            duration_micros,
            capture_tick_on_start: false,
        }
    }

    /// Hold `mask` high for `duration_micros`.
    pub fn active(mask: LineMask, duration_micros: u32) -> Self {
        Self {
            mask_on: mask,
            mask_off: LineMask::EMPTY,
            duration_micros,
            capture_tick_on_start: false,
        }
    }

    /// Same segment, latching the tick counter at its start.
    pub fn capturing(mut self) -> Self {
        self.capture_tick_on_start = true;
        self
    }
}

/// What a channel is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// The disciplined once-per-interval pulse.
    Base,
    /// Fires the time broadcast shortly after the base pulse.
    BroadcastTrigger,
    /// Phase-offset camera trigger train.
    Camera { index: usize },
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRole::Base => write!(f, "base"),
            ChannelRole::BroadcastTrigger => write!(f, "trigger"),
            ChannelRole::Camera { index } => write!(f, "cam{}", index),
        }
    }
}

/// The slice of the segment arena that drives one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelTrack {
    /// Output line.
    pub line: u8,
    /// Channel role.
    pub role: ChannelRole,
    /// First segment index in the arena.
    pub start: usize,
    /// Number of segments.
    pub len: usize,
}

impl ChannelTrack {
    /// Arena indices covered by this track.
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// A complete, repeating multi-channel pulse program.
///
/// # Invariants
///
/// - every track's segment durations sum to `interval_micros`, counting
///   the slack segment at its nominal length
/// - the slack segment duration is never zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PulseProgram {
    interval_micros: u32,
    segments: Vec<WaveformSegment>,
    tracks: Vec<ChannelTrack>,
    slack_index: usize,
    nominal_slack_micros: u32,
}

impl PulseProgram {
    /// Nominal period of one traversal.
    pub fn interval_micros(&self) -> u32 {
        self.interval_micros
    }

    /// All segments in arena order.
    pub fn segments(&self) -> &[WaveformSegment] {
        &self.segments
    }

    pub fn tracks(&self) -> &[ChannelTrack] {
        &self.tracks
    }

    /// Track driving `line`, if any.
    pub fn track(&self, line: u8) -> Option<&ChannelTrack> {
        self.tracks.iter().find(|t| t.line == line)
    }

    /// Track with the given role, if any.
    pub fn track_by_role(&self, role: ChannelRole) -> Option<&ChannelTrack> {
        self.tracks.iter().find(|t| t.role == role)
    }

    /// Segments of one track.
    pub fn track_segments(&self, track: &ChannelTrack) -> &[WaveformSegment] {
        &self.segments[track.indices()]
    }

    /// Union of every line the program drives.
    pub fn line_mask(&self) -> LineMask {
        self.segments
            .iter()
            .fold(LineMask::EMPTY, |acc, s| acc.union(s.mask_on).union(s.mask_off))
    }

    /// Period of the channel on `line`, counting the slack segment at its
    /// nominal length. The difference between nominal and live slack is the
    /// implicit interval remainder.
    pub fn channel_period_micros(&self, line: u8) -> Option<u64> {
        let track = self.track(line)?;
        Some(
            track
                .indices()
                .map(|i| {
                    if i == self.slack_index {
                        u64::from(self.nominal_slack_micros)
                    } else {
                        u64::from(self.segments[i].duration_micros)
                    }
                })
                .sum(),
        )
    }

    /// Arena index of the rewritable slack segment.
    pub fn slack_index(&self) -> usize {
        self.slack_index
    }

    /// Current slack duration.
    pub fn slack_micros(&self) -> u32 {
        self.segments[self.slack_index].duration_micros
    }

    /// Slack duration the program was built with.
    pub fn nominal_slack_micros(&self) -> u32 {
        self.nominal_slack_micros
    }

    /// Arena index of the first tick-capturing segment.
    pub fn capture_index(&self) -> Option<usize> {
        self.segments.iter().position(|s| s.capture_tick_on_start)
    }

    /// Write access to the slack segment, and nothing else.
    pub fn slack_slot(&mut self) -> SlackSlot<'_> {
        SlackSlot {
            segment: &mut self.segments[self.slack_index],
        }
    }
}

/// Narrow accessor for the one mutable segment of a [`PulseProgram`].
#[derive(Debug)]
pub struct SlackSlot<'a> {
    segment: &'a mut WaveformSegment,
}

impl SlackSlot<'_> {
    pub fn get(&self) -> u32 {
        self.segment.duration_micros
    }

    /// Set the slack duration. Zero is raised to one microsecond.
    pub fn set(&mut self, micros: u32) {
        self.segment.duration_micros = micros.max(1);
    }
}

/// Incremental construction of a [`PulseProgram`].
#[derive(Debug, Default)]
pub(crate) struct ProgramBuilder {
    segments: Vec<WaveformSegment>,
    tracks: Vec<ChannelTrack>,
    slack_index: Option<usize>,
}

impl ProgramBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a channel track. If `slack_at` is set, that offset within the
    /// track becomes the program's slack segment.
    pub(crate) fn push_track(
        &mut self,
        line: u8,
        role: ChannelRole,
        segments: Vec<WaveformSegment>,
        slack_at: Option<usize>,
    ) -> &mut Self {
        let start = self.segments.len();
        if let Some(offset) = slack_at {
            self.slack_index = Some(start + offset);
        }
        self.tracks.push(ChannelTrack {
            line,
            role,
            start,
            len: segments.len(),
        });
        self.segments.extend(segments);
        self
    }

    pub(crate) fn finish(self, interval_micros: u32) -> Result<PulseProgram, WaveformError> {
        let slack_index = self.slack_index.ok_or_else(|| WaveformError::Field {
            field: "slack".into(),
            message: "program has no slack segment".into(),
        })?;
        let nominal_slack_micros = self.segments[slack_index].duration_micros;
        if nominal_slack_micros == 0 {
            return Err(WaveformError::Field {
                field: "slack".into(),
                message: "slack segment must be longer than zero".into(),
            });
        }
        let program = PulseProgram {
            interval_micros,
            segments: self.segments,
            tracks: self.tracks,
            slack_index,
            nominal_slack_micros,
        };
        for track in &program.tracks {
            let period = program.channel_period_micros(track.line).unwrap_or(0);
            if period != u64::from(interval_micros) {
                return Err(WaveformError::Field {
                    field: format!("channel {}", track.line),
                    message: format!("period is {} us, expected {}", period, interval_micros),
                });
            }
        }
        Ok(program)
    }
}
