// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. pps.yaml file
//! 3. Environment variables (PPS_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;

use crate::error::{Error, Result};
use crate::waveform::segment::MAX_LINES;
use crate::waveform::ChannelSpec;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cycle timing and loop parameters
    #[serde(default)]
    pub timing: TimingConfig,

    /// Disciplined pulse channel
    #[serde(default)]
    pub base_channel: BaseChannelConfig,

    /// Time broadcast trigger channel
    #[serde(default)]
    pub trigger_channel: TriggerChannelConfig,

    /// Camera trigger channels
    #[serde(default)]
    pub cameras: CameraConfig,

    /// Time broadcast destination
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pulse engine selection
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &["pps.yaml", "pps.yml", "/etc/pps-discipline/config.yaml"] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PPS_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("PPS_DRIFT_LOG_DIR") {
            self.logging.drift_log_dir = Some(val);
        }
        if let Ok(val) = env::var("PPS_BROADCAST_ADDRESS") {
            self.broadcast.address = val;
        }
        if let Ok(val) = env::var("PPS_BROADCAST_PORT") {
            if let Ok(port) = val.parse() {
                self.broadcast.port = port;
            }
        }
        if let Ok(val) = env::var("PPS_BROADCAST_ENABLED") {
            self.broadcast.enabled = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("PPS_TARGET_SLACK_MICROS") {
            if let Ok(slack) = val.parse() {
                self.timing.target_slack_micros = slack;
            }
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        if t.interval_micros == 0 {
            return Err(Error::Config("interval_micros cannot be 0".into()));
        }
        if t.target_slack_micros == 0 {
            return Err(Error::Config("target_slack_micros cannot be 0".into()));
        }
        if t.correlation_attempts == 0 {
            return Err(Error::Config("correlation_attempts cannot be 0".into()));
        }
        if t.tick_units_per_micro == 0 {
            return Err(Error::Config("tick_units_per_micro cannot be 0".into()));
        }
        if let Some(threshold) = t.early_threshold_micros {
            if threshold >= t.interval_micros {
                return Err(Error::Config(
                    "early_threshold_micros must be below interval_micros".into(),
                ));
            }
        }

        let base_used =
            u64::from(t.target_slack_micros) + u64::from(self.base_channel.pulse_width_micros);
        if self.base_channel.pulse_width_micros == 0 || base_used >= u64::from(t.interval_micros)
        {
            return Err(Error::Config(format!(
                "base pulse of {} us plus slack does not fit in the interval",
                self.base_channel.pulse_width_micros
            )));
        }
        let trigger_used = base_used
            + u64::from(self.trigger_channel.settle_delay_micros)
            + u64::from(self.trigger_channel.pulse_width_micros);
        if self.trigger_channel.pulse_width_micros == 0
            || trigger_used > u64::from(t.interval_micros)
        {
            return Err(Error::Config(format!(
                "trigger pulse of {} us after {} us settle does not fit in the interval",
                self.trigger_channel.pulse_width_micros, self.trigger_channel.settle_delay_micros
            )));
        }

        let mut seen = HashSet::new();
        let lines = [self.base_channel.line, self.trigger_channel.line]
            .into_iter()
            .chain(self.cameras.lines.iter().copied());
        for line in lines {
            if line >= MAX_LINES {
                return Err(Error::Config(format!("output line {} is out of range", line)));
            }
            if !seen.insert(line) {
                return Err(Error::Config(format!("output line {} is configured twice", line)));
            }
        }

        if self.cameras.pulses_per_second == 0 {
            return Err(Error::Config("cameras.pulses_per_second cannot be 0".into()));
        }
        if self.broadcast.enabled && self.broadcast.port == 0 {
            return Err(Error::Config("broadcast port cannot be 0".into()));
        }
        Ok(())
    }

    /// Camera channel specs for the configured phases.
    ///
    /// Phases beyond the number of camera lines are dropped; the second
    /// value is how many were dropped.
    pub fn camera_specs(&self) -> (Vec<ChannelSpec>, usize) {
        let phases = &self.cameras.phases_degrees;
        let kept = phases.len().min(self.cameras.lines.len());
        let specs = self
            .cameras
            .lines
            .iter()
            .zip(phases.iter())
            .map(|(&line, &phase)| ChannelSpec {
                channel_id: line,
                phase_offset_degrees: phase,
                pulse_width_micros: self.cameras.pulse_width_micros,
                pulses_per_second: self.cameras.pulses_per_second,
            })
            .collect();
        (specs, phases.len() - kept)
    }
}

/// Cycle timing and feedback loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Nominal cycle length
    #[serde(default = "default_interval")]
    pub interval_micros: u32,

    /// Idle gap before the base pulse the loop steers toward
    #[serde(default = "default_target_slack")]
    pub target_slack_micros: u32,

    /// Bracketed clock reads per edge
    #[serde(default = "default_correlation_attempts")]
    pub correlation_attempts: u32,

    /// Hardware duration units per microsecond for the slack segment
    #[serde(default = "default_tick_units_per_micro")]
    pub tick_units_per_micro: u32,

    /// Readings past this point in the second count as early (defaults to half the interval)
    #[serde(default)]
    pub early_threshold_micros: Option<u32>,
}

impl TimingConfig {
    /// Effective early-reading threshold.
    pub fn early_threshold(&self) -> u32 {
        self.early_threshold_micros
            .unwrap_or(self.interval_micros / 2)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interval_micros: default_interval(),
            target_slack_micros: default_target_slack(),
            correlation_attempts: default_correlation_attempts(),
            tick_units_per_micro: default_tick_units_per_micro(),
            early_threshold_micros: None,
        }
    }
}

fn default_interval() -> u32 {
    1_000_000
}

fn default_target_slack() -> u32 {
    200
}

fn default_correlation_attempts() -> u32 {
    10
}

fn default_tick_units_per_micro() -> u32 {
    4
}

/// Disciplined pulse channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseChannelConfig {
    /// Output line
    #[serde(default = "default_base_line")]
    pub line: u8,

    /// High time of the pulse
    #[serde(default = "default_base_pulse_width")]
    pub pulse_width_micros: u32,
}

impl Default for BaseChannelConfig {
    fn default() -> Self {
        Self {
            line: default_base_line(),
            pulse_width_micros: default_base_pulse_width(),
        }
    }
}

fn default_base_line() -> u8 {
    4
}

fn default_base_pulse_width() -> u32 {
    10_000
}

/// Time broadcast trigger channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerChannelConfig {
    /// Output line
    #[serde(default = "default_trigger_line")]
    pub line: u8,

    /// High time of the trigger pulse
    #[serde(default = "default_trigger_pulse_width")]
    pub pulse_width_micros: u32,

    /// Delay after the end of the base pulse before the trigger fires
    #[serde(default = "default_settle_delay")]
    pub settle_delay_micros: u32,
}

impl Default for TriggerChannelConfig {
    fn default() -> Self {
        Self {
            line: default_trigger_line(),
            pulse_width_micros: default_trigger_pulse_width(),
            settle_delay_micros: default_settle_delay(),
        }
    }
}

fn default_trigger_line() -> u8 {
    12
}

fn default_trigger_pulse_width() -> u32 {
    200
}

fn default_settle_delay() -> u32 {
    100_000
}

/// Camera trigger channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Available output lines, in camera order
    #[serde(default = "default_camera_lines")]
    pub lines: Vec<u8>,

    /// High time of each trigger pulse
    #[serde(default = "default_trigger_pulse_width")]
    pub pulse_width_micros: u32,

    /// Trigger pulses per interval
    #[serde(default = "default_camera_rate")]
    pub pulses_per_second: u32,

    /// Phase offset per camera in degrees of its repetition period
    #[serde(default)]
    pub phases_degrees: Vec<f64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            lines: default_camera_lines(),
            pulse_width_micros: default_trigger_pulse_width(),
            pulses_per_second: default_camera_rate(),
            phases_degrees: Vec::new(),
        }
    }
}

fn default_camera_lines() -> Vec<u8> {
    vec![21, 5, 6, 13, 25, 26]
}

fn default_camera_rate() -> u32 {
    10
}

/// Time broadcast destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Send the time broadcast
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Destination address
    #[serde(default = "default_broadcast_address")]
    pub address: String,

    /// Destination port
    #[serde(default = "default_broadcast_port")]
    pub port: u16,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_broadcast_address(),
            port: default_broadcast_port(),
        }
    }
}

fn default_broadcast_address() -> String {
    "255.255.255.255".into()
}

fn default_broadcast_port() -> u16 {
    10110
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the per-day drift journal (disabled if unset)
    #[serde(default)]
    pub drift_log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            drift_log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Which pulse engine drives the outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Software playback on a timer task
    #[default]
    Simulated,
}

/// Pulse engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
}
