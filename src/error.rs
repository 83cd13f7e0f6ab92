// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the pulse discipline engine.

use std::fmt;

/// Result type alias for pulse discipline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error types.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Waveform composition rejected
    Waveform(WaveformError),
    /// Pulse engine error
    Engine(EngineError),
    /// Time broadcast transport error
    Transport(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Waveform(e) => write!(f, "Waveform error: {}", e),
            Error::Engine(e) => write!(f, "Engine error: {}", e),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Waveform(e) => Some(e),
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Whether the error must abort startup before the engine is programmed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Transport(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<WaveformError> for Error {
    fn from(e: WaveformError) -> Self {
        Error::Waveform(e)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Reasons the waveform composer refuses a channel layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveformError {
    /// More channels requested than output lines exist
    ChannelLimit { limit: usize, requested: usize },
    /// Output line outside the 32-bit line mask
    InvalidLine(u8),
    /// Same output line used by two channels
    DuplicateLine(u8),
    /// A computed segment duration came out negative
    NegativeDuration {
        channel: u8,
        segment: &'static str,
        micros: i64,
    },
    /// Field validation failed
    Field { field: String, message: String },
}

impl fmt::Display for WaveformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveformError::ChannelLimit { limit, requested } => {
                write!(
                    f,
                    "Channel limit exceeded: limit={}, requested={}",
                    limit, requested
                )
            }
            WaveformError::InvalidLine(line) => {
                write!(f, "Output line {} is outside 0..32", line)
            }
            WaveformError::DuplicateLine(line) => {
                write!(f, "Output line {} is used by more than one channel", line)
            }
            WaveformError::NegativeDuration {
                channel,
                segment,
                micros,
            } => {
                write!(
                    f,
                    "Channel {}: {} segment would last {} us",
                    channel, segment, micros
                )
            }
            WaveformError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for WaveformError {}

/// Pulse engine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine could not be brought up
    InitFailed(String),
    /// Operation needs a loaded program
    NotLoaded,
    /// Handle does not refer to the loaded program
    UnknownHandle(u32),
    /// Segment is not the rewritable slack segment
    ImmutableSegment { index: usize },
    /// Program is already being played
    AlreadyRunning,
    /// Channel is not driven by the loaded program
    InvalidChannel(u8),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InitFailed(msg) => write!(f, "Initialization failed: {}", msg),
            EngineError::NotLoaded => write!(f, "No program loaded"),
            EngineError::UnknownHandle(id) => write!(f, "Unknown program handle: {}", id),
            EngineError::ImmutableSegment { index } => {
                write!(f, "Segment {} is not rewritable", index)
            }
            EngineError::AlreadyRunning => write!(f, "Program already running"),
            EngineError::InvalidChannel(line) => {
                write!(f, "Channel {} is not driven by the program", line)
            }
        }
    }
}

impl std::error::Error for EngineError {}
