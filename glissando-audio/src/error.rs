//! Error types for the stem player engine

use thiserror::Error;

/// Reasons a tempo configuration is rejected before it reaches the audio thread
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TempoError {
    #[error("BPM {0} is outside the supported range 40..=999.999")]
    BpmOutOfRange(f64),
    #[error("time signature numerator {0} is outside 1..=9")]
    NumeratorOutOfRange(u8),
    #[error("variable tempo needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("first tempo point must start at sample 0, got {0}")]
    FirstPointNotAtZero(u64),
    #[error("tempo point {index} at sample {sample} does not come after the previous point")]
    NonIncreasingPosition { index: usize, sample: u64 },
    #[error("tempo point {index} at bar {bar} does not come after the previous bar")]
    NonIncreasingBar { index: usize, bar: u32 },
}

/// Errors reported to the caller of a player command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("tempo rejected: {0}")]
    InvalidTempo(#[from] TempoError),
    #[error("command queue is full, command dropped")]
    QueueFull,
    #[error("audio engine is no longer running")]
    EngineGone,
}

/// Audio device and session errors
///
/// `DeviceLost` is fatal for the session; the engine never retries it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoDevice,
    #[error("Failed to get audio config: {0}")]
    Config(String),
    #[error("Failed to create audio stream: {0}")]
    StreamBuild(String),
    #[error("Failed to start audio: {0}")]
    StreamPlay(String),
    #[error("An audio session is already active in this process")]
    SessionActive,
    #[error("Audio session was already started")]
    AlreadyStarted,
    #[error("Audio device lost: {0}")]
    DeviceLost(String),
}

/// Result type for player commands
pub type PlayerResult<T = ()> = Result<T, PlayerError>;
