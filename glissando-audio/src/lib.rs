//! Audio engine for Glissando - multi-stem playback with a click track
//!
//! This module provides the playback pipeline:
//! - Stems: Offset stem buffers summed with gain and constant-power pan
//! - Tempo: Constant or variable tempo maps and bar/beat lookups
//! - Metronome: Synthetic clicks placed on the tempo map's beats
//! - Effects: Output limiter
//! - Transport: Play/pause/stop state machine and cursor
//! - Player: Command queue, audio-side core and control-side handle
//! - Session: Process-wide cpal output stream

mod command;
mod effects;
mod engine;
mod error;
mod meter;
mod metronome;
mod player;
mod session;
mod silence;
mod stems;
mod tempo;
mod transport;

pub use command::{PlayerCommand, DEFAULT_COMMAND_CAPACITY};
pub use effects::{Effect, Limiter, LimiterSettings};
pub use engine::{EngineConfig, PlayerCore, PlayerSnapshot, MAX_BLOCK_FRAMES};
pub use error::{AudioError, PlayerError, PlayerResult, TempoError};
pub use meter::{db_to_linear, linear_to_db, ChannelLevels, LevelMeter, SILENCE_DB};
pub use metronome::{Metronome, MetronomeConfig};
pub use player::{PlayerHandle, StemPlayer};
pub use session::AudioSession;
pub use silence::{SilenceDetector, SilenceRegion};
pub use stems::{pan_gains, MuteSolo, Stem, StemAudio, StemBank, StemInfo, StemSet};
pub use tempo::{
    Click, MusicalPosition, TempoKind, TempoMap, TempoPoint, DEFAULT_BPM, DEFAULT_NUMERATOR,
    MAX_BPM, MAX_NUMERATOR, MIN_BPM,
};
pub use transport::{BlockSpan, PlaybackState, Transport};
