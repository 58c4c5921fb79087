//! Audio-side engine: the part that runs inside the device callback
//!
//! `PlayerCore` drains the command queue between blocks, renders stems and
//! clicks through the limiter, meters the result, and publishes a snapshot
//! for the control side. Nothing here blocks, logs or allocates once the
//! core is built.

use crate::command::{AudioChannels, PlayerCommand, Retired, DEFAULT_COMMAND_CAPACITY};
use crate::effects::{Effect, Limiter, LimiterSettings};
use crate::meter::{ChannelLevels, LevelMeter};
use crate::metronome::{Metronome, MetronomeConfig};
use crate::stems::StemBank;
use crate::tempo::TempoMap;
use crate::transport::{PlaybackState, Transport};
use parking_lot::Mutex;
use std::sync::Arc;

/// Largest block rendered in one pass; longer device buffers are split
pub const MAX_BLOCK_FRAMES: usize = 2048;

/// Engine construction settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Bounded command queue size
    pub command_capacity: usize,
    pub metronome: MetronomeConfig,
    pub limiter: LimiterSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            metronome: MetronomeConfig::default(),
            limiter: LimiterSettings::default(),
        }
    }
}

/// State published by the audio thread after every callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub position: u64,
    pub track_length: u64,
    pub metronome_enabled: bool,
    pub metronome_gain_db: f32,
    pub levels: ChannelLevels,
    /// Limiter gain reduction at the end of the last block (0 or negative)
    pub gain_reduction_db: f32,
}

impl PlayerSnapshot {
    pub(crate) fn initial(config: &EngineConfig) -> Self {
        Self {
            state: PlaybackState::Stopped,
            position: 0,
            track_length: 0,
            metronome_enabled: config.metronome.enabled,
            metronome_gain_db: config.metronome.gain_db,
            levels: ChannelLevels::default(),
            gain_reduction_db: 0.0,
        }
    }
}

/// Audio thread state
pub struct PlayerCore {
    sample_rate: u32,
    transport: Transport,
    tempo: Box<TempoMap>,
    stems: StemBank,
    metronome: Metronome,
    limiter: Limiter,
    meter: LevelMeter,
    /// Frames of track audio still inside the limiter's lookahead after auto-stop
    tail_frames: usize,
    channels: AudioChannels,
    snapshot: Arc<Mutex<PlayerSnapshot>>,
}

impl PlayerCore {
    pub(crate) fn new(
        sample_rate: u32,
        config: &EngineConfig,
        channels: AudioChannels,
        snapshot: Arc<Mutex<PlayerSnapshot>>,
    ) -> Self {
        Self {
            sample_rate,
            transport: Transport::new(),
            tempo: Box::new(TempoMap::default_for(sample_rate)),
            stems: StemBank::new(),
            metronome: Metronome::new(sample_rate, config.metronome),
            limiter: Limiter::new(sample_rate as f32, config.limiter),
            meter: LevelMeter::new(),
            tail_frames: 0,
            channels,
            snapshot,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render interleaved stereo output
    ///
    /// Pending commands are applied first, so everything queued before this
    /// call takes effect for the whole buffer.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Ok(cmd) = self.channels.commands.try_recv() {
            self.handle_command(cmd);
        }

        for block in output.chunks_mut(MAX_BLOCK_FRAMES * 2) {
            self.render_block(block);
        }

        self.publish();
    }

    fn render_block(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        match self.transport.state() {
            PlaybackState::Stopped if self.tail_frames > 0 => {
                self.limiter.process(out);
                self.meter.process(out);
                self.tail_frames = self.tail_frames.saturating_sub(out.len() / 2);
                if self.tail_frames == 0 {
                    self.limiter.reset();
                }
            }
            PlaybackState::Stopped => {
                self.meter.reset();
            }
            PlaybackState::Paused => {
                // Let the limiter's lookahead drain so pausing does not cut mid-sample
                self.limiter.process(out);
                self.meter.process(out);
            }
            PlaybackState::Playing => {
                let frames = out.len() / 2;
                let mut rendered = 0;
                if let Some(span) = self.transport.advance(frames) {
                    let active = &mut out[..span.frames * 2];
                    self.stems.mix(span.start, active);
                    self.metronome.render(&self.tempo, span.start, active);
                    rendered = span.frames;
                }
                self.limiter.process(out);
                self.meter.process(out);

                // Auto-stop at the end of the track: the padding after the last
                // frame already pushed part of the lookahead out, the rest is
                // flushed by the following Stopped blocks
                if self.transport.state() == PlaybackState::Stopped {
                    self.metronome.reset();
                    self.tail_frames = self.limiter.latency().saturating_sub(frames - rendered);
                    if self.tail_frames == 0 {
                        self.limiter.reset();
                    }
                }
            }
        }
    }

    pub(crate) fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::Play => {
                // Restarting after auto-stop must not replay the flushed tail
                if self.transport.state() == PlaybackState::Stopped {
                    self.reset_dsp();
                }
                self.transport.play();
            }
            PlayerCommand::Pause => self.transport.pause(),
            PlayerCommand::Stop => {
                self.transport.stop();
                self.reset_dsp();
            }
            PlayerCommand::ResetPlayback { stems, tempo } => {
                self.transport.stop();
                self.transport.set_track_length(0);
                let old = self.stems.replace(stems);
                self.retire(Retired::Stems(old));
                let old = std::mem::replace(&mut self.tempo, tempo);
                self.retire(Retired::Tempo(old));
                self.reset_dsp();
            }
            PlayerCommand::SetPosition(sample) => {
                self.transport.set_position(sample);
                self.metronome.reset();
            }
            PlayerCommand::SetTrackLength(samples) => self.transport.set_track_length(samples),
            PlayerCommand::SetTempo(tempo) => {
                let old = std::mem::replace(&mut self.tempo, tempo);
                self.retire(Retired::Tempo(old));
                self.metronome.reset();
            }
            PlayerCommand::SetMetronomeEnabled(enabled) => self.metronome.set_enabled(enabled),
            PlayerCommand::ToggleMetronome => {
                let enabled = !self.metronome.is_enabled();
                self.metronome.set_enabled(enabled);
            }
            PlayerCommand::SetMetronomeGainDb(gain_db) => self.metronome.set_gain_db(gain_db),
            PlayerCommand::ReplaceStems(stems) => {
                let old = self.stems.replace(stems);
                self.retire(Retired::Stems(old));
            }
        }
    }

    fn reset_dsp(&mut self) {
        self.tail_frames = 0;
        self.limiter.reset();
        self.metronome.reset();
        self.meter.reset();
    }

    /// Hand a replaced object back to the control side
    fn retire(&self, retired: Retired) {
        // With the return path full the object is dropped here instead
        let _ = self.channels.retired.try_send(retired);
    }

    fn publish(&self) {
        // Skip this callback rather than wait for a reader
        if let Some(mut snapshot) = self.snapshot.try_lock() {
            *snapshot = PlayerSnapshot {
                state: self.transport.state(),
                position: self.transport.position(),
                track_length: self.transport.track_length(),
                metronome_enabled: self.metronome.is_enabled(),
                metronome_gain_db: self.metronome.gain_db(),
                levels: self.meter.levels(),
                gain_reduction_db: self.limiter.gain_reduction_db(),
            };
        }
    }
}
