//! Control-side player API
//!
//! [`StemPlayer`] is the capability surface the embedding application
//! drives. [`PlayerHandle`] implements it by validating each request,
//! turning it into a [`PlayerCommand`], and answering queries from the
//! snapshot the audio thread publishes plus its own record of accepted
//! configuration. A rejected or undeliverable command leaves that record
//! untouched.

use crate::command::{create_channels, PlayerCommand, Retired};
use crate::engine::{EngineConfig, PlayerCore, PlayerSnapshot};
use crate::error::{PlayerError, PlayerResult};
use crate::metronome::MetronomeConfig;
use crate::stems::{MuteSolo, Stem, StemAudio, StemInfo, StemSet};
use crate::tempo::{MusicalPosition, TempoMap, TempoPoint};
use crate::transport::PlaybackState;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Capability surface of a multi-stem player
///
/// Commands return once queued; they take effect at the next audio block
/// boundary in the order they were issued. Queries report the state as of
/// the most recently rendered block, except for configuration the caller
/// set itself (track length, tempo, metronome), which reads back the last
/// accepted value.
pub trait StemPlayer {
    fn play(&mut self) -> PlayerResult;
    fn pause(&mut self) -> PlayerResult;
    /// Stop and rewind to sample 0
    fn stop(&mut self) -> PlayerResult;
    /// Stop and unload the current song (stems, length and tempo)
    fn reset_playback(&mut self) -> PlayerResult;
    fn playback_state(&self) -> PlaybackState;

    /// Move the cursor; out-of-range positions clamp to the track
    fn set_playback_position(&mut self, sample: i64) -> PlayerResult;
    fn playback_position(&self) -> u64;
    fn sample_rate(&self) -> u32;

    fn set_track_length(&mut self, samples: u64) -> PlayerResult;
    fn track_length(&self) -> u64;

    fn set_track_bpm(&mut self, bpm: f64, numerator: u8) -> PlayerResult;
    fn set_track_varying_bpm(&mut self, points: &[TempoPoint]) -> PlayerResult;
    /// Tempo at the cursor (constant for a fixed-tempo song)
    fn track_bpm(&self) -> f64;

    fn set_metronome_enabled(&mut self, enabled: bool) -> PlayerResult;
    fn toggle_metronome(&mut self) -> PlayerResult;
    fn is_metronome_enabled(&self) -> bool;
    fn set_metronome_gain_db(&mut self, gain_db: f32) -> PlayerResult;
    fn metronome_gain_db(&self) -> f32;

    fn left_channel_out_db(&self) -> f32;
    fn right_channel_out_db(&self) -> f32;

    /// Replace the whole stem set of the loaded song
    fn update_stem_info(&mut self, stems: &[StemInfo]) -> PlayerResult;
}

/// Control-side handle to a running [`PlayerCore`]
pub struct PlayerHandle {
    sample_rate: u32,
    commands: Sender<PlayerCommand>,
    retired: Receiver<Retired>,
    snapshot: Arc<Mutex<PlayerSnapshot>>,

    tempo: TempoMap,
    track_length: u64,
    metronome: MetronomeConfig,
    infos: Vec<StemInfo>,
    audio: HashMap<u32, Arc<StemAudio>>,
    mute_solo: MuteSolo,
}

impl PlayerHandle {
    /// Create a handle and the audio-side core it controls
    ///
    /// The core is meant to be moved into the audio callback.
    pub fn create(sample_rate: u32, config: &EngineConfig) -> (Self, PlayerCore) {
        let (control, audio) = create_channels(config.command_capacity);
        let snapshot = Arc::new(Mutex::new(PlayerSnapshot::initial(config)));
        let core = PlayerCore::new(sample_rate, config, audio, snapshot.clone());

        let handle = Self {
            sample_rate,
            commands: control.commands,
            retired: control.retired,
            snapshot,
            tempo: TempoMap::default_for(sample_rate),
            track_length: 0,
            metronome: config.metronome,
            infos: Vec::new(),
            audio: HashMap::new(),
            mute_solo: MuteSolo::new(),
        };
        (handle, core)
    }

    /// Latest state published by the audio thread
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.collect_retired();
        *self.snapshot.lock()
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// Bar / beat at the cursor
    pub fn musical_position(&self) -> MusicalPosition {
        self.tempo.musical_position(self.playback_position())
    }

    pub fn stem_infos(&self) -> &[StemInfo] {
        &self.infos
    }

    pub fn stem_count(&self) -> usize {
        self.infos.len()
    }

    /// True once the stem is part of the song and its audio is loaded
    pub fn stem_ready(&self, id: u32) -> bool {
        self.audio.contains_key(&id) && self.infos.iter().any(|info| info.id == id)
    }

    /// Register decoded audio for a stem
    ///
    /// Audio may arrive before or after the stem's info. It is kept either
    /// way; the stem set is re-sent when the stem is already part of the song,
    /// and the audio is only kept if that set reached the queue.
    pub fn load_stem_audio(&mut self, id: u32, audio: StemAudio) -> PlayerResult {
        debug!(
            "Stem {} audio ready: {} frames, {} channel(s), {} silent region(s)",
            id,
            audio.frames(),
            audio.channels(),
            audio.silences().len()
        );
        let previous = self.audio.insert(id, Arc::new(audio));
        if !self.infos.iter().any(|info| info.id == id) {
            return Ok(());
        }

        let set = self.build_set(&self.infos, &self.mute_solo);
        if let Err(e) = self.send(PlayerCommand::ReplaceStems(Box::new(set))) {
            match previous {
                Some(previous) => self.audio.insert(id, previous),
                None => self.audio.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn toggle_mute(&mut self, id: u32) -> PlayerResult {
        let mut mute_solo = self.mute_solo.clone();
        mute_solo.toggle_mute(id, self.infos.iter().map(|info| info.id));
        self.apply_mute_solo(mute_solo)
    }

    pub fn toggle_solo(&mut self, id: u32) -> PlayerResult {
        let mut mute_solo = self.mute_solo.clone();
        mute_solo.toggle_solo(id);
        self.apply_mute_solo(mute_solo)
    }

    pub fn unmute_all(&mut self) -> PlayerResult {
        let mut mute_solo = self.mute_solo.clone();
        mute_solo.unmute_all();
        self.apply_mute_solo(mute_solo)
    }

    pub fn is_stem_muted(&self, id: u32) -> bool {
        self.mute_solo.is_muted(id)
    }

    pub fn is_stem_soloed(&self, id: u32) -> bool {
        self.mute_solo.is_soloed(id)
    }

    pub fn is_stem_audible(&self, id: u32) -> bool {
        self.mute_solo.is_audible(id)
    }

    fn apply_mute_solo(&mut self, mute_solo: MuteSolo) -> PlayerResult {
        let set = self.build_set(&self.infos, &mute_solo);
        self.send(PlayerCommand::ReplaceStems(Box::new(set)))?;
        self.mute_solo = mute_solo;
        Ok(())
    }

    fn build_set(&self, infos: &[StemInfo], mute_solo: &MuteSolo) -> StemSet {
        StemSet::new(
            infos
                .iter()
                .map(|info| {
                    Stem::new(
                        info,
                        self.audio.get(&info.id).cloned(),
                        mute_solo.is_audible(info.id),
                    )
                })
                .collect(),
        )
    }

    fn set_tempo(&mut self, tempo: TempoMap) -> PlayerResult {
        self.send(PlayerCommand::SetTempo(Box::new(tempo.clone())))?;
        self.tempo = tempo;
        Ok(())
    }

    fn send(&self, cmd: PlayerCommand) -> PlayerResult {
        self.collect_retired();
        match self.commands.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => {
                warn!("Command queue full, dropping {:?}", CommandName(&cmd));
                Err(PlayerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(PlayerError::EngineGone),
        }
    }

    /// Free whatever the audio thread has swapped out
    fn collect_retired(&self) {
        self.retired.try_iter().for_each(drop);
    }
}

/// Logs a command by variant only, without its payload
struct CommandName<'a>(&'a PlayerCommand);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            PlayerCommand::Play => "Play",
            PlayerCommand::Pause => "Pause",
            PlayerCommand::Stop => "Stop",
            PlayerCommand::ResetPlayback { .. } => "ResetPlayback",
            PlayerCommand::SetPosition(_) => "SetPosition",
            PlayerCommand::SetTrackLength(_) => "SetTrackLength",
            PlayerCommand::SetTempo(_) => "SetTempo",
            PlayerCommand::SetMetronomeEnabled(_) => "SetMetronomeEnabled",
            PlayerCommand::ToggleMetronome => "ToggleMetronome",
            PlayerCommand::SetMetronomeGainDb(_) => "SetMetronomeGainDb",
            PlayerCommand::ReplaceStems(_) => "ReplaceStems",
        };
        f.write_str(name)
    }
}

impl StemPlayer for PlayerHandle {
    fn play(&mut self) -> PlayerResult {
        self.send(PlayerCommand::Play)
    }

    fn pause(&mut self) -> PlayerResult {
        self.send(PlayerCommand::Pause)
    }

    fn stop(&mut self) -> PlayerResult {
        self.send(PlayerCommand::Stop)
    }

    fn reset_playback(&mut self) -> PlayerResult {
        let tempo = TempoMap::default_for(self.sample_rate);
        self.send(PlayerCommand::ResetPlayback {
            stems: Box::default(),
            tempo: Box::new(tempo.clone()),
        })?;

        self.tempo = tempo;
        self.track_length = 0;
        self.infos.clear();
        self.audio.clear();
        self.mute_solo.unmute_all();
        info!("Playback reset, song unloaded");
        Ok(())
    }

    fn playback_state(&self) -> PlaybackState {
        self.snapshot().state
    }

    fn set_playback_position(&mut self, sample: i64) -> PlayerResult {
        self.send(PlayerCommand::SetPosition(sample))
    }

    fn playback_position(&self) -> u64 {
        self.snapshot().position
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_track_length(&mut self, samples: u64) -> PlayerResult {
        self.send(PlayerCommand::SetTrackLength(samples))?;
        self.track_length = samples;
        Ok(())
    }

    fn track_length(&self) -> u64 {
        self.track_length
    }

    fn set_track_bpm(&mut self, bpm: f64, numerator: u8) -> PlayerResult {
        let tempo = TempoMap::constant(bpm, numerator, self.sample_rate).map_err(|e| {
            warn!("Rejected tempo {} BPM, numerator {}: {}", bpm, numerator, e);
            e
        })?;
        self.set_tempo(tempo)
    }

    fn set_track_varying_bpm(&mut self, points: &[TempoPoint]) -> PlayerResult {
        let tempo = TempoMap::variable(points, self.sample_rate).map_err(|e| {
            warn!("Rejected tempo map with {} points: {}", points.len(), e);
            e
        })?;
        self.set_tempo(tempo)
    }

    fn track_bpm(&self) -> f64 {
        self.tempo.bpm_at(self.playback_position())
    }

    fn set_metronome_enabled(&mut self, enabled: bool) -> PlayerResult {
        self.send(PlayerCommand::SetMetronomeEnabled(enabled))?;
        self.metronome.enabled = enabled;
        Ok(())
    }

    fn toggle_metronome(&mut self) -> PlayerResult {
        self.send(PlayerCommand::ToggleMetronome)?;
        self.metronome.enabled = !self.metronome.enabled;
        Ok(())
    }

    fn is_metronome_enabled(&self) -> bool {
        self.metronome.enabled
    }

    fn set_metronome_gain_db(&mut self, gain_db: f32) -> PlayerResult {
        self.send(PlayerCommand::SetMetronomeGainDb(gain_db))?;
        self.metronome.gain_db = gain_db;
        Ok(())
    }

    fn metronome_gain_db(&self) -> f32 {
        self.metronome.gain_db
    }

    fn left_channel_out_db(&self) -> f32 {
        self.snapshot().levels.left_db
    }

    fn right_channel_out_db(&self) -> f32 {
        self.snapshot().levels.right_db
    }

    fn update_stem_info(&mut self, stems: &[StemInfo]) -> PlayerResult {
        // Decoded audio only carries over when the stem still points at the same file
        let stale: Vec<u32> = self
            .infos
            .iter()
            .filter(|old| {
                !stems
                    .iter()
                    .any(|new| new.id == old.id && new.path == old.path)
            })
            .map(|old| old.id)
            .collect();

        let mut audio = self.audio.clone();
        for id in &stale {
            audio.remove(id);
        }
        let previous = std::mem::replace(&mut self.audio, audio);

        let set = self.build_set(stems, &self.mute_solo);
        if let Err(e) = self.send(PlayerCommand::ReplaceStems(Box::new(set))) {
            self.audio = previous;
            return Err(e);
        }

        for old in &self.infos {
            if !stems.iter().any(|new| new.id == old.id) {
                self.mute_solo.remove(old.id);
            }
        }
        self.infos = stems.to_vec();
        debug!("Stem set replaced: {} stem(s)", self.infos.len());
        Ok(())
    }
}
