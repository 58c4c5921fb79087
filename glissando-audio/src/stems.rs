//! Stem bank - sums the stems of the loaded song into a stereo block
//!
//! The audio thread owns one [`StemSet`] at a time. A new set is built on
//! the control side (gains and pan already resolved to per-channel
//! multipliers) and swapped in wholesale between blocks.

use crate::meter::db_to_linear;
use crate::silence::{self, SilenceDetector, SilenceRegion};
use std::collections::HashSet;
use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;

/// Decoded audio for one stem at the engine sample rate
#[derive(Debug)]
pub struct StemAudio {
    /// Interleaved samples
    samples: Box<[f32]>,
    channels: usize,
    frames: usize,
    silences: Vec<SilenceRegion>,
}

impl StemAudio {
    /// Interleaved stereo samples (L, R, L, R, ...)
    pub fn stereo(samples: Vec<f32>) -> Self {
        Self::with_channels(samples, 2)
    }

    pub fn mono(samples: Vec<f32>) -> Self {
        Self::with_channels(samples, 1)
    }

    fn with_channels(mut samples: Vec<f32>, channels: usize) -> Self {
        // Drop a trailing partial frame
        let frames = samples.len() / channels;
        samples.truncate(frames * channels);
        let silences = SilenceDetector::default().detect(&samples, channels);

        Self {
            samples: samples.into_boxed_slice(),
            channels,
            frames,
            silences,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn silences(&self) -> &[SilenceRegion] {
        &self.silences
    }
}

/// Stem metadata supplied by the song (what `update_stem_info` receives)
#[derive(Debug, Clone, PartialEq)]
pub struct StemInfo {
    pub id: u32,
    pub path: String,
    /// Length in samples; 0 means "use the decoded length"
    pub samples: u64,
    /// Track position of the stem's first sample
    pub offset: i64,
    pub gain_db: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
}

impl StemInfo {
    pub fn new(id: u32, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            samples: 0,
            offset: 0,
            gain_db: 0.0,
            pan: 0.0,
        }
    }
}

/// Constant-power pan law: `theta = (pan + 1) * pi/4`, gains `(cos, sin)`
pub fn pan_gains(gain_db: f32, pan: f32) -> (f32, f32) {
    let gain = db_to_linear(gain_db);
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (gain * theta.cos(), gain * theta.sin())
}

/// One stem as seen by the audio thread
#[derive(Debug, Clone)]
pub struct Stem {
    id: u32,
    offset: i64,
    length: u64,
    gain_l: f32,
    gain_r: f32,
    audio: Option<Arc<StemAudio>>,
    audible: bool,
}

impl Stem {
    pub fn new(info: &StemInfo, audio: Option<Arc<StemAudio>>, audible: bool) -> Self {
        let (gain_l, gain_r) = pan_gains(info.gain_db, info.pan);
        let length = match &audio {
            Some(audio) if info.samples == 0 => audio.frames() as u64,
            Some(audio) => info.samples.min(audio.frames() as u64),
            None => info.samples,
        };

        Self {
            id: info.id,
            offset: info.offset,
            length,
            gain_l,
            gain_r,
            audio,
            audible,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    /// Accumulate this stem into stereo `out`, whose first frame is track sample `start`
    ///
    /// Only frames with `offset <= p < offset + length` contribute.
    fn mix_into(&self, start: u64, out: &mut [f32]) {
        let Some(audio) = self.audio.as_deref() else {
            return;
        };
        if !self.audible {
            return;
        }

        let frames = (out.len() / 2) as i64;
        let block_start = start as i64;
        let from = block_start.max(self.offset);
        let to = block_start
            .saturating_add(frames)
            .min(self.offset.saturating_add(self.length as i64));
        if from >= to {
            return;
        }

        let src_start = (from - self.offset) as usize;
        let src_end = (to - self.offset) as usize;
        if silence::covers(audio.silences(), src_start as u64, src_end as u64) {
            return;
        }

        let dst = &mut out[(from - block_start) as usize * 2..(to - block_start) as usize * 2];
        let samples = audio.samples();
        if audio.channels() == 2 {
            let src = &samples[src_start * 2..src_end * 2];
            for (o, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
                o[0] += s[0] * self.gain_l;
                o[1] += s[1] * self.gain_r;
            }
        } else {
            let src = &samples[src_start..src_end];
            for (o, &s) in dst.chunks_exact_mut(2).zip(src) {
                o[0] += s * self.gain_l;
                o[1] += s * self.gain_r;
            }
        }
    }
}

/// Full stem collection for one song
#[derive(Debug, Clone, Default)]
pub struct StemSet {
    stems: Vec<Stem>,
}

impl StemSet {
    pub fn new(stems: Vec<Stem>) -> Self {
        Self { stems }
    }

    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// Audio-thread owner of the active stem set
pub struct StemBank {
    set: Box<StemSet>,
}

impl Default for StemBank {
    fn default() -> Self {
        Self::new()
    }
}

impl StemBank {
    pub fn new() -> Self {
        Self {
            set: Box::default(),
        }
    }

    pub fn set(&self) -> &StemSet {
        &self.set
    }

    /// Swap in a new set, returning the old one so the caller decides where it is dropped
    pub fn replace(&mut self, set: Box<StemSet>) -> Box<StemSet> {
        std::mem::replace(&mut self.set, set)
    }

    /// Add the stems' contribution for the block starting at `start` into `out`
    pub fn mix(&self, start: u64, out: &mut [f32]) {
        for stem in &self.set.stems {
            stem.mix_into(start, out);
        }
    }
}

/// Mute and solo bookkeeping (control side)
///
/// At most one stem is soloed. While a solo is active every other stem is
/// treated as muted regardless of the explicit mute set.
#[derive(Debug, Clone, Default)]
pub struct MuteSolo {
    muted: HashSet<u32>,
    soloed: Option<u32>,
}

impl MuteSolo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_mute(&mut self, id: u32, all_ids: impl IntoIterator<Item = u32>) {
        if self.soloed.is_some() {
            self.switch_to_mute_mode(all_ids);
        }
        if !self.muted.remove(&id) {
            self.muted.insert(id);
        }
    }

    pub fn toggle_solo(&mut self, id: u32) {
        self.muted.remove(&id);
        if self.soloed == Some(id) {
            self.soloed = None;
        } else {
            self.soloed = Some(id);
        }
    }

    pub fn unmute_all(&mut self) {
        self.muted.clear();
        self.soloed = None;
    }

    pub fn is_muted(&self, id: u32) -> bool {
        match self.soloed {
            Some(soloed) => soloed != id,
            None => self.muted.contains(&id),
        }
    }

    pub fn is_soloed(&self, id: u32) -> bool {
        self.soloed == Some(id)
    }

    pub fn is_audible(&self, id: u32) -> bool {
        !self.is_muted(id)
    }

    /// Forget a stem that left the song
    pub fn remove(&mut self, id: u32) {
        self.muted.remove(&id);
        if self.soloed == Some(id) {
            self.soloed = None;
        }
    }

    /// Replace the solo with the explicit mute set it implies
    fn switch_to_mute_mode(&mut self, all_ids: impl IntoIterator<Item = u32>) {
        let muted = all_ids.into_iter().filter(|&id| self.is_muted(id)).collect();
        self.muted = muted;
        self.soloed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, offset: i64, gain_db: f32, pan: f32) -> StemInfo {
        StemInfo {
            id,
            path: format!("stem{}.wav", id),
            samples: 0,
            offset,
            gain_db,
            pan,
        }
    }

    fn bank_with(stems: Vec<Stem>) -> StemBank {
        let mut bank = StemBank::new();
        bank.replace(Box::new(StemSet::new(stems)));
        bank
    }

    fn ramp(frames: usize) -> Arc<StemAudio> {
        Arc::new(StemAudio::mono((1..=frames).map(|i| i as f32 / 1000.0).collect()))
    }

    #[test]
    fn test_pan_hard_left_is_constant_power() {
        let (l, r) = pan_gains(0.0, -1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);

        let (cl, cr) = pan_gains(0.0, 0.0);
        let centre_power = cl * cl + cr * cr;
        let left_power = l * l + r * r;
        assert!((centre_power - left_power).abs() < 1e-6);
    }

    #[test]
    fn test_hard_left_routes_everything_left() {
        let audio = Arc::new(StemAudio::mono(vec![0.5; 64]));
        let bank = bank_with(vec![Stem::new(&info(1, 0, 0.0, -1.0), Some(audio), true)]);

        let mut out = vec![0.0; 64 * 2];
        bank.mix(0, &mut out);
        for frame in out.chunks_exact(2) {
            assert!((frame[0] - 0.5).abs() < 1e-6);
            assert!(frame[1].abs() < 1e-6);
        }
    }

    #[test]
    fn test_gain_applied() {
        let audio = Arc::new(StemAudio::mono(vec![1.0; 8]));
        let bank = bank_with(vec![Stem::new(&info(1, 0, -6.0206, 1.0), Some(audio), true)]);

        let mut out = vec![0.0; 8 * 2];
        bank.mix(0, &mut out);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_offset_window() {
        // Stem of 10 frames entering at track sample 5
        let stem = Stem::new(&info(1, 5, 0.0, -1.0), Some(ramp(10)), true);
        let bank = bank_with(vec![stem]);

        let mut out = vec![0.0; 20 * 2];
        bank.mix(0, &mut out);
        let left: Vec<f32> = out.chunks_exact(2).map(|f| f[0]).collect();

        assert!(left[..5].iter().all(|&s| s == 0.0));
        assert!((left[5] - 0.001).abs() < 1e-7);
        assert!((left[14] - 0.010).abs() < 1e-7);
        assert!(left[15..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_negative_offset_starts_midway() {
        let stem = Stem::new(&info(1, -4, 0.0, -1.0), Some(ramp(10)), true);
        let bank = bank_with(vec![stem]);

        let mut out = vec![0.0; 8 * 2];
        bank.mix(0, &mut out);
        // Track sample 0 reads stem sample 4
        assert!((out[0] - 0.005).abs() < 1e-7);
        assert!((out[10] - 0.010).abs() < 1e-7);
        assert_eq!(out[12], 0.0);
    }

    #[test]
    fn test_block_after_end_is_silent() {
        let bank = bank_with(vec![Stem::new(&info(1, 0, 0.0, 0.0), Some(ramp(10)), true)]);
        let mut out = vec![0.0; 16];
        bank.mix(100, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_extreme_offsets() {
        let late = Stem::new(&info(1, i64::MAX, 0.0, -1.0), Some(ramp(10)), true);
        let early = Stem::new(&info(2, i64::MIN, 0.0, -1.0), Some(ramp(10)), true);
        let bank = bank_with(vec![late, early]);
        let mut out = vec![0.0; 16];
        bank.mix(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        // Window end saturates instead of wrapping
        let edge = Stem::new(&info(3, i64::MAX - 8, 0.0, -1.0), Some(ramp(10)), true);
        let bank = bank_with(vec![edge]);
        let mut out = vec![0.0; 8 * 2];
        bank.mix((i64::MAX - 4) as u64, &mut out);
        assert!((out[0] - 0.005).abs() < 1e-7);
        assert!((out[6] - 0.008).abs() < 1e-7);
        assert_eq!(out[8], 0.0);
    }

    #[test]
    fn test_declared_length_truncates() {
        let mut stem_info = info(1, 0, 0.0, -1.0);
        stem_info.samples = 3;
        let bank = bank_with(vec![Stem::new(&stem_info, Some(ramp(10)), true)]);

        let mut out = vec![0.0; 10 * 2];
        bank.mix(0, &mut out);
        assert!(out[4] != 0.0);
        assert_eq!(out[6], 0.0);
    }

    #[test]
    fn test_stereo_stem_keeps_channels() {
        let audio = Arc::new(StemAudio::stereo(vec![0.25, 0.75, 0.25, 0.75]));
        let bank = bank_with(vec![Stem::new(&info(1, 0, 0.0, 0.0), Some(audio), true)]);

        let mut out = vec![0.0; 4];
        bank.mix(0, &mut out);
        let g = FRAC_PI_4.cos();
        assert!((out[0] - 0.25 * g).abs() < 1e-6);
        assert!((out[1] - 0.75 * g).abs() < 1e-6);
    }

    #[test]
    fn test_muted_and_unloaded_stems_are_silent() {
        let muted = Stem::new(&info(1, 0, 0.0, 0.0), Some(ramp(10)), false);
        let unloaded = Stem::new(&info(2, 0, 0.0, 0.0), None, true);
        assert!(!unloaded.is_ready());

        let bank = bank_with(vec![muted, unloaded]);
        let mut out = vec![0.0; 20];
        bank.mix(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_replace_removes_stem_from_mix() {
        let a = Stem::new(&info(1, 0, 0.0, -1.0), Some(Arc::new(StemAudio::mono(vec![0.1; 32]))), true);
        let b = Stem::new(&info(2, 0, 0.0, -1.0), Some(Arc::new(StemAudio::mono(vec![0.2; 32]))), true);
        let mut bank = bank_with(vec![a.clone(), b]);

        let mut out = vec![0.0; 16];
        bank.mix(0, &mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);

        let old = bank.replace(Box::new(StemSet::new(vec![a])));
        assert_eq!(old.len(), 2);

        let mut out = vec![0.0; 16];
        bank.mix(8, &mut out);
        assert!((out[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_silent_block_is_skipped() {
        let mut samples = vec![0.5f32; 10];
        samples.extend(vec![0.0; silence::MIN_SILENCE_FRAMES]);
        let audio = Arc::new(StemAudio::mono(samples));
        assert_eq!(audio.silences().len(), 1);

        let bank = bank_with(vec![Stem::new(&info(1, 0, 0.0, 0.0), Some(audio), true)]);
        let mut out = vec![0.0; 512 * 2];
        bank.mix(1000, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_solo_mutes_others() {
        let mut state = MuteSolo::new();
        state.toggle_solo(2);

        assert!(state.is_muted(1));
        assert!(state.is_audible(2));
        assert!(state.is_soloed(2));

        state.toggle_solo(2);
        assert!(state.is_audible(1));
    }

    #[test]
    fn test_mute_during_solo_switches_to_mute_mode() {
        let mut state = MuteSolo::new();
        state.toggle_solo(2);
        state.toggle_mute(2, [1, 2, 3]);

        // Solo became "1 and 3 muted", then 2 was muted too
        assert!(!state.is_soloed(2));
        assert!(state.is_muted(1));
        assert!(state.is_muted(2));
        assert!(state.is_muted(3));

        state.unmute_all();
        assert!(state.is_audible(1) && state.is_audible(2) && state.is_audible(3));
    }

    #[test]
    fn test_remove_clears_state() {
        let mut state = MuteSolo::new();
        state.toggle_mute(1, [1, 2]);
        state.toggle_solo(2);
        state.remove(1);
        state.remove(2);

        assert!(state.is_audible(1));
        assert!(!state.is_soloed(2));
    }
}
