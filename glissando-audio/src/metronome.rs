//! Metronome - click track following the tempo map
//!
//! Clicks are short synthetic bursts (a decaying sine, higher pitched on
//! the first beat of a bar). Both bursts are rendered once at construction
//! so the audio thread only copies samples.

use crate::meter::db_to_linear;
use crate::tempo::{Click, TempoMap};
use std::f32::consts::TAU;

/// Click length in milliseconds
const CLICK_MS: f32 = 25.0;
/// Attack ramp in milliseconds (avoids a DC step at the onset)
const CLICK_ATTACK_MS: f32 = 0.5;
/// Exponential decay time constant in milliseconds
const CLICK_DECAY_MS: f32 = 6.0;
/// Click pitch on regular beats
const BEAT_FREQ_HZ: f32 = 1000.0;
/// Click pitch on the first beat of a bar
const ACCENT_FREQ_HZ: f32 = 1600.0;
/// Peak level of a click at 0 dB gain
const CLICK_LEVEL: f32 = 0.5;

/// Metronome settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub gain_db: f32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gain_db: 0.0,
        }
    }
}

/// A click currently sounding
#[derive(Debug, Clone, Copy)]
struct Voice {
    accent: bool,
    pos: usize,
}

/// Click track generator
pub struct Metronome {
    config: MetronomeConfig,
    gain: f32,
    beat_click: Box<[f32]>,
    accent_click: Box<[f32]>,
    voice: Option<Voice>,
    /// Next click to start
    pending: Option<Click>,
    /// Sample position the next render call is expected to start at
    cursor: Option<u64>,
}

impl Metronome {
    pub fn new(sample_rate: u32, config: MetronomeConfig) -> Self {
        Self {
            config,
            gain: db_to_linear(config.gain_db),
            beat_click: synthesize_click(sample_rate as f32, BEAT_FREQ_HZ),
            accent_click: synthesize_click(sample_rate as f32, ACCENT_FREQ_HZ),
            voice: None,
            pending: None,
            cursor: None,
        }
    }

    pub fn config(&self) -> MetronomeConfig {
        self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.config.gain_db
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.config.gain_db = gain_db;
        self.gain = db_to_linear(gain_db);
    }

    /// Drop the sounding click and resynchronise on the next render
    pub fn reset(&mut self) {
        self.voice = None;
        self.pending = None;
        self.cursor = None;
    }

    /// Add clicks for the block starting at `start` into stereo `output`
    ///
    /// Consecutive calls are expected to cover contiguous sample ranges; a
    /// jump in `start` drops any sounding click and looks up the next onset
    /// from the tempo map.
    pub fn render(&mut self, tempo: &TempoMap, start: u64, output: &mut [f32]) {
        if !self.config.enabled {
            return;
        }

        if self.cursor != Some(start) {
            self.voice = None;
            self.pending = None;
        }
        let mut pending = match self.pending {
            Some(click) => click,
            None => tempo.next_click(start),
        };

        let mut sample = start;
        for frame in output.chunks_exact_mut(2) {
            if pending.sample == sample {
                self.voice = Some(Voice {
                    accent: pending.accent,
                    pos: 0,
                });
                pending = tempo.next_click(sample + 1);
            }

            if let Some(voice) = self.voice.as_mut() {
                let burst = if voice.accent {
                    &self.accent_click
                } else {
                    &self.beat_click
                };
                let value = burst[voice.pos] * self.gain;
                frame[0] += value;
                frame[1] += value;

                voice.pos += 1;
                if voice.pos >= burst.len() {
                    self.voice = None;
                }
            }

            sample += 1;
        }

        self.pending = Some(pending);
        self.cursor = Some(sample);
    }
}

/// Render one click burst: a sine with a short linear attack and exponential decay
fn synthesize_click(sample_rate: f32, freq: f32) -> Box<[f32]> {
    let len = ((sample_rate * CLICK_MS / 1000.0) as usize).max(1);
    let attack = (sample_rate * CLICK_ATTACK_MS / 1000.0).max(1.0);
    let decay = sample_rate * CLICK_DECAY_MS / 1000.0;

    (0..len)
        .map(|i| {
            let t = i as f32;
            let env = (t / attack).min(1.0) * (-t / decay).exp();
            (TAU * freq * t / sample_rate).sin() * env * CLICK_LEVEL
        })
        .collect()
}
