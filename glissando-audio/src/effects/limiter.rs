//! Output bus limiter
//!
//! Soft-knee compressor with a high ratio that sits after the stem and
//! click sum. It only exists to keep stem summation from clipping:
//! - Signal below the knee passes with unity gain
//! - O(1) sliding peak-hold (monotonic deque) over a short lookahead window
//! - Attack/release envelope applied to the delayed signal
//! - Final ceiling clamp for anything the envelope could not catch

use super::Effect;
use crate::meter::{db_to_linear, linear_to_db};
use std::collections::VecDeque;

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSettings {
    /// Threshold in dBFS
    pub threshold_db: f32,
    /// Compression ratio above the knee
    pub ratio: f32,
    /// Knee width in dB, centred on the threshold
    pub knee_db: f32,
    /// Hard output ceiling in dBFS
    pub ceiling_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub lookahead_ms: f32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            threshold_db: -3.0,
            ratio: 8.0,
            knee_db: 6.0,
            ceiling_db: -0.3,
            attack_ms: 0.5,
            release_ms: 80.0,
            lookahead_ms: 2.0,
        }
    }
}

/// Final bus limiter
pub struct Limiter {
    enabled: bool,
    settings: LimiterSettings,
    /// Output ceiling in linear amplitude
    ceiling: f32,
    attack_coeff: f32,
    release_coeff: f32,

    /// Candidate window maxima as (frame, peak), peaks decreasing front to back
    peaks: VecDeque<(u64, f32)>,
    /// Frames covered by the peak window (lookahead + current)
    window: u64,
    frame: u64,
    /// Current linear gain applied to the delayed signal
    gain: f32,

    delay_l: Vec<f32>,
    delay_r: Vec<f32>,
    write_pos: usize,
    lookahead_samples: usize,

    current_gr_db: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32, settings: LimiterSettings) -> Self {
        let lookahead_samples = ((sample_rate * settings.lookahead_ms / 1000.0) as usize).max(1);

        Self {
            enabled: true,
            settings,
            ceiling: db_to_linear(settings.ceiling_db.min(0.0)),
            attack_coeff: time_to_coeff(settings.attack_ms, sample_rate),
            release_coeff: time_to_coeff(settings.release_ms, sample_rate),
            peaks: VecDeque::with_capacity(lookahead_samples + 2),
            window: lookahead_samples as u64 + 1,
            frame: 0,
            gain: 1.0,
            delay_l: vec![0.0; lookahead_samples],
            delay_r: vec![0.0; lookahead_samples],
            write_pos: 0,
            lookahead_samples,
            current_gr_db: 0.0,
        }
    }

    /// Latency introduced by the lookahead, in frames
    pub fn latency(&self) -> usize {
        self.lookahead_samples
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn gain_reduction_db(&self) -> f32 {
        self.current_gr_db
    }

    /// Static gain curve: reduction in dB for an input level in dB
    #[inline]
    fn compute_gain_reduction(&self, input_db: f32) -> f32 {
        let threshold = self.settings.threshold_db;
        let ratio = self.settings.ratio.max(1.0);
        let knee = self.settings.knee_db.max(0.0);

        if input_db <= threshold - knee / 2.0 {
            0.0
        } else if input_db >= threshold + knee / 2.0 || knee == 0.0 {
            threshold + (input_db - threshold) / ratio - input_db
        } else {
            let x = input_db - (threshold - knee / 2.0);
            (1.0 / ratio - 1.0) * (x * x) / (2.0 * knee)
        }
    }

    /// Largest peak seen over the last `window` frames, including this one
    ///
    /// The deque never holds more than `window` entries, so it does not grow
    /// past the capacity reserved in `new`.
    #[inline]
    fn hold_peak(&mut self, peak: f32) -> f32 {
        let oldest = (self.frame + 1).saturating_sub(self.window);
        while self.peaks.front().is_some_and(|&(frame, _)| frame < oldest) {
            self.peaks.pop_front();
        }
        while self.peaks.back().is_some_and(|&(_, held)| held <= peak) {
            self.peaks.pop_back();
        }
        self.peaks.push_back((self.frame, peak));
        self.frame += 1;

        self.peaks.front().map_or(peak, |&(_, held)| held)
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let held = self.hold_peak(left.abs().max(right.abs()));
        let target = db_to_linear(self.compute_gain_reduction(linear_to_db(held)));

        let coeff = if target < self.gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain = (coeff * self.gain + (1.0 - coeff) * target).min(1.0);

        let delayed_l = self.delay_l[self.write_pos];
        let delayed_r = self.delay_r[self.write_pos];
        self.delay_l[self.write_pos] = left;
        self.delay_r[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.lookahead_samples;

        self.current_gr_db = linear_to_db(self.gain);

        (
            (delayed_l * self.gain).clamp(-self.ceiling, self.ceiling),
            (delayed_r * self.gain).clamp(-self.ceiling, self.ceiling),
        )
    }
}

/// Convert a time constant in ms to a one-pole smoothing coefficient
#[inline]
fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (sample_rate * time_ms / 1000.0)).exp()
}

impl Effect for Limiter {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for frame in samples.chunks_exact_mut(2) {
            let (out_l, out_r) = self.process_frame(frame[0], frame[1]);
            frame[0] = out_l;
            frame[1] = out_r;
        }
    }

    fn reset(&mut self) {
        self.peaks.clear();
        self.frame = 0;
        self.gain = 1.0;
        self.delay_l.fill(0.0);
        self.delay_r.fill(0.0);
        self.write_pos = 0;
        self.current_gr_db = 0.0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> Limiter {
        Limiter::new(48000.0, LimiterSettings::default())
    }

    #[test]
    fn test_limiter_creation() {
        let limiter = limiter();
        assert!(limiter.is_enabled());
        assert_eq!(limiter.latency(), 96);
        // -0.3 dBFS = ~0.966
        assert!(limiter.ceiling > 0.96 && limiter.ceiling < 0.97);
    }

    #[test]
    fn test_soft_signal_passes_through() {
        let mut limiter = limiter();
        let delay = limiter.latency();

        let original: Vec<f32> = (0..1024)
            .flat_map(|i| {
                let v = (i as f32 * 0.01).sin() * 0.3;
                [v, -v]
            })
            .collect();
        let mut samples = original.clone();
        limiter.process(&mut samples);

        for frame in delay..1024 {
            let diff = (samples[frame * 2] - original[(frame - delay) * 2]).abs();
            assert!(diff < 1e-5, "frame {} differs by {}", frame, diff);
        }
        assert!(limiter.gain_reduction_db() > -0.001);
    }

    #[test]
    fn test_loud_signal_gets_limited() {
        let mut limiter = limiter();
        let ceiling = limiter.ceiling;

        let mut samples: Vec<f32> = vec![2.0, 2.0, -2.0, -2.0, 1.5, 1.5, -1.5, -1.5];
        samples.extend(vec![0.0; 512]);
        limiter.process(&mut samples);

        for (i, sample) in samples.iter().enumerate() {
            assert!(
                sample.abs() <= ceiling * 1.001,
                "Sample {} at index {} exceeds ceiling {}",
                sample,
                i,
                ceiling
            );
        }
    }

    #[test]
    fn test_sustained_overload_reduces_gain() {
        let mut limiter = limiter();
        let mut samples = vec![1.8f32; 4096];
        limiter.process(&mut samples);

        assert!(limiter.gain_reduction_db() < -3.0);
        // Once the envelope settles the output sits near threshold, not at zero
        let tail = samples[4000];
        assert!(tail > 0.3 && tail <= limiter.ceiling, "tail {}", tail);
    }

    #[test]
    fn test_gain_curve() {
        let limiter = limiter();

        // Below the knee: untouched
        assert_eq!(limiter.compute_gain_reduction(-20.0), 0.0);
        assert_eq!(limiter.compute_gain_reduction(-6.0), 0.0);

        // Above the knee: threshold + excess / ratio
        let gr = limiter.compute_gain_reduction(5.0);
        let expected = -3.0 + 8.0 / 8.0 - 5.0;
        assert!((gr - expected).abs() < 1e-4, "got {}", gr);

        // Inside the knee: gentle, between the two
        let knee = limiter.compute_gain_reduction(-3.0);
        assert!(knee < 0.0 && knee > -1.5, "knee {}", knee);
    }

    #[test]
    fn test_disabled_bypasses() {
        let mut limiter = limiter();
        limiter.set_enabled(false);
        let mut samples = vec![3.0, -3.0];
        limiter.process(&mut samples);
        assert_eq!(samples, vec![3.0, -3.0]);
    }

    #[test]
    fn test_peak_window() {
        // 2 frames of lookahead at 1 kHz: window of 3 frames
        let mut limiter = Limiter::new(1000.0, LimiterSettings::default());
        assert_eq!(limiter.latency(), 2);

        assert_eq!(limiter.hold_peak(0.5), 0.5);
        assert_eq!(limiter.hold_peak(0.7), 0.7);
        assert_eq!(limiter.hold_peak(0.6), 0.7);
        assert_eq!(limiter.hold_peak(0.4), 0.7);
        assert_eq!(limiter.hold_peak(0.3), 0.6);
        assert_eq!(limiter.hold_peak(0.2), 0.4);

        limiter.reset();
        assert_eq!(limiter.hold_peak(0.1), 0.1);
    }
}
