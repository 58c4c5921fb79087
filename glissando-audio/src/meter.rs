//! Output level metering
//!
//! Per-block peak level of the post-limiter left and right channels, in
//! dBFS. Only the most recent block is kept.

/// Level reported for silence
pub const SILENCE_DB: f32 = -120.0;

/// Smallest amplitude that maps above the silence floor
const MIN_LINEAR: f32 = 1e-6;

/// Convert dB to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert linear amplitude to dB, floored at [`SILENCE_DB`]
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear > MIN_LINEAR {
        (20.0 * linear.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

/// Left / right output level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelLevels {
    pub left_db: f32,
    pub right_db: f32,
}

impl Default for ChannelLevels {
    fn default() -> Self {
        Self {
            left_db: SILENCE_DB,
            right_db: SILENCE_DB,
        }
    }
}

/// Block peak meter
#[derive(Debug, Default)]
pub struct LevelMeter {
    levels: ChannelLevels,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure a block of interleaved stereo samples
    pub fn process(&mut self, samples: &[f32]) {
        let (mut peak_l, mut peak_r) = (0.0f32, 0.0f32);
        for frame in samples.chunks_exact(2) {
            peak_l = peak_l.max(frame[0].abs());
            peak_r = peak_r.max(frame[1].abs());
        }

        self.levels = ChannelLevels {
            left_db: linear_to_db(peak_l),
            right_db: linear_to_db(peak_r),
        };
    }

    pub fn levels(&self) -> ChannelLevels {
        self.levels
    }

    pub fn reset(&mut self) {
        self.levels = ChannelLevels::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_reads_floor() {
        let mut meter = LevelMeter::new();
        meter.process(&[0.0; 256]);
        assert_eq!(meter.levels(), ChannelLevels::default());
    }

    #[test]
    fn test_peak_per_channel() {
        let mut meter = LevelMeter::new();
        meter.process(&[0.5, -0.25, -1.0, 0.1, 0.2, 0.0]);

        let levels = meter.levels();
        assert!(levels.left_db.abs() < 1e-4, "left {}", levels.left_db);
        assert!(
            (levels.right_db - (-12.0412)).abs() < 1e-3,
            "right {}",
            levels.right_db
        );
    }

    #[test]
    fn test_only_last_block_counts() {
        let mut meter = LevelMeter::new();
        meter.process(&[1.0, 1.0]);
        meter.process(&[0.0, 0.0]);
        assert_eq!(meter.levels().left_db, SILENCE_DB);
    }

    #[test]
    fn test_db_conversions() {
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((linear_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(linear_to_db(0.0), SILENCE_DB);
        assert_eq!(linear_to_db(-1.0), SILENCE_DB);
    }
}
