//! Tempo maps - constant or variable tempo timelines
//!
//! A tempo map converts between absolute sample positions and musical
//! positions (bar / beat) and yields the metronome click onsets.
//!
//! Both variants are stored as a list of segments of equally spaced beats:
//! a constant tempo is a single open segment, a variable tempo has one
//! segment per pair of consecutive tempo points plus an open tail that
//! keeps the last beat spacing. Lookups binary-search the segment list,
//! so seeking anywhere on the timeline is O(log n).

use crate::error::TempoError;

/// Lowest accepted tempo
pub const MIN_BPM: f64 = 40.0;
/// Highest accepted tempo
pub const MAX_BPM: f64 = 999.999;
/// Highest accepted time signature numerator
pub const MAX_NUMERATOR: u8 = 9;
/// Tempo used before a song provides one
pub const DEFAULT_BPM: f64 = 120.0;
/// Meter used before a song provides one
pub const DEFAULT_NUMERATOR: u8 = 4;

/// A tempo / meter change on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoPoint {
    /// Sample position where this point takes effect
    pub sample: u64,
    /// Bar number starting at `sample`
    pub bar: u32,
    /// Time signature numerator from this point on
    pub numerator: u8,
}

impl TempoPoint {
    pub fn new(sample: u64, bar: u32, numerator: u8) -> Self {
        Self {
            sample,
            bar,
            numerator,
        }
    }
}

/// A metronome click onset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub sample: u64,
    /// First beat of a bar
    pub accent: bool,
}

/// Position on the musical timeline (`bar` and `beat` are 1-based)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    /// Progress through the current beat (0.0 - 1.0)
    pub fraction: f64,
}

/// Which tempo description a map was built from
#[derive(Debug, Clone, PartialEq)]
pub enum TempoKind {
    Constant { bpm: f64, numerator: u8 },
    Variable(Vec<TempoPoint>),
}

/// A run of equally spaced beats
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    start: u64,
    bar: u32,
    numerator: u8,
    /// Samples per beat
    interval: f64,
    /// Beats before the next segment starts (`None` for the open tail)
    beats: Option<u64>,
}

impl Segment {
    #[inline]
    fn onset(&self, beat: u64) -> u64 {
        self.start + (beat as f64 * self.interval).round() as u64
    }

    /// First beat whose onset is at or after `sample` (`sample >= start`)
    fn first_beat_from(&self, sample: u64) -> u64 {
        let offset = sample.saturating_sub(self.start);
        let mut beat = (offset as f64 / self.interval).ceil() as u64;
        while beat > 0 && self.onset(beat - 1) >= sample {
            beat -= 1;
        }
        while self.onset(beat) < sample {
            beat += 1;
        }
        beat
    }

    /// Beat containing `sample` and the progress through it
    fn beat_at(&self, sample: u64) -> (u64, f64) {
        let offset = sample.saturating_sub(self.start);
        let mut beat = (offset as f64 / self.interval).floor() as u64;
        while self.onset(beat + 1) <= sample {
            beat += 1;
        }
        while beat > 0 && self.onset(beat) > sample {
            beat -= 1;
        }
        if let Some(beats) = self.beats {
            beat = beat.min(beats.saturating_sub(1));
        }

        let begin = self.onset(beat);
        let span = self.onset(beat + 1).saturating_sub(begin).max(1);
        let fraction = (sample.saturating_sub(begin) as f64 / span as f64).min(1.0);
        (beat, fraction)
    }

    #[inline]
    fn click(&self, beat: u64) -> Click {
        Click {
            sample: self.onset(beat),
            accent: beat % self.numerator as u64 == 0,
        }
    }
}

/// Tempo timeline of a song
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    kind: TempoKind,
    sample_rate: u32,
    segments: Vec<Segment>,
}

impl TempoMap {
    /// Build a constant tempo map
    pub fn constant(bpm: f64, numerator: u8, sample_rate: u32) -> Result<Self, TempoError> {
        if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(TempoError::BpmOutOfRange(bpm));
        }
        check_numerator(numerator)?;

        let interval = sample_rate as f64 * 60.0 / bpm;
        Ok(Self {
            kind: TempoKind::Constant { bpm, numerator },
            sample_rate,
            segments: vec![Segment {
                start: 0,
                bar: 1,
                numerator,
                interval,
                beats: None,
            }],
        })
    }

    /// Build a variable tempo map from ordered tempo points
    ///
    /// Between two points the bars are split evenly into beats of the
    /// numerator in effect at the earlier point. Meter changes take effect
    /// exactly at a point's sample position.
    pub fn variable(points: &[TempoPoint], sample_rate: u32) -> Result<Self, TempoError> {
        if points.len() < 2 {
            return Err(TempoError::TooFewPoints(points.len()));
        }
        if points[0].sample != 0 {
            return Err(TempoError::FirstPointNotAtZero(points[0].sample));
        }
        for point in points {
            check_numerator(point.numerator)?;
        }
        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].sample <= pair[0].sample {
                return Err(TempoError::NonIncreasingPosition {
                    index: index + 1,
                    sample: pair[1].sample,
                });
            }
            if pair[1].bar <= pair[0].bar {
                return Err(TempoError::NonIncreasingBar {
                    index: index + 1,
                    bar: pair[1].bar,
                });
            }
        }

        let mut segments = Vec::with_capacity(points.len());
        let mut interval = 0.0;
        for pair in points.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let beats = (to.bar - from.bar) as u64 * from.numerator as u64;
            interval = (to.sample - from.sample) as f64 / beats as f64;
            segments.push(Segment {
                start: from.sample,
                bar: from.bar,
                numerator: from.numerator,
                interval,
                beats: Some(beats),
            });
        }

        // Past the last point the last beat spacing carries on
        let last = points[points.len() - 1];
        segments.push(Segment {
            start: last.sample,
            bar: last.bar,
            numerator: last.numerator,
            interval,
            beats: None,
        });

        Ok(Self {
            kind: TempoKind::Variable(points.to_vec()),
            sample_rate,
            segments,
        })
    }

    /// 120 BPM in 4/4
    pub fn default_for(sample_rate: u32) -> Self {
        Self {
            kind: TempoKind::Constant {
                bpm: DEFAULT_BPM,
                numerator: DEFAULT_NUMERATOR,
            },
            sample_rate,
            segments: vec![Segment {
                start: 0,
                bar: 1,
                numerator: DEFAULT_NUMERATOR,
                interval: sample_rate as f64 * 60.0 / DEFAULT_BPM,
                beats: None,
            }],
        }
    }

    pub fn kind(&self) -> &TempoKind {
        &self.kind
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, TempoKind::Constant { .. })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    fn segment_at(&self, sample: u64) -> &Segment {
        let index = self
            .segments
            .partition_point(|s| s.start <= sample)
            .saturating_sub(1);
        &self.segments[index]
    }

    /// First click with onset at or after `sample`
    pub fn next_click(&self, sample: u64) -> Click {
        let index = self
            .segments
            .partition_point(|s| s.start <= sample)
            .saturating_sub(1);
        let segment = &self.segments[index];
        let beat = segment.first_beat_from(sample);

        match (segment.beats, self.segments.get(index + 1)) {
            (Some(beats), Some(next)) if beat >= beats => next.click(0),
            _ => segment.click(beat),
        }
    }

    /// Bar / beat at a sample position
    pub fn musical_position(&self, sample: u64) -> MusicalPosition {
        let segment = self.segment_at(sample);
        let (beat, fraction) = segment.beat_at(sample);
        let numerator = segment.numerator as u64;
        MusicalPosition {
            bar: segment.bar + (beat / numerator) as u32,
            beat: (beat % numerator) as u32 + 1,
            fraction,
        }
    }

    /// Sample position where `bar` / `beat` (1-based) starts
    ///
    /// Bars before the start of the map clamp to the first bar, beats clamp
    /// to the meter in effect for that bar.
    pub fn sample_at(&self, bar: u32, beat: u32) -> u64 {
        let index = self
            .segments
            .partition_point(|s| s.bar <= bar)
            .saturating_sub(1);
        let segment = &self.segments[index];
        let numerator = segment.numerator as u32;
        let bar = bar.max(segment.bar);
        let beat_in_bar = beat.clamp(1, numerator) - 1;
        let beat_index = (bar - segment.bar) as u64 * numerator as u64 + beat_in_bar as u64;
        segment.onset(beat_index)
    }

    /// Local tempo at a sample position
    pub fn bpm_at(&self, sample: u64) -> f64 {
        match self.kind {
            TempoKind::Constant { bpm, .. } => bpm,
            TempoKind::Variable(_) => {
                let segment = self.segment_at(sample);
                self.sample_rate as f64 * 60.0 / segment.interval
            }
        }
    }

    /// Time signature numerator in effect at a sample position
    pub fn numerator_at(&self, sample: u64) -> u8 {
        self.segment_at(sample).numerator
    }
}

fn check_numerator(numerator: u8) -> Result<(), TempoError> {
    if (1..=MAX_NUMERATOR).contains(&numerator) {
        Ok(())
    } else {
        Err(TempoError::NumeratorOutOfRange(numerator))
    }
}
