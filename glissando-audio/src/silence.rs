//! Silence regions inside stem audio
//!
//! Long stretches of near-silence are found once when a stem is loaded so
//! the mixer can skip blocks that fall entirely inside one.

/// Peak amplitude below which a frame counts as silent (400 / 32768)
pub const SILENCE_THRESHOLD: f32 = 400.0 / 32768.0;

/// Shortest run of silent frames that is recorded as a region
pub const MIN_SILENCE_FRAMES: usize = 100_000;

/// Half-open frame range `[start, end)` of silence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceRegion {
    pub start: u64,
    pub end: u64,
}

/// Scans interleaved audio for silent runs
#[derive(Debug, Clone, Copy)]
pub struct SilenceDetector {
    threshold: f32,
    min_frames: usize,
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self {
            threshold: SILENCE_THRESHOLD,
            min_frames: MIN_SILENCE_FRAMES,
        }
    }
}

impl SilenceDetector {
    pub fn new(threshold: f32, min_frames: usize) -> Self {
        Self {
            threshold,
            min_frames: min_frames.max(1),
        }
    }

    /// Find silent runs of at least `min_frames` frames, sorted by start
    pub fn detect(&self, samples: &[f32], channels: usize) -> Vec<SilenceRegion> {
        let channels = channels.max(1);
        let mut regions = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut frames = 0;

        for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
            frames = frame + 1;
            let silent = chunk.iter().all(|s| s.abs() < self.threshold);
            match (silent, run_start) {
                (true, None) => run_start = Some(frame),
                (false, Some(start)) => {
                    self.push_region(&mut regions, start, frame);
                    run_start = None;
                }
                _ => {}
            }
        }

        if let Some(start) = run_start {
            self.push_region(&mut regions, start, frames);
        }

        regions
    }

    fn push_region(&self, regions: &mut Vec<SilenceRegion>, start: usize, end: usize) {
        if end - start >= self.min_frames {
            regions.push(SilenceRegion {
                start: start as u64,
                end: end as u64,
            });
        }
    }
}

/// True if `[start, end)` lies entirely within one of `regions`
///
/// `regions` must be sorted and non-overlapping, as returned by
/// [`SilenceDetector::detect`].
pub fn covers(regions: &[SilenceRegion], start: u64, end: u64) -> bool {
    let idx = regions.partition_point(|r| r.end <= start);
    regions
        .get(idx)
        .map_or(false, |r| r.start <= start && end <= r.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_long_silence_only() {
        let detector = SilenceDetector::new(0.01, 10);
        let mut samples = vec![0.5f32; 2 * 5];
        samples.extend(vec![0.0; 2 * 20]); // frames 5..25
        samples.extend(vec![0.5; 2 * 3]);
        samples.extend(vec![0.0; 2 * 4]); // too short
        samples.extend(vec![0.5; 2 * 2]);

        let regions = detector.detect(&samples, 2);
        assert_eq!(regions, vec![SilenceRegion { start: 5, end: 25 }]);
    }

    #[test]
    fn test_trailing_silence_is_closed() {
        let detector = SilenceDetector::new(0.01, 10);
        let mut samples = vec![0.5f32; 3];
        samples.extend(vec![0.001; 12]);

        let regions = detector.detect(&samples, 1);
        assert_eq!(regions, vec![SilenceRegion { start: 3, end: 15 }]);
    }

    #[test]
    fn test_any_loud_channel_breaks_silence() {
        let detector = SilenceDetector::new(0.01, 2);
        let samples = vec![0.0, 0.0, 0.0, 0.9, 0.0, 0.0, 0.0, 0.0];
        let regions = detector.detect(&samples, 2);
        assert_eq!(regions, vec![SilenceRegion { start: 2, end: 4 }]);
    }

    #[test]
    fn test_default_threshold() {
        let detector = SilenceDetector::default();
        let quiet = vec![0.01f32; MIN_SILENCE_FRAMES];
        assert_eq!(detector.detect(&quiet, 1).len(), 1);

        let audible = vec![0.02f32; MIN_SILENCE_FRAMES];
        assert!(detector.detect(&audible, 1).is_empty());
    }

    #[test]
    fn test_covers() {
        let regions = [
            SilenceRegion { start: 100, end: 200 },
            SilenceRegion { start: 500, end: 900 },
        ];

        assert!(covers(&regions, 100, 200));
        assert!(covers(&regions, 600, 700));
        assert!(!covers(&regions, 50, 150));
        assert!(!covers(&regions, 150, 250));
        assert!(!covers(&regions, 300, 400));
        assert!(!covers(&regions, 900, 950));
        assert!(!covers(&[], 0, 10));
    }
}
