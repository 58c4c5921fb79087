//! Transport - playback state machine and cursor

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Range of track samples rendered by one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Track sample of the first frame
    pub start: u64,
    /// Frames of audible track material; the rest of the block is silence
    pub frames: usize,
}

/// Playback cursor and state
#[derive(Debug, Clone, Default)]
pub struct Transport {
    state: PlaybackState,
    position: u64,
    track_length: u64,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn track_length(&self) -> u64 {
        self.track_length
    }

    /// Start or resume from the current position
    pub fn play(&mut self) {
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Stop and rewind to the start of the track
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.position = 0;
    }

    /// Move the cursor, clamped to `[0, track_length]`
    pub fn set_position(&mut self, sample: i64) {
        self.position = (sample.max(0) as u64).min(self.track_length);
    }

    pub fn set_track_length(&mut self, samples: u64) {
        self.track_length = samples;
        self.position = self.position.min(samples);
    }

    /// Advance by one block of `frames`
    ///
    /// Returns the span to render, or `None` when nothing plays this block.
    /// Reaching the end of the track stops playback and rewinds the cursor;
    /// a cursor already at the end stops at this block boundary.
    pub fn advance(&mut self, frames: usize) -> Option<BlockSpan> {
        if self.state != PlaybackState::Playing {
            return None;
        }

        let remaining = self.track_length.saturating_sub(self.position);
        if remaining == 0 {
            self.stop();
            return None;
        }

        let span = BlockSpan {
            start: self.position,
            frames: (frames as u64).min(remaining) as usize,
        };
        self.position += span.frames as u64;
        if self.position >= self.track_length {
            self.stop();
        }

        Some(span)
    }
}
