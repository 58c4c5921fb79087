//! Stem file decoding

use glissando_audio::StemAudio;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while loading a stem
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Decodes stem files into engine-ready audio
///
/// Output is mono for mono sources and stereo otherwise (channels past the
/// first two are dropped), resampled to the engine rate.
pub struct StemLoader {
    target_sample_rate: u32,
}

impl Default for StemLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StemLoader {
    /// Create a loader targeting 48kHz
    pub fn new() -> Self {
        Self::with_sample_rate(48000)
    }

    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Load and decode a stem file
    pub fn load(&self, path: &Path) -> Result<StemAudio, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Stopped reading {}: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                // Corrupt packet: skip it and keep going
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count();

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if channels == 0 {
            return Err(LoadError::NoAudioTrack);
        }

        let (samples, channels) = keep_front_pair(samples, channels);

        let samples = if source_sample_rate != self.target_sample_rate {
            self.resample(&samples, source_sample_rate, channels)?
        } else {
            samples
        };

        debug!(
            "Decoded {}: {} frame(s), {} channel(s), {} Hz -> {} Hz",
            path.display(),
            samples.len() / channels,
            channels,
            source_sample_rate,
            self.target_sample_rate
        );

        Ok(if channels == 1 {
            StemAudio::mono(samples)
        } else {
            StemAudio::stereo(samples)
        })
    }

    /// Resample interleaved audio to the target sample rate
    fn resample(
        &self,
        samples: &[f32],
        source_rate: u32,
        channels: usize,
    ) -> Result<Vec<f32>, LoadError> {
        use rubato::{FftFixedInOut, Resampler};

        let frames = samples.len() / channels;
        if frames == 0 {
            return Ok(Vec::new());
        }

        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            self.target_sample_rate as usize,
            1024,
            channels,
        )
        .map_err(|e| LoadError::Resample(e.to_string()))?;

        let deinterleaved: Vec<Vec<f32>> = (0..channels)
            .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
            .collect();

        // The first `delay` output frames are filter latency, not audio
        let delay = resampler.output_delay();
        let expected =
            (frames as u64 * self.target_sample_rate as u64 / source_rate as u64) as usize;

        let chunk_size = resampler.input_frames_next();
        let mut chunk = vec![vec![0.0f32; chunk_size]; channels];
        let mut output: Vec<Vec<f32>> =
            vec![Vec::with_capacity(delay + expected + resampler.output_frames_max()); channels];

        // Keep feeding zero-padded chunks past the end until the delayed tail is out
        let mut pos = 0;
        while output[0].len() < delay + expected {
            let end = (pos + chunk_size).min(frames);
            for (buf, source) in chunk.iter_mut().zip(&deinterleaved) {
                buf.fill(0.0);
                if pos < end {
                    buf[..end - pos].copy_from_slice(&source[pos..end]);
                }
            }

            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| LoadError::Resample(e.to_string()))?;

            for (ch, data) in resampled.into_iter().enumerate() {
                output[ch].extend(data);
            }

            pos += chunk_size;
        }

        for channel in &mut output {
            channel.drain(..delay);
            channel.truncate(expected);
        }

        let output_frames = output[0].len();
        let mut interleaved = Vec::with_capacity(output_frames * channels);
        for frame_idx in 0..output_frames {
            for channel in &output {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }
}

/// Reduce interleaved audio to at most its first two channels
fn keep_front_pair(samples: Vec<f32>, channels: usize) -> (Vec<f32>, usize) {
    if channels <= 2 {
        return (samples, channels);
    }
    let stereo = samples
        .chunks_exact(channels)
        .flat_map(|frame| [frame[0], frame[1]])
        .collect();
    (stereo, 2)
}
