//! Audio output session
//!
//! One session per process: acquired when the application starts playing
//! audio, released exactly once when the [`AudioSession`] is dropped. A
//! stream error ends the session for good; reopening the device is left
//! to the application.

use crate::engine::PlayerCore;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Frames converted per pass for devices that are not stereo
const SCRATCH_FRAMES: usize = 8192;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Claim on the process-wide session slot
struct SessionSlot;

impl SessionSlot {
    fn acquire() -> Result<Self, AudioError> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionSlot)
            .map_err(|_| AudioError::SessionActive)
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

/// Default output device plus the stream feeding it
pub struct AudioSession {
    // Declared first so the stream stops before the slot is released
    stream: Option<cpal::Stream>,
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    error_tx: Sender<AudioError>,
    error_rx: Receiver<AudioError>,
    failure: Option<AudioError>,
    _slot: SessionSlot,
}

impl AudioSession {
    /// Open the default output device
    pub fn acquire() -> Result<Self, AudioError> {
        let slot = SessionSlot::acquire()?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;

        info!(
            "Audio device: {} ({} Hz, {} channel(s))",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config.sample_rate().0,
            config.channels()
        );

        let (error_tx, error_rx) = bounded(8);
        Ok(Self {
            stream: None,
            device,
            config,
            error_tx,
            error_rx,
            failure: None,
            _slot: slot,
        })
    }

    /// True while some session holds the process-wide slot
    pub fn is_active() -> bool {
        SESSION_ACTIVE.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    /// Move the player core into the device callback and start the stream
    pub fn start(&mut self, mut core: PlayerCore) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::AlreadyStarted);
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let channels = self.channels();
        // Pre-allocated so the callback never allocates for mono / surround devices
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * 2];
        let error_tx = self.error_tx.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if channels == 2 {
                        core.process(data);
                        return;
                    }
                    for out in data.chunks_mut(SCRATCH_FRAMES * channels) {
                        let stereo = &mut scratch[..(out.len() / channels) * 2];
                        core.process(stereo);
                        write_device_frames(stereo, out, channels);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    let _ = error_tx.try_send(AudioError::DeviceLost(err.to_string()));
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        info!("Audio stream started");
        self.stream = Some(stream);
        Ok(())
    }

    /// Report a device failure, if one happened
    ///
    /// The first failure stops the stream and is returned from every later call.
    pub fn check(&mut self) -> Result<(), AudioError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if let Ok(failure) = self.error_rx.try_recv() {
            warn!("Audio session ended: {}", failure);
            self.stream = None;
            self.failure = Some(failure.clone());
            return Err(failure);
        }
        Ok(())
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        info!("Audio session closed");
    }
}

/// Spread stereo frames over a device with `channels` outputs
///
/// Mono devices get the average of both sides; extra channels stay silent.
fn write_device_frames(stereo: &[f32], out: &mut [f32], channels: usize) {
    for (frame, pair) in out.chunks_exact_mut(channels).zip(stereo.chunks_exact(2)) {
        if channels == 1 {
            frame[0] = (pair[0] + pair[1]) * 0.5;
        } else {
            frame[0] = pair[0];
            frame[1] = pair[1];
            frame[2..].fill(0.0);
        }
    }
}
