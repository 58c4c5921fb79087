//! Output bus effects

mod limiter;

pub use limiter::{Limiter, LimiterSettings};

/// Trait for audio effects
pub trait Effect: Send {
    /// Process audio samples in place (stereo interleaved)
    fn process(&mut self, samples: &mut [f32]);

    /// Reset effect state
    fn reset(&mut self);

    /// Check if effect is enabled
    fn is_enabled(&self) -> bool;

    /// Enable/disable the effect
    fn set_enabled(&mut self, enabled: bool);
}
