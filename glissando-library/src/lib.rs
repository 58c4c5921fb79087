//! Song library for Glissando - stem decoding, song manifests, and config

mod config;
mod loader;
mod song;

pub use config::Config;
pub use loader::{LoadError, StemLoader};
pub use song::{ManifestError, SongManifest, SongTempo};
