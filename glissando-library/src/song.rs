//! Song manifest - stems and tempo for one song
//!
//! A manifest is a `key=value` text file:
//!
//! ```text
//! title=Intro
//! samples=2880000
//! bpm=120
//! time_signature=4/4
//! stem=1,drums.flac,0,0.0,0.0
//! stem=2,bass.flac,48000,-3.0,-0.5
//! ```
//!
//! A song carries either `bpm` + `time_signature` or two or more
//! `tempo_point=sample,bar,numerator` lines, never both. Stem lines are
//! `id,path,offset,gain_db,pan`; relative paths resolve against the
//! manifest's directory.

use glissando_audio::{PlayerResult, StemInfo, StemPlayer, TempoError, TempoMap, TempoPoint};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Sample rate used only to validate tempo while parsing
const VALIDATION_SAMPLE_RATE: u32 = 48000;

/// Errors that can occur while reading a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("song has both a constant tempo and tempo points")]
    ConflictingTempo,
    #[error("song has no tempo (needs bpm + time_signature or tempo points)")]
    MissingTempo,
    #[error("duplicate stem id {0}")]
    DuplicateStem(u32),
    #[error("invalid tempo: {0}")]
    InvalidTempo(#[from] TempoError),
}

/// Tempo description of a song
#[derive(Debug, Clone, PartialEq)]
pub enum SongTempo {
    Constant { bpm: f64, numerator: u8 },
    Variable(Vec<TempoPoint>),
}

/// Parsed song manifest
#[derive(Debug, Clone, PartialEq)]
pub struct SongManifest {
    pub title: String,
    /// Track length in samples
    pub samples: u64,
    pub tempo: SongTempo,
    pub stems: Vec<StemInfo>,
}

impl SongManifest {
    /// Read a manifest file, resolving stem paths against its directory
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        let mut manifest = Self::parse(&content)?;

        if let Some(dir) = path.parent() {
            for stem in &mut manifest.stems {
                let stem_path = Path::new(&stem.path);
                if stem_path.is_relative() {
                    stem.path = dir.join(stem_path).to_string_lossy().into_owned();
                }
            }
        }

        info!(
            "Loaded song '{}': {} stem(s), {} samples",
            manifest.title,
            manifest.stems.len(),
            manifest.samples
        );
        Ok(manifest)
    }

    /// Parse manifest text
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let mut title = None;
        let mut samples = None;
        let mut bpm = None;
        let mut numerator = None;
        let mut points = Vec::new();
        let mut stems: Vec<StemInfo> = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ManifestError::InvalidLine {
                line: line_no,
                reason: "expected key=value".into(),
            })?;
            let value = value.trim();

            match key.trim() {
                "title" => title = Some(value.to_string()),
                "samples" => samples = Some(parse_field(value, line_no, "samples")?),
                "bpm" => bpm = Some(parse_field::<f64>(value, line_no, "bpm")?),
                "time_signature" => {
                    // Accept "3/4" or a bare numerator
                    let top = value.split('/').next().unwrap_or(value);
                    numerator = Some(parse_field::<u8>(top, line_no, "time_signature")?);
                }
                "tempo_point" => points.push(parse_tempo_point(value, line_no)?),
                "stem" => {
                    let stem = parse_stem(value, line_no)?;
                    if stems.iter().any(|s| s.id == stem.id) {
                        return Err(ManifestError::DuplicateStem(stem.id));
                    }
                    stems.push(stem);
                }
                _ => {} // Ignore unknown keys
            }
        }

        let tempo = match (bpm, numerator, points.is_empty()) {
            (Some(_), _, false) | (_, Some(_), false) => return Err(ManifestError::ConflictingTempo),
            (Some(bpm), Some(numerator), true) => SongTempo::Constant { bpm, numerator },
            (Some(_), None, true) => return Err(ManifestError::MissingField("time_signature")),
            (None, Some(_), true) => return Err(ManifestError::MissingField("bpm")),
            (None, None, false) => SongTempo::Variable(points),
            (None, None, true) => return Err(ManifestError::MissingTempo),
        };

        let manifest = Self {
            title: title.unwrap_or_default(),
            samples: samples.ok_or(ManifestError::MissingField("samples"))?,
            tempo,
            stems,
        };
        manifest.tempo_map(VALIDATION_SAMPLE_RATE)?;
        Ok(manifest)
    }

    /// Tempo map of this song at `sample_rate`
    pub fn tempo_map(&self, sample_rate: u32) -> Result<TempoMap, TempoError> {
        match &self.tempo {
            SongTempo::Constant { bpm, numerator } => {
                TempoMap::constant(*bpm, *numerator, sample_rate)
            }
            SongTempo::Variable(points) => TempoMap::variable(points, sample_rate),
        }
    }

    /// Load this song into a player: stop, then length, tempo and stems
    pub fn apply(&self, player: &mut impl StemPlayer) -> PlayerResult {
        player.stop()?;
        player.set_track_length(self.samples)?;
        match &self.tempo {
            SongTempo::Constant { bpm, numerator } => player.set_track_bpm(*bpm, *numerator)?,
            SongTempo::Variable(points) => player.set_track_varying_bpm(points)?,
        }
        player.update_stem_info(&self.stems)
    }
}

fn parse_field<T: FromStr>(value: &str, line: usize, field: &str) -> Result<T, ManifestError> {
    value.trim().parse().map_err(|_| ManifestError::InvalidLine {
        line,
        reason: format!("invalid {} `{}`", field, value),
    })
}

/// `sample,bar,numerator`
fn parse_tempo_point(value: &str, line: usize) -> Result<TempoPoint, ManifestError> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        return Err(ManifestError::InvalidLine {
            line,
            reason: "tempo_point needs sample,bar,numerator".into(),
        });
    }
    Ok(TempoPoint::new(
        parse_field(parts[0], line, "tempo point sample")?,
        parse_field(parts[1], line, "tempo point bar")?,
        parse_field(parts[2], line, "tempo point numerator")?,
    ))
}

/// `id,path,offset,gain_db,pan`
fn parse_stem(value: &str, line: usize) -> Result<StemInfo, ManifestError> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 5 {
        return Err(ManifestError::InvalidLine {
            line,
            reason: "stem needs id,path,offset,gain_db,pan".into(),
        });
    }

    let pan: f32 = parse_field(parts[4], line, "pan")?;
    if !(-1.0..=1.0).contains(&pan) {
        return Err(ManifestError::InvalidLine {
            line,
            reason: format!("pan {} outside -1..=1", pan),
        });
    }

    Ok(StemInfo {
        id: parse_field(parts[0], line, "stem id")?,
        path: parts[1].trim().to_string(),
        samples: 0,
        offset: parse_field(parts[2], line, "offset")?,
        gain_db: parse_field(parts[3], line, "gain_db")?,
        pan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glissando_audio::{EngineConfig, PlayerHandle};

    const CONSTANT: &str = "\
# Demo
title=Intro
samples=480000
bpm=96.5
time_signature=3/4
stem=1,drums.wav,0,0.0,0.0
stem=2,/abs/bass.wav,-4800,-3.5,-1
";

    #[test]
    fn test_parse_constant_song() {
        let manifest = SongManifest::parse(CONSTANT).unwrap();
        assert_eq!(manifest.title, "Intro");
        assert_eq!(manifest.samples, 480_000);
        assert_eq!(
            manifest.tempo,
            SongTempo::Constant {
                bpm: 96.5,
                numerator: 3
            }
        );
        assert_eq!(manifest.stems.len(), 2);
        assert_eq!(manifest.stems[1].offset, -4800);
        assert_eq!(manifest.stems[1].gain_db, -3.5);
        assert_eq!(manifest.stems[1].pan, -1.0);
    }

    #[test]
    fn test_parse_variable_song() {
        let content = "samples=200000\ntempo_point=0,1,4\ntempo_point=96000,5,4\n";
        let manifest = SongManifest::parse(content).unwrap();
        assert_eq!(
            manifest.tempo,
            SongTempo::Variable(vec![TempoPoint::new(0, 1, 4), TempoPoint::new(96000, 5, 4)])
        );
        assert_eq!(manifest.tempo_map(48000).unwrap().sample_at(5, 1), 96000);
    }

    #[test]
    fn test_tempo_variants_are_exclusive() {
        let both = "samples=10\nbpm=120\ntime_signature=4\ntempo_point=0,1,4\ntempo_point=10,2,4";
        assert!(matches!(
            SongManifest::parse(both),
            Err(ManifestError::ConflictingTempo)
        ));

        assert!(matches!(
            SongManifest::parse("samples=10"),
            Err(ManifestError::MissingTempo)
        ));
        assert!(matches!(
            SongManifest::parse("samples=10\nbpm=120"),
            Err(ManifestError::MissingField("time_signature"))
        ));
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        let content = "samples=10\ntempo_point=1000,1,4\ntempo_point=2000,2,4";
        assert!(matches!(
            SongManifest::parse(content),
            Err(ManifestError::InvalidTempo(TempoError::FirstPointNotAtZero(1000)))
        ));

        let content = "samples=10\nbpm=20\ntime_signature=4";
        assert!(matches!(
            SongManifest::parse(content),
            Err(ManifestError::InvalidTempo(TempoError::BpmOutOfRange(_)))
        ));
    }

    #[test]
    fn test_bad_lines_report_line_number() {
        let content = "samples=10\nbpm=120\ntime_signature=4\nstem=1,a.wav,0,0";
        match SongManifest::parse(content) {
            Err(ManifestError::InvalidLine { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected {:?}", other),
        }

        let content = "samples=10\nbpm=120\ntime_signature=4\nstem=1,a.wav,0,0,2";
        assert!(matches!(
            SongManifest::parse(content),
            Err(ManifestError::InvalidLine { line: 4, .. })
        ));

        let content = "samples=lots\nbpm=120\ntime_signature=4";
        assert!(matches!(
            SongManifest::parse(content),
            Err(ManifestError::InvalidLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_stem_ids() {
        let content = "samples=10\nbpm=120\ntime_signature=4\nstem=1,a.wav,0,0,0\nstem=1,b.wav,0,0,0";
        assert!(matches!(
            SongManifest::parse(content),
            Err(ManifestError::DuplicateStem(1))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.song");
        fs::write(&path, CONSTANT).unwrap();

        let manifest = SongManifest::load(&path).unwrap();
        assert_eq!(
            Path::new(&manifest.stems[0].path),
            dir.path().join("drums.wav")
        );
        assert_eq!(manifest.stems[1].path, "/abs/bass.wav");
    }

    #[test]
    fn test_apply_configures_player() {
        let manifest = SongManifest::parse(CONSTANT).unwrap();
        let (mut player, _core) = PlayerHandle::create(48000, &EngineConfig::default());

        manifest.apply(&mut player).unwrap();
        assert_eq!(player.track_length(), 480_000);
        assert_eq!(player.track_bpm(), 96.5);
        assert_eq!(player.stem_count(), 2);
        assert_eq!(player.tempo().numerator_at(0), 3);
    }
}
