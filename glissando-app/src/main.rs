//! Glissando - headless multi-stem player
//!
//! Plays one song manifest through the default output device and reports
//! position and output levels through the log.
//!
//! Usage: `glissando [song-manifest]` (defaults to the last song played)

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::Receiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use glissando_audio::{AudioSession, PlaybackState, PlayerHandle, StemAudio, StemPlayer};
use glissando_library::{Config, LoadError, SongManifest, StemLoader};

/// Control loop period (~30fps, matching a UI poll)
const POLL_INTERVAL: Duration = Duration::from_millis(33);

/// How often playback status is logged
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

type LoadResult = (u32, Result<StemAudio, LoadError>);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::load();
    let song_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.last_song.clone())
        .context("no song manifest given and none played before")?;

    let manifest = SongManifest::load(&song_path)
        .with_context(|| format!("failed to read song {}", song_path.display()))?;

    let mut session = AudioSession::acquire()?;
    let sample_rate = session.sample_rate();
    let (mut player, core) = PlayerHandle::create(sample_rate, &config.to_engine_config());
    session.start(core)?;

    manifest.apply(&mut player)?;
    let loaded = spawn_loaders(&manifest, sample_rate);

    config.last_song = Some(song_path);
    if let Err(e) = config.save() {
        warn!("Failed to save config: {}", e);
    }

    wait_for_stems(&mut player, &mut session, &loaded, manifest.stems.len())?;
    player.play()?;
    info!("Playing '{}'", manifest.title);

    run(&mut player, &mut session)
}

/// Decode every stem on its own thread
fn spawn_loaders(manifest: &SongManifest, sample_rate: u32) -> Receiver<LoadResult> {
    let (tx, rx) = crossbeam_channel::unbounded();
    for stem in &manifest.stems {
        let tx = tx.clone();
        let id = stem.id;
        let path = PathBuf::from(&stem.path);
        thread::spawn(move || {
            let loader = StemLoader::with_sample_rate(sample_rate);
            let _ = tx.send((id, loader.load(&path)));
        });
    }
    rx
}

/// Hand decoded stems to the player until every stem has loaded or failed
fn wait_for_stems(
    player: &mut PlayerHandle,
    session: &mut AudioSession,
    loaded: &Receiver<LoadResult>,
    expected: usize,
) -> anyhow::Result<()> {
    let mut done = 0;
    while done < expected {
        session.check()?;
        match loaded.recv_timeout(POLL_INTERVAL) {
            Ok((id, Ok(audio))) => {
                player.load_stem_audio(id, audio)?;
                done += 1;
                info!("Stem {} loaded ({}/{})", id, done, expected);
            }
            Ok((id, Err(e))) => {
                warn!("Stem {} failed to load, it will stay silent: {}", id, e);
                done += 1;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Report status until playback ends or the device fails
fn run(player: &mut PlayerHandle, session: &mut AudioSession) -> anyhow::Result<()> {
    let sample_rate = player.sample_rate() as f64;
    let mut last_report = Instant::now();
    let mut started = false;

    loop {
        session.check()?;

        let snapshot = player.snapshot();
        match snapshot.state {
            PlaybackState::Playing => started = true,
            PlaybackState::Stopped if started => {
                info!("Playback finished");
                return Ok(());
            }
            _ => {}
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let position = player.musical_position();
            info!(
                "{:>8.2}s / {:.2}s  bar {} beat {}  {:.1} BPM  L {:.1} dB  R {:.1} dB  GR {:.1} dB",
                snapshot.position as f64 / sample_rate,
                snapshot.track_length as f64 / sample_rate,
                position.bar,
                position.beat,
                player.track_bpm(),
                snapshot.levels.left_db,
                snapshot.levels.right_db,
                snapshot.gain_reduction_db
            );
            last_report = Instant::now();
        }

        thread::sleep(POLL_INTERVAL);
    }
}
