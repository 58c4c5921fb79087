//! Command queue between the control thread and the audio thread
//!
//! Commands travel over a bounded channel and are drained by the audio
//! thread between blocks, in send order. Heap objects the audio thread
//! replaces travel back over a second channel so they are freed on the
//! control side, never inside the audio callback.

use crate::stems::StemSet;
use crate::tempo::TempoMap;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Default command queue capacity
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Commands sent to the audio thread
///
/// Large payloads are boxed so the enum stays small and moving it through
/// the channel never copies stem data.
#[derive(Debug)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
    /// Stop and unload the song; carries the empty replacements
    ResetPlayback {
        stems: Box<StemSet>,
        tempo: Box<TempoMap>,
    },
    SetPosition(i64),
    SetTrackLength(u64),
    SetTempo(Box<TempoMap>),
    SetMetronomeEnabled(bool),
    ToggleMetronome,
    SetMetronomeGainDb(f32),
    ReplaceStems(Box<StemSet>),
}

/// Objects the audio thread has swapped out
#[derive(Debug)]
pub enum Retired {
    Stems(Box<StemSet>),
    Tempo(Box<TempoMap>),
}

/// Control-side ends
pub struct ControlChannels {
    pub commands: Sender<PlayerCommand>,
    pub retired: Receiver<Retired>,
}

/// Audio-side ends
pub struct AudioChannels {
    pub commands: Receiver<PlayerCommand>,
    pub retired: Sender<Retired>,
}

/// Create the command queue and its return path
///
/// The return path holds twice as many slots as the queue, since one
/// reset can retire both a stem set and a tempo map.
pub fn create_channels(capacity: usize) -> (ControlChannels, AudioChannels) {
    let capacity = capacity.max(1);
    let (cmd_tx, cmd_rx) = bounded(capacity);
    let (ret_tx, ret_rx) = bounded(capacity * 2);
    (
        ControlChannels {
            commands: cmd_tx,
            retired: ret_rx,
        },
        AudioChannels {
            commands: cmd_rx,
            retired: ret_tx,
        },
    )
}
