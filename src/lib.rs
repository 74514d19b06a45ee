use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub mod cli;
pub mod listener;
pub mod midi_file;
pub mod player;
pub mod sequencer;
pub mod song;
pub mod synth;
pub mod trigger;

pub use player::{Player, PlayerKind};
pub use sequencer::{SequencerState, TriggerResult};
pub use song::{Song, SongError, SongSet};
pub use trigger::TriggerHandler;

// Global shutdown flag for graceful Ctrl+C handling
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn set_shutdown_flag() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn should_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

pub const DEFAULT_GATE_SECONDS: f64 = 0.4;

#[derive(Clone, Debug)]
/// Runtime settings for a listening session
pub struct SingerConfig {
    /// Minimum time between two accepted key presses, in seconds
    pub gate_seconds: f64,
    /// How long each note sounds
    pub note_length: Duration,
    /// Which backend renders the notes
    pub player: PlayerKind,
    /// MIDI output port index for the `midi` player
    pub midi_port: usize,
    /// Song to start on, by index or name
    pub start_song: Option<String>,
    /// Capture key presses system-wide; `false` means the terminal only
    pub global: bool,
}

impl Default for SingerConfig {
    fn default() -> Self {
        SingerConfig {
            gate_seconds: DEFAULT_GATE_SECONDS,
            note_length: Duration::from_secs_f32(synth::DEFAULT_NOTE_SECONDS),
            player: PlayerKind::Synth,
            midi_port: 0,
            start_song: None,
            global: true,
        }
    }
}
