use ansi_term::Colour;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::listener::{global_key_source, KeySource, ListenError, TerminalKeys};
use crate::player::{build_player, PlayerKind};
use crate::sequencer::SequencerState;
use crate::song::{collect_songs, parse_inline_song, Song, SongError, SongSet};
use crate::synth::DEFAULT_NOTE_SECONDS;
use crate::trigger::TriggerHandler;
use crate::{set_shutdown_flag, SingerConfig, DEFAULT_GATE_SECONDS};

#[derive(Parser)]
#[command(name = "keysinger")]
#[command(about = "Play the next note of a song on every key press")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Seconds to ignore repeated key presses
    #[arg(long, default_value_t = DEFAULT_GATE_SECONDS, allow_negative_numbers = true)]
    pub gate: f64,

    /// Path to a MIDI file; can be passed multiple times
    #[arg(long = "midi")]
    pub midi_files: Vec<PathBuf>,

    /// Inline song, e.g. name:60,62,64; can be passed multiple times
    #[arg(long = "song", value_parser = parse_inline_song)]
    pub songs: Vec<Song>,

    /// JSON file with a list of {"name", "notes"} songs
    #[arg(long = "songs-file")]
    pub songs_files: Vec<PathBuf>,

    /// Song to start on, by index or name
    #[arg(long)]
    pub start: Option<String>,

    /// How the notes are sounded
    #[arg(long, value_enum, default_value_t = PlayerKind::Synth)]
    pub player: PlayerKind,

    /// MIDI output port index for --player midi
    #[arg(long, default_value_t = 0)]
    pub midi_port: usize,

    /// Length of each note in seconds
    #[arg(
        long = "note-seconds",
        default_value_t = DEFAULT_NOTE_SECONDS,
        value_parser = parse_note_seconds
    )]
    pub note_seconds: f32,

    /// Only listen to key presses in this terminal instead of system-wide
    #[arg(long)]
    pub terminal: bool,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List all available songs
    List,

    /// Listen for key presses and play notes (default)
    Listen,
}

fn parse_note_seconds(raw: &str) -> Result<f32, String> {
    let seconds: f32 = raw
        .parse()
        .map_err(|_| format!("{:?} is not a number", raw))?;
    if seconds.is_finite() && seconds > 0.0 && seconds <= 60.0 {
        Ok(seconds)
    } else {
        Err(format!("note length must be between 0 and 60 seconds (got {})", seconds))
    }
}

impl Cli {
    pub fn config(&self) -> SingerConfig {
        SingerConfig {
            gate_seconds: self.gate,
            note_length: Duration::from_secs_f32(self.note_seconds),
            player: self.player,
            midi_port: self.midi_port,
            start_song: self.start.clone(),
            global: !self.terminal,
        }
    }
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let songs = collect_songs(&cli.songs, &cli.songs_files, &cli.midi_files)?;

    match cli.command.unwrap_or(Commands::Listen) {
        Commands::List => {
            print!("{}", format_song_list(&songs));
            Ok(())
        }
        Commands::Listen => run_listener(songs, &cli.config()),
    }
}

/// Build the sequencer, player and key source, then block until shutdown.
pub fn run_listener(songs: SongSet, config: &SingerConfig) -> Result<(), Box<dyn Error>> {
    let start_index = match &config.start_song {
        Some(selector) => Some(
            songs
                .find(selector)
                .ok_or_else(|| SongError::UnknownSong(selector.clone()))?,
        ),
        None => None,
    };

    let state = Arc::new(SequencerState::new(songs, config.gate_seconds));
    if let Some(index) = start_index {
        state.select_song(index)?;
    }

    let player = build_player(config.player, config.note_length, config.midi_port)?;
    let (source, global) = select_key_source(config.global)?;

    let exit_on_signal = global;
    ctrlc::set_handler(move || {
        set_shutdown_flag();
        // The global hook never returns on its own
        if exit_on_signal {
            std::process::exit(0);
        }
    })?;

    let song = state.current_song();
    let scope = if global { "globally" } else { "in this terminal" };
    println!(
        "{}",
        Colour::Green
            .bold()
            .paint(format!("🎹 Keyboard Singer is listening {}. Press Ctrl+C to stop.", scope))
    );
    println!(
        "🎵 Current song: {}",
        Colour::Cyan.paint(format!("{} ({} notes)", song.name(), song.len()))
    );
    println!("⏱️  Gate: {:.2}s", state.gate().as_secs_f64());
    info!(
        "{} songs loaded, player {:?}",
        state.songs().len(),
        config.player
    );

    let handler = TriggerHandler::with_status_writer(
        Arc::clone(&state),
        player,
        source.status_writer(),
    );
    source.listen(Arc::new(handler))?;

    println!("👋 Stopped.");
    Ok(())
}

/// Pick the key source, falling back to the terminal when this build has no
/// system-wide hook. The flag says whether the global hook was chosen.
pub fn select_key_source(global: bool) -> Result<(Box<dyn KeySource>, bool), ListenError> {
    if !global {
        return Ok((Box::new(TerminalKeys), false));
    }
    match global_key_source() {
        Ok(source) => Ok((source, true)),
        Err(ListenError::GlobalUnavailable) => {
            warn!("built without the `global` feature, listening in this terminal only");
            Ok((Box::new(TerminalKeys), false))
        }
        Err(e) => Err(e),
    }
}

/// Song list as printed by the `list` command.
pub fn format_song_list(songs: &SongSet) -> String {
    let mut output = String::new();
    output.push_str("Available Songs:\n");
    for (i, song) in songs.iter().enumerate() {
        output.push_str(&format!("{}: {} ({} notes)\n", i, song.name(), song.len()));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["keysinger"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.gate, DEFAULT_GATE_SECONDS);
        assert_eq!(cli.player, PlayerKind::Synth);
        assert!(cli.songs.is_empty());
        assert!(!cli.terminal);

        let config = cli.config();
        assert!(config.global);
        assert_eq!(config.note_length, Duration::from_secs_f32(DEFAULT_NOTE_SECONDS));
        assert_eq!(config.start_song, None);
    }

    #[test]
    fn test_repeated_songs_keep_order() {
        let cli = Cli::try_parse_from([
            "keysinger",
            "--song",
            "a:60,61",
            "--song",
            "b:70",
            "--midi",
            "one.mid",
            "--midi",
            "two.mid",
            "--gate",
            "-1",
            "--player",
            "silent",
            "list",
        ])
        .unwrap();

        let names: Vec<&str> = cli.songs.iter().map(Song::name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(cli.midi_files, [PathBuf::from("one.mid"), PathBuf::from("two.mid")]);
        assert_eq!(cli.gate, -1.0);
        assert_eq!(cli.player, PlayerKind::Silent);
        assert_eq!(cli.command, Some(Commands::List));
    }

    #[test]
    fn test_malformed_inline_song_is_rejected() {
        assert!(Cli::try_parse_from(["keysinger", "--song", "nonotes"]).is_err());
        assert!(Cli::try_parse_from(["keysinger", "--song", "x:60,abc"]).is_err());
    }

    #[test]
    fn test_note_seconds_validation() {
        assert!(Cli::try_parse_from(["keysinger", "--note-seconds", "0"]).is_err());
        let cli = Cli::try_parse_from(["keysinger", "--note-seconds", "0.25"]).unwrap();
        assert_eq!(cli.config().note_length, Duration::from_secs_f32(0.25));
    }

    #[test]
    fn test_terminal_flag_turns_off_global_listening() {
        let cli = Cli::try_parse_from(["keysinger", "--terminal"]).unwrap();
        assert!(!cli.config().global);

        let (_, global) = select_key_source(false).unwrap();
        assert!(!global);
    }

    #[test]
    fn test_default_key_source_is_global_when_built_in() {
        let (_, global) = select_key_source(true).unwrap();
        assert_eq!(global, cfg!(feature = "global"));
    }

    #[test]
    fn test_format_song_list() {
        let songs = SongSet::new(vec![
            Song::new("One", vec![60]).unwrap(),
            Song::new("Two", vec![62, 64]).unwrap(),
        ])
        .unwrap();
        assert_eq!(
            format_song_list(&songs),
            "Available Songs:\n0: One (1 notes)\n1: Two (2 notes)\n"
        );
    }
}
