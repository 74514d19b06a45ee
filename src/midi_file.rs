//! Note extraction from Standard MIDI Files.
//!
//! Only pitch order matters here: every note-on with non-zero velocity is
//! collected from every track, and the notes are ordered by their absolute
//! tick. Timing, channels and durations are discarded.

use std::fs;
use std::path::Path;

use log::trace;
use midly::{MidiMessage, Smf, TrackEventKind};

use crate::song::SongError;

/// Pitches of all note-on events in `data`, ordered by absolute tick.
///
/// Notes sharing a tick keep track order, then event order.
pub fn notes_from_bytes(data: &[u8]) -> Result<Vec<u8>, midly::Error> {
    let smf = Smf::parse(data)?;
    let mut notes: Vec<(u64, u8)> = Vec::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut abs_time = 0u64;
        for event in track.iter() {
            abs_time += event.delta.as_int() as u64;
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } = event.kind
            {
                if vel.as_int() > 0 {
                    trace!(
                        "track {} tick {}: note on {}",
                        track_index,
                        abs_time,
                        key.as_int()
                    );
                    notes.push((abs_time, key.as_int()));
                }
            }
        }
    }

    // sort_by_key is stable, which keeps the per-track ordering for ties
    notes.sort_by_key(|(tick, _)| *tick);
    Ok(notes.into_iter().map(|(_, key)| key).collect())
}

/// Read a MIDI file and return its note-on pitches in playing order.
pub fn load_midi_notes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, SongError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| SongError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    notes_from_bytes(&data).map_err(|source| SongError::Midi {
        path: path.to_path_buf(),
        source,
    })
}
