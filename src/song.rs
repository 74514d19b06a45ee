//! Songs and the song set the sequencer cycles through.
//!
//! A [`SongSet`] is assembled once at startup: the built-in songs embedded by
//! `build.rs`, then inline `name:60,62,64` songs, then JSON songs files, then
//! one song per MIDI file. After that it never changes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::midi_file::load_midi_notes;

// Generated by build.rs from songs/builtin.songs
include!(concat!(env!("OUT_DIR"), "/builtin_songs.rs"));

/// Highest valid MIDI note number.
pub const MAX_NOTE: i64 = 127;

#[derive(Debug, Error)]
pub enum SongError {
    #[error("at least one song is required")]
    EmptySongSet,
    #[error("song {0:?} needs at least one MIDI note")]
    EmptyNoteList(String),
    #[error("inline song must look like name:60,62,64 (got {0:?})")]
    MissingNoteList(String),
    #[error("invalid note {0:?} in note list")]
    InvalidNote(String),
    #[error("note {0} is outside the MIDI range 0-127")]
    NoteOutOfRange(i64),
    #[error("no playable notes in MIDI file: {}", .0.display())]
    NoPlayableNotes(PathBuf),
    #[error("unknown song {0:?}")]
    UnknownSong(String),
    #[error("failed to parse MIDI file {}: {source}", path.display())]
    Midi {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },
    #[error("failed to parse songs file {}: {source}", path.display())]
    SongsFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A named, non-empty sequence of MIDI note numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    name: String,
    notes: Vec<u8>,
}

impl Song {
    pub fn new(name: impl Into<String>, notes: Vec<u8>) -> Result<Self, SongError> {
        let name = name.into();
        if notes.is_empty() {
            return Err(SongError::EmptyNoteList(name));
        }
        Ok(Song { name, notes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> &[u8] {
        &self.notes
    }

    /// Number of notes; never zero.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} notes)", self.name, self.notes.len())
    }
}

/// Ordered, non-empty, immutable collection of songs.
#[derive(Debug, Clone)]
pub struct SongSet {
    songs: Vec<Song>,
}

impl SongSet {
    pub fn new(songs: Vec<Song>) -> Result<Self, SongError> {
        if songs.is_empty() {
            return Err(SongError::EmptySongSet);
        }
        Ok(SongSet { songs })
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    /// Indexing for callers that only hold checked indices.
    pub(crate) fn at(&self, index: usize) -> &Song {
        &self.songs[index]
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter()
    }

    /// Resolve a song by index, exact name, or case-insensitive name.
    pub fn find(&self, selector: &str) -> Option<usize> {
        let selector = selector.trim();
        if let Ok(index) = selector.parse::<usize>() {
            return (index < self.songs.len()).then_some(index);
        }
        self.songs
            .iter()
            .position(|song| song.name == selector)
            .or_else(|| {
                self.songs
                    .iter()
                    .position(|song| song.name.eq_ignore_ascii_case(selector))
            })
    }
}

fn note_from_int(value: i64) -> Result<u8, SongError> {
    if (0..=MAX_NOTE).contains(&value) {
        Ok(value as u8)
    } else {
        Err(SongError::NoteOutOfRange(value))
    }
}

/// Parse an inline song of the form `name:60,62,64`.
///
/// Blank items between commas are skipped and a blank name becomes `custom`.
pub fn parse_inline_song(raw: &str) -> Result<Song, SongError> {
    let (name, body) = match raw.split_once(':') {
        Some((name, body)) if !body.is_empty() => (name, body),
        _ => return Err(SongError::MissingNoteList(raw.to_string())),
    };

    let notes = body
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let value = item
                .parse::<i64>()
                .map_err(|_| SongError::InvalidNote(item.to_string()))?;
            note_from_int(value)
        })
        .collect::<Result<Vec<u8>, SongError>>()?;

    let name = match name.trim() {
        "" => "custom",
        trimmed => trimmed,
    };
    Song::new(name, notes)
}

/// The songs embedded at build time, in file order.
pub fn builtin_songs() -> Vec<Song> {
    BUILTIN_SONGS
        .iter()
        .map(|(name, notes)| Song {
            name: name.to_string(),
            notes: notes.to_vec(),
        })
        .collect()
}

#[derive(Deserialize)]
struct SongEntry {
    name: String,
    notes: Vec<i64>,
}

/// Load songs from a JSON file shaped like `[{"name": "...", "notes": [60, 62]}]`.
pub fn load_songs_file<P: AsRef<Path>>(path: P) -> Result<Vec<Song>, SongError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| SongError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<SongEntry> =
        serde_json::from_str(&data).map_err(|source| SongError::SongsFile {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .map(|entry| {
            let notes = entry
                .notes
                .into_iter()
                .map(note_from_int)
                .collect::<Result<Vec<u8>, SongError>>()?;
            Song::new(entry.name, notes)
        })
        .collect()
}

/// Song name used for a MIDI file: `MIDI:<file name>`.
pub fn midi_song_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("MIDI:{}", file_name)
}

/// Build the song set: built-ins, inline songs, songs files, then MIDI files.
pub fn collect_songs<P, Q>(
    inline: &[Song],
    songs_files: &[P],
    midi_files: &[Q],
) -> Result<SongSet, SongError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut songs = builtin_songs();
    songs.extend(inline.iter().cloned());

    for path in songs_files {
        let loaded = load_songs_file(path)?;
        debug!(
            "loaded {} songs from {}",
            loaded.len(),
            path.as_ref().display()
        );
        songs.extend(loaded);
    }

    for path in midi_files {
        let path = path.as_ref();
        let notes = load_midi_notes(path)?;
        if notes.is_empty() {
            return Err(SongError::NoPlayableNotes(path.to_path_buf()));
        }
        info!("loaded {} notes from {}", notes.len(), path.display());
        songs.push(Song::new(midi_song_name(path), notes)?);
    }

    SongSet::new(songs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_inline_song() {
        let song = parse_inline_song("scale:60, 62,,64").unwrap();
        assert_eq!(song.name(), "scale");
        assert_eq!(song.notes(), &[60, 62, 64]);
    }

    #[test]
    fn test_parse_inline_song_blank_name() {
        let song = parse_inline_song(" :72").unwrap();
        assert_eq!(song.name(), "custom");
        assert_eq!(song.notes(), &[72]);
    }

    #[test]
    fn test_parse_inline_song_errors() {
        assert!(matches!(
            parse_inline_song("nobody"),
            Err(SongError::MissingNoteList(_))
        ));
        assert!(matches!(
            parse_inline_song("empty:"),
            Err(SongError::MissingNoteList(_))
        ));
        assert!(matches!(
            parse_inline_song("bad:60,sixty"),
            Err(SongError::InvalidNote(item)) if item == "sixty"
        ));
        assert!(matches!(
            parse_inline_song("commas:, ,"),
            Err(SongError::EmptyNoteList(_))
        ));
        assert!(matches!(
            parse_inline_song("high:200"),
            Err(SongError::NoteOutOfRange(200))
        ));
    }

    #[test]
    fn test_builtin_songs_order() {
        let songs = builtin_songs();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].name(), "Twinkle Fragment");
        assert_eq!(songs[0].len(), 14);
        assert_eq!(songs[1].name(), "Ascending C Major");
        assert_eq!(songs[1].notes(), &[60, 62, 64, 65, 67, 69, 71, 72]);
    }

    #[test]
    fn test_empty_song_set_rejected() {
        assert!(matches!(
            SongSet::new(Vec::new()),
            Err(SongError::EmptySongSet)
        ));
        assert!(matches!(
            Song::new("none", Vec::new()),
            Err(SongError::EmptyNoteList(_))
        ));
    }

    #[test]
    fn test_find_song() {
        let set = SongSet::new(builtin_songs()).unwrap();
        assert_eq!(set.find("1"), Some(1));
        assert_eq!(set.find("5"), None);
        assert_eq!(set.find("Twinkle Fragment"), Some(0));
        assert_eq!(set.find("ascending c major"), Some(1));
        assert_eq!(set.find("nope"), None);
    }

    #[test]
    fn test_collect_songs_order() {
        let inline = vec![parse_inline_song("mine:50,51").unwrap()];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "from json", "notes": [70, 71, 72]}}]"#).unwrap();

        let set = collect_songs(&inline, &[file.path()], &[] as &[&Path]).unwrap();
        let names: Vec<&str> = set.iter().map(Song::name).collect();
        assert_eq!(
            names,
            ["Twinkle Fragment", "Ascending C Major", "mine", "from json"]
        );
    }

    #[test]
    fn test_songs_file_rejects_bad_notes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "x", "notes": [-1]}}]"#).unwrap();
        assert!(matches!(
            load_songs_file(file.path()),
            Err(SongError::NoteOutOfRange(-1))
        ));

        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        write!(garbage, "not json").unwrap();
        assert!(matches!(
            load_songs_file(garbage.path()),
            Err(SongError::SongsFile { .. })
        ));
    }

    #[test]
    fn test_midi_song_name() {
        assert_eq!(
            midi_song_name(Path::new("/tmp/tunes/ode.mid")),
            "MIDI:ode.mid"
        );
    }
}
