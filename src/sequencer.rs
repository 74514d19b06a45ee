//! The shared note cursor and its gate.
//!
//! Key callbacks may arrive on any thread, so every read and write of the
//! cursor and the last-trigger timestamp happens under one mutex. Accepted
//! triggers are therefore totally ordered and each advances the cursor once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use crate::song::{Song, SongError, SongSet};

/// Outcome of an accepted trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResult {
    pub note: u8,
    pub song_name: String,
    /// 1-based position of the note just played; shows the song length, never 0.
    pub display_position: usize,
    pub song_length: usize,
}

impl fmt::Display for TriggerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "song={} note={} index={}/{}",
            self.song_name, self.note, self.display_position, self.song_length
        )
    }
}

#[derive(Debug)]
struct Cursor {
    song_index: usize,
    note_index: usize,
    last_trigger: Option<Instant>,
}

#[derive(Debug)]
pub struct SequencerState {
    songs: Arc<SongSet>,
    gate: Duration,
    cursor: Mutex<Cursor>,
}

impl SequencerState {
    /// Negative or NaN gates are clamped to zero, which disables the gate.
    pub fn new(songs: impl Into<Arc<SongSet>>, gate_seconds: f64) -> Self {
        let gate = if gate_seconds.is_nan() || gate_seconds <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(gate_seconds).unwrap_or(Duration::MAX)
        };
        SequencerState {
            songs: songs.into(),
            gate,
            cursor: Mutex::new(Cursor {
                song_index: 0,
                note_index: 0,
                last_trigger: None,
            }),
        }
    }

    // Nothing inside the critical section can panic halfway through an update,
    // so a poisoned cursor is still consistent.
    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance to the next note unless the previous accepted trigger is still
    /// inside the gate window. A rejected trigger leaves the state untouched.
    pub fn try_advance(&self, now: Instant) -> Option<TriggerResult> {
        self.try_advance_with(now, |_| {})
    }

    /// Like [`try_advance`](Self::try_advance), but runs `on_accept` before the
    /// cursor lock is released, so callbacks see accepted triggers in order.
    /// `on_accept` must not block.
    pub fn try_advance_with<F>(&self, now: Instant, on_accept: F) -> Option<TriggerResult>
    where
        F: FnOnce(&TriggerResult),
    {
        let mut cursor = self.lock();

        if let Some(last) = cursor.last_trigger {
            if now.saturating_duration_since(last) < self.gate {
                return None;
            }
        }
        cursor.last_trigger = Some(now);

        let song = self.songs.at(cursor.song_index);
        let note = song.notes()[cursor.note_index];
        cursor.note_index = (cursor.note_index + 1) % song.len();
        let display_position = match cursor.note_index {
            0 => song.len(),
            index => index,
        };

        let result = TriggerResult {
            note,
            song_name: song.name().to_string(),
            display_position,
            song_length: song.len(),
        };
        on_accept(&result);
        Some(result)
    }

    /// Rewind the current song to its first note. The gate timer and song
    /// selection are left alone.
    pub fn restart(&self) {
        self.lock().note_index = 0;
    }

    /// Switch to another song, starting from its first note.
    pub fn select_song(&self, index: usize) -> Result<(), SongError> {
        if index >= self.songs.len() {
            return Err(SongError::UnknownSong(index.to_string()));
        }
        let mut cursor = self.lock();
        cursor.song_index = index;
        cursor.note_index = 0;
        debug!("selected song {}", index);
        Ok(())
    }

    pub fn songs(&self) -> &Arc<SongSet> {
        &self.songs
    }

    pub fn current_song(&self) -> &Song {
        let index = self.lock().song_index;
        self.songs.at(index)
    }

    pub fn gate(&self) -> Duration {
        self.gate
    }

    /// `(song_index, note_index)` of the next note to play.
    pub fn position(&self) -> (usize, usize) {
        let cursor = self.lock();
        (cursor.song_index, cursor.note_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twinkle() -> SongSet {
        SongSet::new(vec![
            Song::new("Twinkle", vec![60, 60, 67, 67]).unwrap(),
            Song::new("Low", vec![40, 41]).unwrap(),
        ])
        .unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_sequence_wraps_with_zero_gate() {
        let state = SequencerState::new(twinkle(), 0.0);
        let now = Instant::now();

        let played: Vec<(u8, usize)> = (0..5)
            .map(|_| {
                let result = state.try_advance(now).unwrap();
                assert_eq!(result.song_name, "Twinkle");
                assert_eq!(result.song_length, 4);
                (result.note, result.display_position)
            })
            .collect();

        assert_eq!(played, vec![(60, 1), (60, 2), (67, 3), (67, 4), (60, 1)]);
    }

    #[test]
    fn test_gate_rejects_early_trigger() {
        let state = SequencerState::new(twinkle(), 1.0);
        let t0 = Instant::now();

        let first = state.try_advance(t0).unwrap();
        assert_eq!((first.note, first.display_position), (60, 1));

        assert_eq!(state.try_advance(t0 + ms(500)), None);
        assert_eq!(state.position(), (0, 1));

        let second = state.try_advance(t0 + ms(1000)).unwrap();
        assert_eq!((second.note, second.display_position), (60, 2));
    }

    #[test]
    fn test_rejected_trigger_does_not_extend_gate() {
        let state = SequencerState::new(twinkle(), 1.0);
        let t0 = Instant::now();

        assert!(state.try_advance(t0).is_some());
        assert!(state.try_advance(t0 + ms(900)).is_none());
        // Measured from the last accepted trigger, not the rejected one
        assert!(state.try_advance(t0 + ms(1000)).is_some());
    }

    #[test]
    fn test_negative_gate_clamps_to_zero() {
        let state = SequencerState::new(twinkle(), -3.0);
        assert_eq!(state.gate(), Duration::ZERO);
        let now = Instant::now();
        assert!(state.try_advance(now).is_some());
        assert!(state.try_advance(now).is_some());

        assert_eq!(SequencerState::new(twinkle(), f64::NAN).gate(), Duration::ZERO);
    }

    #[test]
    fn test_callback_runs_only_for_accepted_triggers() {
        let state = SequencerState::new(twinkle(), 1.0);
        let t0 = Instant::now();
        let mut seen = Vec::new();

        state.try_advance_with(t0, |result| seen.push(result.note));
        state.try_advance_with(t0 + ms(200), |result| seen.push(result.note));
        state.try_advance_with(t0 + ms(1000), |result| seen.push(result.note));

        assert_eq!(seen, vec![60, 60]);
        assert_eq!(state.position(), (0, 2));
    }

    #[test]
    fn test_display_format() {
        let state = SequencerState::new(twinkle(), 0.0);
        let result = state.try_advance(Instant::now()).unwrap();
        assert_eq!(result.to_string(), "song=Twinkle note=60 index=1/4");
    }

    #[test]
    fn test_restart_keeps_gate_timer() {
        let state = SequencerState::new(twinkle(), 1.0);
        let t0 = Instant::now();
        state.try_advance(t0).unwrap();
        state.try_advance(t0 + ms(1000)).unwrap();
        assert_eq!(state.position(), (0, 2));

        state.restart();
        assert_eq!(state.position(), (0, 0));
        assert!(state.try_advance(t0 + ms(1500)).is_none());

        let result = state.try_advance(t0 + ms(2000)).unwrap();
        assert_eq!((result.note, result.display_position), (60, 1));
    }

    #[test]
    fn test_select_song() {
        let state = SequencerState::new(twinkle(), 0.0);
        let now = Instant::now();
        state.try_advance(now).unwrap();

        state.select_song(1).unwrap();
        assert_eq!(state.current_song().name(), "Low");

        let result = state.try_advance(now).unwrap();
        assert_eq!(result.note, 40);
        assert_eq!(result.song_name, "Low");
        assert_eq!(result.display_position, 1);
        assert_eq!(state.try_advance(now).unwrap().display_position, 2);

        assert!(matches!(
            state.select_song(2),
            Err(SongError::UnknownSong(_))
        ));
        assert_eq!(state.position(), (1, 0));
    }

    #[test]
    fn test_single_note_song_always_shows_full_length() {
        let songs = SongSet::new(vec![Song::new("Drone", vec![50]).unwrap()]).unwrap();
        let state = SequencerState::new(songs, 0.0);
        for _ in 0..3 {
            let result = state.try_advance(Instant::now()).unwrap();
            assert_eq!((result.note, result.display_position, result.song_length), (50, 1, 1));
        }
    }
}
