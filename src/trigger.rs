//! Glue between key events and the sequencer.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::{trace, warn};

use crate::player::Player;
use crate::sequencer::{SequencerState, TriggerResult};

/// Turns key presses into notes: advances the shared sequencer, hands the
/// note to the player and prints one status line per accepted press.
///
/// The player and the status writer are called while the sequencer is
/// locked, so both must return promptly.
pub struct TriggerHandler {
    state: Arc<SequencerState>,
    player: Arc<dyn Player>,
    status: Mutex<Box<dyn Write + Send>>,
}

impl TriggerHandler {
    pub fn new(state: Arc<SequencerState>, player: Arc<dyn Player>) -> Self {
        Self::with_status_writer(state, player, Box::new(io::stdout()))
    }

    pub fn with_status_writer(
        state: Arc<SequencerState>,
        player: Arc<dyn Player>,
        status: Box<dyn Write + Send>,
    ) -> Self {
        TriggerHandler {
            state,
            player,
            status: Mutex::new(status),
        }
    }

    pub fn state(&self) -> &Arc<SequencerState> {
        &self.state
    }

    /// Called once per key press, whatever the key.
    pub fn on_key_event(&self) -> Option<TriggerResult> {
        self.on_key_event_at(Instant::now())
    }

    pub fn on_key_event_at(&self, now: Instant) -> Option<TriggerResult> {
        // Dispatch under the cursor lock so the player hears notes in the
        // order they were accepted; play() only hands the note off.
        let accepted = self.state.try_advance_with(now, |result| {
            self.player.play(result.note);
            self.report(result);
        });
        if accepted.is_none() {
            trace!("key press inside gate, ignored");
        }
        accepted
    }

    fn report(&self, result: &TriggerResult) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(status, "{}", result).and_then(|_| status.flush()) {
            warn!("failed to write status line: {}", e);
        }
    }
}
