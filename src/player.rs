//! Audio output for triggered notes.
//!
//! `Player::play` never blocks the caller: each note is handed to its own
//! detached thread, and a failed note only produces a log line.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use log::{debug, info, warn};
use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;

use crate::synth::render_note;

const NOTE_VELOCITY: u8 = 100;
// Extra time a synth stream stays open so the device drains its buffer
const STREAM_TAIL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),
    #[error(transparent)]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error(transparent)]
    MidiInit(#[from] midir::InitError),
    #[error("no MIDI output port {0}")]
    MissingMidiPort(usize),
    #[error("failed to connect to MIDI port: {0}")]
    MidiConnect(String),
    #[error(transparent)]
    MidiSend(#[from] midir::SendError),
}

/// Anything that can sound a note without making the caller wait.
pub trait Player: Send + Sync {
    fn play(&self, note: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PlayerKind {
    /// Built-in sine synth on the default audio device
    #[default]
    Synth,
    /// Note on/off messages to a MIDI output port
    Midi,
    /// No sound, status lines only
    Silent,
}

/// Create the player selected on the command line.
pub fn build_player(
    kind: PlayerKind,
    note_length: Duration,
    midi_port: usize,
) -> Result<Arc<dyn Player>, PlaybackError> {
    Ok(match kind {
        PlayerKind::Synth => Arc::new(SynthPlayer::new(note_length)),
        PlayerKind::Midi => Arc::new(MidiOutPlayer::connect(midi_port, note_length)?),
        PlayerKind::Silent => Arc::new(SilentPlayer),
    })
}

/// Run `work` on its own unjoined thread; the caller never waits for it.
pub(crate) fn spawn_detached<F>(name: String, work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = thread::Builder::new().name(name).spawn(work) {
        warn!("failed to spawn playback thread: {}", e);
    }
}

/// Renders a sine tone per note and plays it on the default cpal device.
#[derive(Debug, Clone)]
pub struct SynthPlayer {
    note_length: Duration,
}

impl SynthPlayer {
    pub fn new(note_length: Duration) -> Self {
        SynthPlayer { note_length }
    }
}

impl Player for SynthPlayer {
    fn play(&self, note: u8) {
        let note_length = self.note_length;
        spawn_detached(format!("synth-note-{}", note), move || {
            if let Err(e) = play_synth_note(note, note_length) {
                warn!("failed to play note {}: {}", note, e);
            }
        });
    }
}

fn play_synth_note(note: u8, note_length: Duration) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let config = device.default_output_config()?;
    let sample_format = config.sample_format();
    let config = cpal::StreamConfig::from(config);

    let samples = render_note(note, config.sample_rate.0, note_length.as_secs_f32());
    let stream = match sample_format {
        SampleFormat::F32 => create_stream::<f32>(&device, &config, samples),
        SampleFormat::I16 => create_stream::<i16>(&device, &config, samples),
        SampleFormat::U16 => create_stream::<u16>(&device, &config, samples),
        other => return Err(PlaybackError::UnsupportedFormat(other)),
    }?;

    stream.play()?;
    thread::sleep(note_length + STREAM_TAIL);
    Ok(())
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Vec<f32>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut position = 0usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let value = T::from_sample(samples.get(position).copied().unwrap_or(0.0));
                position += 1;
                for sample in frame.iter_mut() {
                    *sample = value;
                }
            }
        },
        |err| warn!("an error occurred on the audio stream: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Sends each note to a MIDI output port, releasing it after the note length.
pub struct MidiOutPlayer {
    conn: Arc<Mutex<MidiOutputConnection>>,
    note_length: Duration,
}

impl MidiOutPlayer {
    pub fn connect(port_index: usize, note_length: Duration) -> Result<Self, PlaybackError> {
        let midi_out = MidiOutput::new("keysinger")?;
        let ports = midi_out.ports();

        if ports.is_empty() {
            warn!("no MIDI output ports found");
        }
        for (i, port) in ports.iter().enumerate() {
            match midi_out.port_name(port) {
                Ok(name) => info!("MIDI port {}: {}", i, name),
                Err(_) => info!("MIDI port {}: <Unknown>", i),
            }
        }

        let port = ports
            .get(port_index)
            .ok_or(PlaybackError::MissingMidiPort(port_index))?;
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());
        let conn = midi_out
            .connect(port, "keysinger")
            .map_err(|e| PlaybackError::MidiConnect(e.to_string()))?;
        info!("connected to MIDI port: {}", port_name);

        Ok(MidiOutPlayer {
            conn: Arc::new(Mutex::new(conn)),
            note_length,
        })
    }
}

fn send(conn: &Mutex<MidiOutputConnection>, message: &[u8]) -> Result<(), PlaybackError> {
    let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
    conn.send(message)?;
    Ok(())
}

impl Player for MidiOutPlayer {
    fn play(&self, note: u8) {
        let key = note & 0x7F;
        if let Err(e) = send(&self.conn, &[0x90, key, NOTE_VELOCITY]) {
            warn!("failed to send note on {}: {}", key, e);
            return;
        }

        let conn = Arc::clone(&self.conn);
        let note_length = self.note_length;
        spawn_detached(format!("midi-note-{}", key), move || {
            thread::sleep(note_length);
            if let Err(e) = send(&conn, &[0x80, key, 0]) {
                warn!("failed to send note off {}: {}", key, e);
            }
        });
    }
}

impl Drop for MidiOutPlayer {
    fn drop(&mut self) {
        // All notes off, on every channel
        for channel in 0..16u8 {
            if let Err(e) = send(&self.conn, &[0xB0 | channel, 123, 0]) {
                debug!("failed to send all notes off on channel {}: {}", channel, e);
            }
        }
    }
}

/// Plays nothing; useful without an audio device.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl Player for SilentPlayer {
    fn play(&self, note: u8) {
        debug!("silent player: note {}", note);
    }
}
