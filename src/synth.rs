//! Sine tone rendering for a single MIDI note.

use std::f32::consts::PI;

pub const SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_NOTE_SECONDS: f32 = 0.55;

const ATTACK_SECONDS: f32 = 0.015;
const RELEASE_SECONDS: f32 = 0.2;
const AMPLITUDE: f32 = 0.3;

pub fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

// Evenly spaced ramp from `from` to `to` over `steps` points, both ends included
fn ramp(index: usize, steps: usize, from: f32, to: f32) -> f32 {
    if steps <= 1 {
        return from;
    }
    from + (to - from) * index as f32 / (steps - 1) as f32
}

/// Render `seconds` of a sine at the note's pitch with a short linear attack
/// and a linear release that reaches silence on the last sample.
pub fn render_note(note: u8, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let frequency = midi_to_hz(note);
    let len = (sample_rate as f32 * seconds.max(0.0)) as usize;
    let attack = ((ATTACK_SECONDS * sample_rate as f32) as usize).max(1);
    let release = ((RELEASE_SECONDS * sample_rate as f32) as usize)
        .max(1)
        .min(len);
    let release_start = len - release;

    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let mut envelope = 1.0;
            if i < attack {
                envelope = ramp(i, attack, 0.0, 1.0);
            }
            if i >= release_start {
                envelope *= ramp(i - release_start, release, 1.0, 0.0);
            }
            (2.0 * PI * frequency * t).sin() * envelope * AMPLITUDE
        })
        .collect()
}
