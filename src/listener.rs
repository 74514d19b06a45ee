//! Key press sources.
//!
//! The default source is a system-wide hook through rdev (the `global`
//! feature, on by default), which sees key presses from every application.
//! `TerminalKeys` reads key presses from the focused terminal with crossterm
//! and is used with `--terminal` or in builds without the hook.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, warn};
use thiserror::Error;

use crate::trigger::TriggerHandler;
use crate::{set_shutdown_flag, should_shutdown};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("terminal input failed: {0}")]
    Io(#[from] io::Error),
    #[error("global key hook failed: {0} (try --terminal)")]
    Hook(String),
    #[error("global key capture needs a build with the `global` feature")]
    GlobalUnavailable,
}

/// Something that calls the handler once per key press until shutdown.
pub trait KeySource {
    /// Writer for status lines while this source is active.
    fn status_writer(&self) -> Box<dyn Write + Send> {
        Box::new(io::stdout())
    }

    fn listen(self: Box<Self>, handler: Arc<TriggerHandler>) -> Result<(), ListenError>;
}

/// Key presses from the terminal this process runs in.
#[derive(Debug, Default)]
pub struct TerminalKeys;

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore terminal mode: {}", e);
        }
    }
}

impl KeySource for TerminalKeys {
    fn status_writer(&self) -> Box<dyn Write + Send> {
        Box::new(RawLines(io::stdout()))
    }

    fn listen(self: Box<Self>, handler: Arc<TriggerHandler>) -> Result<(), ListenError> {
        enable_raw_mode()?;
        let _guard = RawModeGuard;
        debug!("terminal key listener started");

        while !should_shutdown() {
            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            // Some platforms also report releases and repeats
            if key.kind != KeyEventKind::Press {
                continue;
            }
            // Raw mode swallows SIGINT, so Ctrl+C arrives as a key
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                set_shutdown_flag();
                break;
            }
            handler.on_key_event();
        }

        debug!("terminal key listener stopped");
        Ok(())
    }
}

/// Writer that ends lines with `\r\n`, since raw mode disables the translation.
pub struct RawLines<W>(pub W);

impl<W: Write> Write for RawLines<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// System-wide key presses.
#[cfg(feature = "global")]
#[derive(Debug, Default)]
pub struct GlobalKeys;

#[cfg(feature = "global")]
impl KeySource for GlobalKeys {
    fn listen(self: Box<Self>, handler: Arc<TriggerHandler>) -> Result<(), ListenError> {
        debug!("global key hook started");
        // Blocks for the life of the process; Ctrl+C exits from the signal handler
        rdev::listen(move |event: rdev::Event| {
            if let rdev::EventType::KeyPress(_) = event.event_type {
                handler.on_key_event();
            }
        })
        .map_err(|e| ListenError::Hook(format!("{:?}", e)))
    }
}

/// The system-wide source, if this build has one.
pub fn global_key_source() -> Result<Box<dyn KeySource>, ListenError> {
    #[cfg(feature = "global")]
    {
        Ok(Box::new(GlobalKeys))
    }
    #[cfg(not(feature = "global"))]
    {
        Err(ListenError::GlobalUnavailable)
    }
}
