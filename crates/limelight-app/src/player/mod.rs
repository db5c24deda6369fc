//! Player command interface.
//!
//! The control core drives playback through this trait and never talks to a
//! decode/render engine directly. [`mpv::MpvPlayer`] is the production
//! implementation (mpv over its JSON IPC socket); [`headless::HeadlessPlayer`]
//! logs commands instead of executing them, for `--headless` runs and tests.

pub mod headless;
#[cfg(unix)]
pub mod mpv;

use crate::dmx::frame::EffectParams;
use crate::library::MediaSource;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("player IPC error: {0}")]
    Ipc(#[from] std::io::Error),

    #[error("player rejected '{command}': {reason}")]
    Rejected { command: String, reason: String },
}

/// Commands the playback engine must support.
///
/// Commands may block (file open, stream connect); callers must not assume
/// they return instantly.
pub trait Player: Send {
    /// Load a local file or remote stream, replacing whatever is loaded.
    fn load(&mut self, source: &MediaSource) -> Result<(), PlayerError>;
    /// Start (or restart) playback of the loaded media.
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn resume(&mut self) -> Result<(), PlayerError>;
    /// Enable or disable the engine's native seamless loop. While enabled the
    /// media repeats indefinitely without a stop/reopen cycle.
    fn set_loop(&mut self, enabled: bool) -> Result<(), PlayerError>;
    /// Stop playback; the engine stays alive and idle.
    fn stop(&mut self) -> Result<(), PlayerError>;
    /// Volume from the raw channel value (0 = mute, 255 = full).
    fn set_volume(&mut self, dmx_value: u8) -> Result<(), PlayerError>;
    /// Brightness from the raw channel value (0 = black, 255 = normal).
    fn set_brightness(&mut self, dmx_value: u8) -> Result<(), PlayerError>;
    fn set_effects(&mut self, effects: &EffectParams) -> Result<(), PlayerError>;

    /// Briefly show a message on the output (signal-loss OSD). Optional.
    fn show_message(&mut self, _text: &str, _duration_secs: f32) -> Result<(), PlayerError> {
        Ok(())
    }

    /// Terminate the engine cleanly. Called once on server shutdown.
    fn shutdown(&mut self) {}
}
