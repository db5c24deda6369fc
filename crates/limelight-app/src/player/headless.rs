//! Headless player: executes nothing, logs everything.
//!
//! Used for `--headless` runs (control core without a video output, e.g. on a
//! development machine) and for asserting command sequences in tests.

use std::sync::{Arc, Mutex};

use super::{Player, PlayerError};
use crate::dmx::frame::EffectParams;
use crate::library::MediaSource;

/// Cloneable handle to the commands a [`HeadlessPlayer`] has received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_of(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn push(&self, command: String) {
        self.0.lock().unwrap().push(command);
    }
}

pub struct HeadlessPlayer {
    log: Option<CommandLog>,
}

impl HeadlessPlayer {
    /// Headless player for live `--headless` runs: commands go to the log
    /// output only.
    pub fn new() -> Self {
        Self { log: None }
    }

    /// Headless player that records every command, with a handle to inspect
    /// them afterwards.
    pub fn recording() -> (Self, CommandLog) {
        let log = CommandLog::default();
        (Self { log: Some(log.clone()) }, log)
    }

    fn record(&mut self, command: String) -> Result<(), PlayerError> {
        log::debug!("player: {command}");
        if let Some(ref log) = self.log {
            log.push(command);
        }
        Ok(())
    }
}

impl Default for HeadlessPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for HeadlessPlayer {
    fn load(&mut self, source: &MediaSource) -> Result<(), PlayerError> {
        self.record(format!("load {source}"))
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.record("play".into())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.record("pause".into())
    }

    fn resume(&mut self) -> Result<(), PlayerError> {
        self.record("resume".into())
    }

    fn set_loop(&mut self, enabled: bool) -> Result<(), PlayerError> {
        self.record(format!("set_loop {enabled}"))
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.record("stop".into())
    }

    fn set_volume(&mut self, dmx_value: u8) -> Result<(), PlayerError> {
        self.record(format!("set_volume {dmx_value}"))
    }

    fn set_brightness(&mut self, dmx_value: u8) -> Result<(), PlayerError> {
        self.record(format!("set_brightness {dmx_value}"))
    }

    fn set_effects(&mut self, effects: &EffectParams) -> Result<(), PlayerError> {
        self.record(format!(
            "set_effects c={} s={} g={} speed={} rot={} zoom={} pan={},{}",
            effects.contrast,
            effects.saturation,
            effects.gamma,
            effects.speed,
            effects.rotation,
            effects.zoom,
            effects.pan_x,
            effects.pan_y,
        ))
    }

    fn show_message(&mut self, text: &str, _duration_secs: f32) -> Result<(), PlayerError> {
        self.record(format!("osd {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn records_commands_in_order() {
        let (mut player, log) = HeadlessPlayer::recording();
        player
            .load(&MediaSource::File(PathBuf::from("/media/a/clip.mp4")))
            .unwrap();
        player.play().unwrap();
        player.set_loop(true).unwrap();
        assert_eq!(
            log.commands(),
            vec!["load /media/a/clip.mp4", "play", "set_loop true"]
        );
    }

    #[test]
    fn count_of_matches_prefix() {
        let (mut player, log) = HeadlessPlayer::recording();
        player.set_volume(10).unwrap();
        player.set_volume(20).unwrap();
        player.play().unwrap();
        assert_eq!(log.count_of("set_volume"), 2);
        assert_eq!(log.count_of("load"), 0);
    }

    #[test]
    fn non_recording_player_is_silent() {
        let mut player = HeadlessPlayer::new();
        assert!(player.play().is_ok());
        assert!(player.stop().is_ok());
    }
}
