//! Status snapshot exposed to the web/status collaborator.
//!
//! The control loop publishes a fresh snapshot after every processed frame;
//! readers only ever see the serialized copy (copy-on-read), never the live
//! playback state.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::control::PlaybackPhase;
use crate::dmx::frame::{EffectParams, Playmode};

/// Currently resolved playback target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub folder_index: u8,
    pub file_index: u8,
    pub source: String,
}

/// Read-only view of the playback state, refreshed every processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: PlaybackPhase,
    pub playmode: Playmode,
    pub target: Option<TargetInfo>,
    pub volume: u8,
    pub volume_percent: u8,
    pub brightness: u8,
    pub brightness_percent: u8,
    pub effects: EffectParams,
    /// Whether DMX frames are currently arriving.
    pub dmx_signal: bool,
    pub last_error: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackPhase::Stopped,
            playmode: Playmode::PlayOnce,
            target: None,
            volume: 0,
            volume_percent: 0,
            brightness: 0,
            brightness_percent: 0,
            effects: EffectParams::default(),
            dmx_signal: false,
            last_error: None,
        }
    }
}

pub fn percent(dmx_value: u8) -> u8 {
    (f64::from(dmx_value) * 100.0 / 255.0).round() as u8
}

/// Cloneable handle holding the latest snapshot as a JSON string.
#[derive(Clone)]
pub struct StatusHandle {
    latest: Arc<Mutex<String>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        let initial = serde_json::to_string(&StatusSnapshot::default())
            .expect("default snapshot serializes");
        Self {
            latest: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn publish(&self, snapshot: &StatusSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => *self.latest.lock().unwrap() = json,
            Err(e) => log::error!("Failed to serialize status snapshot: {e}"),
        }
    }

    pub fn latest_json(&self) -> String {
        self.latest.lock().unwrap().clone()
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}
