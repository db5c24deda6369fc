//! Server configuration.
//!
//! JSON on disk, all fields optional with sane defaults so a partial or
//! missing file never stops the server from coming up.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What to do with playback when the DMX signal disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Keep the last state.
    Hold,
    /// Stop playback, output goes black.
    Blackout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Art-Net port-address (universe) to listen on.
    #[serde(default = "default_universe")]
    pub universe: u16,
    /// First DMX channel of our 13-channel block, 1-based.
    #[serde(default = "default_address")]
    pub address: u16,
    /// UDP port for Art-Net; 6454 unless a non-standard rig requires otherwise.
    #[serde(default = "default_artnet_port")]
    pub artnet_port: u16,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_true")]
    pub web_enabled: bool,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_fail_mode")]
    pub fail_mode: FailMode,
    /// Show an on-screen message while the DMX signal is lost.
    #[serde(default = "default_true")]
    pub fail_osd: bool,
    /// mpv --hwdec value; "v4l2m2m" on a Pi, "auto" elsewhere.
    #[serde(default = "default_hwdec")]
    pub hwdec: String,
}

fn default_version() -> u32 { 1 }
fn default_universe() -> u16 { 1 }
fn default_address() -> u16 { 1 }
fn default_artnet_port() -> u16 { 6454 }
fn default_media_root() -> PathBuf { PathBuf::from("/home/pi/media") }
fn default_true() -> bool { true }
fn default_web_port() -> u16 { 8080 }
fn default_fail_mode() -> FailMode { FailMode::Hold }
fn default_hwdec() -> String { "auto".into() }

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            universe: 1,
            address: 1,
            artnet_port: 6454,
            media_root: default_media_root(),
            web_enabled: true,
            web_port: 8080,
            fail_mode: FailMode::Hold,
            fail_osd: true,
            hwdec: default_hwdec(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("limelight").join("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        };
        config.normalized()
    }

    /// Clamp fields to their valid ranges. The channel block must fit inside
    /// the 512-channel universe, so the start address tops out at 500.
    pub fn normalized(mut self) -> Self {
        self.universe = self.universe.min(32767);
        self.address = self.address.clamp(1, 500);
        self
    }

    /// Human-readable "universe.address" label, as printed by consoles.
    pub fn dmx_label(&self) -> String {
        format!("{}.{}", self.universe, self.address)
    }
}
