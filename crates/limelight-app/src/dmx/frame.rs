//! Channel frame decoding.
//!
//! A frame is the 13 consecutive DMX channel values driving the server:
//!
//! | Ch | Field      | Mapping                                        |
//! |----|------------|------------------------------------------------|
//! | 1  | file       | 0 = stop, 1-255 = file index within folder     |
//! | 2  | folder     | 0-255 = folder index in media root             |
//! | 3  | playmode   | 0-84 play once, 85-169 pause, 170-255 loop     |
//! | 4  | volume     | 0 = mute, 255 = full                           |
//! | 5  | brightness | 0 = black, 255 = normal                        |
//! | 6  | contrast   | 0 = -100, 128 = 0, 255 = +100                  |
//! | 7  | saturation | 0 = -100, 128 = 0, 255 = +100                  |
//! | 8  | gamma      | 0 = -100, 128 = 0, 255 = +100                  |
//! | 9  | speed      | 0 = 0.25x, 128 = 1.0x, 255 = 4.0x              |
//! | 10 | rotation   | quartiles: 0deg, 90deg, 180deg, 270deg         |
//! | 11 | zoom       | 0 = -2.0, 128 = 0, 255 = +2.0                  |
//! | 12 | pan X      | 0 = -1.0, 128 = 0, 255 = +1.0                  |
//! | 13 | pan Y      | 0 = -1.0, 128 = 0, 255 = +1.0                  |
//!
//! Decoding is total and side-effect-free; the only failure is a frame that
//! is not exactly 13 values.

use serde::Serialize;

/// Number of DMX channels the server consumes.
pub const NUM_CHANNELS: usize = 13;

// Channel offsets within a frame.
pub const CH_FILE: usize = 0;
pub const CH_FOLDER: usize = 1;
pub const CH_PLAYMODE: usize = 2;
pub const CH_VOLUME: usize = 3;
pub const CH_BRIGHTNESS: usize = 4;
pub const CH_CONTRAST: usize = 5;
pub const CH_SATURATION: usize = 6;
pub const CH_GAMMA: usize = 7;
pub const CH_SPEED: usize = 8;
pub const CH_ROTATION: usize = 9;
pub const CH_ZOOM: usize = 10;
pub const CH_PAN_X: usize = 11;
pub const CH_PAN_Y: usize = 12;

// Playmode band thresholds (3-state).
const PAUSE_THRESHOLD: u8 = 85;
const LOOP_THRESHOLD: u8 = 170;

// Rotation band thresholds (4-state).
const ROTATION_90: u8 = 64;
const ROTATION_180: u8 = 128;
const ROTATION_270: u8 = 192;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The input was not exactly [`NUM_CHANNELS`] values.
    #[error("malformed frame: expected {NUM_CHANNELS} channel values, got {0}")]
    Malformed(usize),
}

/// One raw lighting-protocol update: 13 ordered byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrame([u8; NUM_CHANNELS]);

impl ChannelFrame {
    pub fn new(values: [u8; NUM_CHANNELS]) -> Self {
        Self(values)
    }

    /// Build a frame from a raw channel slice, e.g. a window into universe data.
    pub fn from_slice(values: &[u8]) -> Result<Self, FrameError> {
        let arr: [u8; NUM_CHANNELS] = values
            .try_into()
            .map_err(|_| FrameError::Malformed(values.len()))?;
        Ok(Self(arr))
    }

    pub fn get(&self, offset: usize) -> u8 {
        self.0[offset]
    }

    /// Decode every channel into its semantic value.
    pub fn decode(&self) -> DecodedFrame {
        DecodedFrame {
            file_index: self.0[CH_FILE],
            folder_index: self.0[CH_FOLDER],
            playmode: Playmode::from_byte(self.0[CH_PLAYMODE]),
            volume: self.0[CH_VOLUME],
            brightness: self.0[CH_BRIGHTNESS],
            effects: EffectParams {
                contrast: signed_percent(self.0[CH_CONTRAST]),
                saturation: signed_percent(self.0[CH_SATURATION]),
                gamma: signed_percent(self.0[CH_GAMMA]),
                speed: speed(self.0[CH_SPEED]),
                rotation: rotation(self.0[CH_ROTATION]),
                zoom: zoom(self.0[CH_ZOOM]),
                pan_x: pan(self.0[CH_PAN_X]),
                pan_y: pan(self.0[CH_PAN_Y]),
            },
        }
    }
}

/// Discrete play mode selected by the playmode channel band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Playmode {
    #[serde(rename = "play")]
    PlayOnce,
    #[serde(rename = "pause")]
    Paused,
    #[serde(rename = "loop")]
    Looping,
}

impl Playmode {
    pub fn from_byte(value: u8) -> Self {
        if value >= LOOP_THRESHOLD {
            Self::Looping
        } else if value >= PAUSE_THRESHOLD {
            Self::Paused
        } else {
            Self::PlayOnce
        }
    }
}

/// Continuous playback-effect parameters, decoded from the effect channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectParams {
    /// -100..100, 0 = normal.
    pub contrast: i32,
    /// -100..100, 0 = normal.
    pub saturation: i32,
    /// -100..100, 0 = normal.
    pub gamma: i32,
    /// 0.25..4.0, 1.0 = normal.
    pub speed: f64,
    /// 0, 90, 180 or 270 degrees.
    pub rotation: u16,
    /// -2.0..2.0, 0 = no zoom.
    pub zoom: f64,
    /// -1.0..1.0, 0 = centered.
    pub pan_x: f64,
    /// -1.0..1.0, 0 = centered.
    pub pan_y: f64,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            contrast: 0,
            saturation: 0,
            gamma: 0,
            speed: 1.0,
            rotation: 0,
            zoom: 0.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

/// A fully decoded frame: the semantic record the control loop works with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    pub file_index: u8,
    pub folder_index: u8,
    pub playmode: Playmode,
    pub volume: u8,
    pub brightness: u8,
    pub effects: EffectParams,
}

/// Map a byte to -100..100 with 128 as the neutral midpoint.
fn signed_percent(value: u8) -> i32 {
    let mapped = (f64::from(value) - 128.0) / 127.0 * 100.0;
    (mapped.round() as i32).clamp(-100, 100)
}

/// Map a byte to playback speed: 0 -> 0.25x, 128 -> 1.0x, 255 -> 4.0x.
fn speed(value: u8) -> f64 {
    if value < 128 {
        0.25 + f64::from(value) * 0.75 / 128.0
    } else {
        1.0 + f64::from(value - 128) * 3.0 / 127.0
    }
}

/// Map a byte to a rotation angle by quartile.
fn rotation(value: u8) -> u16 {
    if value >= ROTATION_270 {
        270
    } else if value >= ROTATION_180 {
        180
    } else if value >= ROTATION_90 {
        90
    } else {
        0
    }
}

/// Map a byte to -2.0..2.0 with 128 as zero.
fn zoom(value: u8) -> f64 {
    ((f64::from(value) - 128.0) / 127.0 * 2.0).clamp(-2.0, 2.0)
}

/// Map a byte to -1.0..1.0 with 128 as zero.
fn pan(value: u8) -> f64 {
    ((f64::from(value) - 128.0) / 127.0).clamp(-1.0, 1.0)
}
