//! Playback control core: change detection, the playback state machine and
//! the control loop.
//!
//! The receiver thread hands raw frames over a bounded channel; the loop
//! drains it, coalescing to the most recent frame so a slow player command
//! never backs up ingestion (superseded frames are dropped, last value wins).
//! Decoded values are compared field-wise against the last committed record —
//! never raw bytes — so a console wiggling inside a playmode band does not
//! re-trigger anything, and identical frames produce no commands at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;

use crate::config::{Config, FailMode};
use crate::dmx::DmxEvent;
use crate::dmx::frame::{ChannelFrame, DecodedFrame, Playmode};
use crate::library::{MediaLibrary, MediaSource};
use crate::player::Player;
use crate::status::{StatusHandle, StatusSnapshot, TargetInfo, percent};

/// How often the loop wakes up without traffic to run the signal watchdog.
const TICK: Duration = Duration::from_millis(250);
/// No frame for this long counts as signal loss.
const SIGNAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Re-show the signal-loss OSD at this interval while the signal is gone.
const OSD_INTERVAL: Duration = Duration::from_secs(3);

/// Current playback mode of the state machine. `Stopped` is the idle state,
/// re-entered whenever the file channel drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Stopped,
    Playing,
    Paused,
    Looping,
}

/// Owns the playback state and issues player commands from decoded frames.
pub struct Controller {
    player: Box<dyn Player>,
    library: MediaLibrary,
    /// Last committed semantic state; the reference for change detection.
    committed: Option<DecodedFrame>,
    phase: PlaybackPhase,
    target: Option<(u8, u8)>,
    source: Option<MediaSource>,
    /// Target whose resolution/load already failed; retried only when the
    /// console asks for something distinct.
    failed_target: Option<(u8, u8)>,
    last_error: Option<String>,
}

impl Controller {
    pub fn new(player: Box<dyn Player>, library: MediaLibrary) -> Self {
        Self {
            player,
            library,
            committed: None,
            phase: PlaybackPhase::Stopped,
            target: None,
            source: None,
            failed_target: None,
            last_error: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn target(&self) -> Option<(u8, u8)> {
        self.target
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    /// Swap the media root (file-management collaborator changed it).
    pub fn set_media_root(&mut self, root: std::path::PathBuf) {
        log::info!("Media root changed to {}", root.display());
        self.library = MediaLibrary::new(root);
    }

    /// Apply one raw frame: decode, diff against the committed state,
    /// dispatch whatever actually changed. Never fails; every error is
    /// recorded and playback carries on.
    pub fn apply_frame(&mut self, frame: &ChannelFrame) {
        let decoded = frame.decode();
        let committed = self.committed;

        let target_changed = committed.is_none_or(|c| {
            c.file_index != decoded.file_index || c.folder_index != decoded.folder_index
        });
        let playmode_changed = committed.is_none_or(|c| c.playmode != decoded.playmode);

        if decoded.file_index == 0 {
            if target_changed && self.phase != PlaybackPhase::Stopped {
                self.enter_stopped();
            }
        } else if target_changed
            || (self.phase == PlaybackPhase::Stopped
                && self.failed_target != Some((decoded.folder_index, decoded.file_index)))
        {
            // New selection, or idle with a selection pending (e.g. after a
            // blackout): (re)load.
            self.select_target(&decoded);
        } else if playmode_changed && self.phase != PlaybackPhase::Stopped {
            self.apply_playmode(decoded.playmode);
        }

        self.apply_continuous(&decoded, committed.as_ref());
        self.committed = Some(decoded);
    }

    /// Stop playback and clear the target (file channel went to zero).
    fn enter_stopped(&mut self) {
        if let Err(e) = self.player.stop() {
            self.record_error(&e);
        }
        log::info!("Playback stopped");
        self.phase = PlaybackPhase::Stopped;
        self.target = None;
        self.source = None;
        self.failed_target = None;
    }

    /// Resolve and start the selected target. On any failure the previous
    /// playback keeps running untouched; the failed selection is remembered
    /// so unchanged retransmits do not retry it.
    fn select_target(&mut self, decoded: &DecodedFrame) {
        let requested = (decoded.folder_index, decoded.file_index);
        let source = match self.library.resolve(requested.0, requested.1) {
            Ok(source) => source,
            Err(e) => {
                self.record_error(&e);
                self.failed_target = Some(requested);
                return;
            }
        };

        match self.start_playback(&source, decoded) {
            Ok(()) => {
                log::info!(
                    "Playing '{source}' (folder {}, file {}, {:?})",
                    requested.0,
                    requested.1,
                    decoded.playmode
                );
                self.target = Some(requested);
                self.source = Some(source);
                self.failed_target = None;
                self.phase = match decoded.playmode {
                    Playmode::Paused => PlaybackPhase::Paused,
                    Playmode::Looping => PlaybackPhase::Looping,
                    Playmode::PlayOnce => PlaybackPhase::Playing,
                };
            }
            Err(e) => {
                self.record_error(&e);
                self.failed_target = Some(requested);
                if self.target.is_none() {
                    // Nothing was loaded before; the machine is genuinely idle.
                    self.phase = PlaybackPhase::Stopped;
                }
            }
        }
    }

    /// Load + play, bring continuous parameters up to date on the fresh
    /// media, then apply the playmode as a persistent modifier.
    fn start_playback(
        &mut self,
        source: &MediaSource,
        decoded: &DecodedFrame,
    ) -> Result<(), crate::player::PlayerError> {
        self.player.load(source)?;
        self.player.play()?;
        self.player.set_volume(decoded.volume)?;
        self.player.set_brightness(decoded.brightness)?;
        self.player.set_effects(&decoded.effects)?;
        match decoded.playmode {
            Playmode::Paused => self.player.pause()?,
            Playmode::PlayOnce => self.player.set_loop(false)?,
            Playmode::Looping => self.player.set_loop(true)?,
        }
        Ok(())
    }

    /// Re-apply the playmode to the already-loaded media. Never reloads.
    fn apply_playmode(&mut self, playmode: Playmode) {
        let was_paused = self.phase == PlaybackPhase::Paused;
        let result = match playmode {
            Playmode::Paused => self.player.pause(),
            Playmode::PlayOnce => {
                let r = if was_paused { self.player.resume() } else { Ok(()) };
                r.and_then(|()| self.player.set_loop(false))
            }
            Playmode::Looping => {
                let r = if was_paused { self.player.resume() } else { Ok(()) };
                r.and_then(|()| self.player.set_loop(true))
            }
        };
        match result {
            Ok(()) => {
                self.phase = match playmode {
                    Playmode::Paused => PlaybackPhase::Paused,
                    Playmode::PlayOnce => PlaybackPhase::Playing,
                    Playmode::Looping => PlaybackPhase::Looping,
                };
                log::debug!("Playmode now {:?}", self.phase);
            }
            Err(e) => self.record_error(&e),
        }
    }

    /// Forward continuous fields whose decoded value differs from the
    /// committed one. Suppressed entirely while stopped; a later load brings
    /// the fresh media up to date from the then-current frame.
    fn apply_continuous(&mut self, decoded: &DecodedFrame, committed: Option<&DecodedFrame>) {
        if self.phase == PlaybackPhase::Stopped {
            return;
        }
        if committed.is_none_or(|c| c.volume != decoded.volume) {
            if let Err(e) = self.player.set_volume(decoded.volume) {
                self.record_error(&e);
            }
        }
        if committed.is_none_or(|c| c.brightness != decoded.brightness) {
            if let Err(e) = self.player.set_brightness(decoded.brightness) {
                self.record_error(&e);
            }
        }
        if committed.is_none_or(|c| c.effects != decoded.effects) {
            if let Err(e) = self.player.set_effects(&decoded.effects) {
                self.record_error(&e);
            }
        }
    }

    /// Fail-mode "blackout": stop output but keep the committed record, so a
    /// retransmitted selection reloads once the signal returns.
    pub fn blackout(&mut self) {
        if self.phase == PlaybackPhase::Stopped {
            return;
        }
        if let Err(e) = self.player.stop() {
            self.record_error(&e);
        }
        self.phase = PlaybackPhase::Stopped;
        self.target = None;
        self.source = None;
        self.failed_target = None;
    }

    pub fn show_message(&mut self, text: &str, duration_secs: f32) {
        if let Err(e) = self.player.show_message(text, duration_secs) {
            self.record_error(&e);
        }
    }

    fn record_error(&mut self, error: &dyn std::error::Error) {
        let text = error.to_string();
        log::warn!("{text}");
        self.last_error = Some(text);
    }

    /// Record an error raised outside the controller (e.g. a malformed
    /// frame); playback is untouched.
    pub fn report_error(&mut self, error: &dyn std::error::Error) {
        self.record_error(error);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Copy-on-read snapshot for the status collaborator.
    pub fn snapshot(&self, dmx_signal: bool) -> StatusSnapshot {
        let committed = self.committed.unwrap_or(DecodedFrame {
            file_index: 0,
            folder_index: 0,
            playmode: Playmode::PlayOnce,
            volume: 0,
            brightness: 0,
            effects: crate::dmx::frame::EffectParams::default(),
        });
        StatusSnapshot {
            state: self.phase,
            playmode: committed.playmode,
            target: self.target.map(|(folder_index, file_index)| TargetInfo {
                folder_index,
                file_index,
                source: self
                    .source
                    .as_ref()
                    .map(MediaSource::location)
                    .unwrap_or_default(),
            }),
            volume: committed.volume,
            volume_percent: percent(committed.volume),
            brightness: committed.brightness,
            brightness_percent: percent(committed.brightness),
            effects: committed.effects,
            dmx_signal,
            last_error: self.last_error.clone(),
        }
    }

    pub fn shutdown(&mut self) {
        self.player.shutdown();
    }
}

/// Run the control loop until `shutdown` is set or the frame source goes
/// away. Handles the DMX signal watchdog and publishes status snapshots.
pub fn run_loop(
    mut controller: Controller,
    events: &Receiver<DmxEvent>,
    shutdown: &Arc<AtomicBool>,
    status: &StatusHandle,
    config: &Arc<Mutex<Config>>,
) {
    let mut last_frame_at: Option<Instant> = None;
    let mut signal_lost = false;
    let mut last_osd_at: Option<Instant> = None;

    while !shutdown.load(Ordering::Relaxed) {
        match events.recv_timeout(TICK) {
            Ok(first) => {
                // Coalesce to the newest queued event; intermediate frames
                // superseded while a player command was in flight are dropped.
                let mut event = first;
                let mut dropped = 0usize;
                while let Ok(next) = events.try_recv() {
                    event = next;
                    dropped += 1;
                }
                if dropped > 0 {
                    log::trace!("Coalesced {dropped} superseded frames");
                }

                last_frame_at = Some(Instant::now());
                if signal_lost {
                    signal_lost = false;
                    last_osd_at = None;
                    log::info!("DMX signal restored");
                    if config.lock().unwrap().fail_osd {
                        controller.show_message("DMX Signal Restored", 2.0);
                    }
                }

                // Config swaps take effect at frame boundaries only.
                let media_root = config.lock().unwrap().media_root.clone();
                if controller.library().root() != media_root {
                    controller.set_media_root(media_root);
                }

                match event {
                    DmxEvent::Frame(frame) => controller.apply_frame(&frame),
                    DmxEvent::Malformed(e) => controller.report_error(&e),
                }
                status.publish(&controller.snapshot(true));
            }
            Err(RecvTimeoutError::Timeout) => {
                let Some(at) = last_frame_at else { continue };
                if at.elapsed() < SIGNAL_TIMEOUT {
                    continue;
                }
                let cfg = config.lock().unwrap().clone();
                if !signal_lost {
                    signal_lost = true;
                    log::warn!(
                        "DMX signal lost, applying fail mode {:?}",
                        cfg.fail_mode
                    );
                    if cfg.fail_mode == FailMode::Blackout {
                        controller.blackout();
                    }
                    status.publish(&controller.snapshot(false));
                }
                if cfg.fail_osd
                    && last_osd_at.is_none_or(|t| t.elapsed() >= OSD_INTERVAL)
                {
                    last_osd_at = Some(Instant::now());
                    controller.show_message("DMX Signal Lost", 3.0);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Frame source closed, control loop exiting");
                break;
            }
        }
    }

    controller.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerError;
    use crate::player::headless::{CommandLog, HeadlessPlayer};
    use std::fs;
    use tempfile::TempDir;

    fn media_tree() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("show")).unwrap();
        for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4"] {
            fs::write(dir.path().join("show").join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("streams")).unwrap();
        fs::write(
            dir.path().join("streams/cam.txt"),
            "rtsp://camera.local/live\n",
        )
        .unwrap();
        dir
    }

    fn controller(dir: &TempDir) -> (Controller, CommandLog) {
        let (player, log) = HeadlessPlayer::recording();
        let controller = Controller::new(Box::new(player), MediaLibrary::new(dir.path()));
        (controller, log)
    }

    fn frame(file: u8, folder: u8, playmode: u8) -> ChannelFrame {
        ChannelFrame::new([
            file, folder, playmode, 255, 255, 128, 128, 128, 128, 0, 128, 128, 128,
        ])
    }

    #[test]
    fn first_selection_loads_and_plays() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.target(), Some((0, 1)));
        let commands = log.commands();
        assert!(commands[0].starts_with("load ") && commands[0].ends_with("show/a.mp4"));
        assert_eq!(commands[1], "play");
        assert_eq!(log.count_of("load"), 1);
    }

    #[test]
    fn same_frame_twice_is_idempotent() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        let f = frame(5, 0, 0);
        c.apply_frame(&f);
        let after_first = log.commands().len();
        c.apply_frame(&f);
        assert_eq!(log.commands().len(), after_first, "second identical frame issued commands");
    }

    #[test]
    fn file_to_zero_stops_and_clears_target() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(3, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        c.apply_frame(&frame(0, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        assert_eq!(c.target(), None);
        assert_eq!(log.count_of("stop"), 1);
    }

    #[test]
    fn initial_zero_frame_issues_nothing() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(0, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        assert!(log.commands().is_empty());
    }

    #[test]
    fn playmode_change_does_not_reload() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(2, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);

        // Loop band: transition without reload.
        c.apply_frame(&frame(2, 0, 200));
        assert_eq!(c.phase(), PlaybackPhase::Looping);
        assert_eq!(log.count_of("load"), 1);
        assert_eq!(log.count_of("set_loop true"), 1);

        // Back to play-once band: same target, still no reload.
        c.apply_frame(&frame(2, 0, 50));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.target(), Some((0, 2)));
        assert_eq!(log.count_of("load"), 1);
    }

    #[test]
    fn values_within_one_band_fire_once() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(2, 0, 170));
        let loops_after_entry = log.count_of("set_loop true");
        for byte in [171, 200, 230, 255, 170] {
            c.apply_frame(&frame(2, 0, byte));
        }
        assert_eq!(log.count_of("set_loop true"), loops_after_entry);
        assert_eq!(c.phase(), PlaybackPhase::Looping);
    }

    #[test]
    fn looping_persists_without_reissue_or_cap() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 200));
        assert_eq!(c.phase(), PlaybackPhase::Looping);
        // The engine loops natively; nothing per-iteration ever reaches the
        // core. Simulate a long run of retransmitted frames.
        for _ in 0..10_000 {
            c.apply_frame(&frame(1, 0, 200));
        }
        assert_eq!(c.phase(), PlaybackPhase::Looping);
        assert_eq!(log.count_of("set_loop true"), 1);
        assert_eq!(log.count_of("stop"), 0);
        assert_eq!(log.count_of("load"), 1);
    }

    #[test]
    fn pause_and_resume_between_bands() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        c.apply_frame(&frame(1, 0, 100));
        assert_eq!(c.phase(), PlaybackPhase::Paused);
        assert_eq!(log.count_of("pause"), 1);
        c.apply_frame(&frame(1, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(log.count_of("resume"), 1);
        assert_eq!(log.count_of("load"), 1);
    }

    #[test]
    fn invalid_folder_keeps_current_playback() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        let before = log.commands().len();

        c.apply_frame(&frame(1, 7, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.target(), Some((0, 1)));
        assert_eq!(log.commands().len(), before, "failed resolution reached the player");
        assert!(c.last_error().unwrap().contains("folder index 7"));
    }

    #[test]
    fn invalid_file_keeps_current_playback() {
        let dir = media_tree();
        let (mut c, _log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        c.apply_frame(&frame(200, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.target(), Some((0, 1)));
    }

    #[test]
    fn failed_selection_not_retried_on_retransmit() {
        let dir = media_tree();
        let (mut c, _log) = controller(&dir);
        c.apply_frame(&frame(1, 7, 0));
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        c.last_error().expect("error recorded");

        // Retransmits of the same bad selection stay quiet; a distinct valid
        // one loads.
        c.apply_frame(&frame(1, 7, 0));
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        c.apply_frame(&frame(1, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn stream_reference_target() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        // Folder 1 = "streams", file 1 = cam.txt
        c.apply_frame(&frame(1, 1, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(log.commands()[0], "load rtsp://camera.local/live");
    }

    #[test]
    fn continuous_fields_forward_only_on_change() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        log.clear();

        let mut f = [1, 0, 0, 255, 255, 128, 128, 128, 128, 0, 128, 128, 128];
        f[3] = 100; // volume change only
        c.apply_frame(&ChannelFrame::new(f));
        assert_eq!(log.commands(), vec!["set_volume 100"]);

        // Unchanged retransmit: nothing.
        c.apply_frame(&ChannelFrame::new(f));
        assert_eq!(log.commands().len(), 1);

        f[6] = 200; // saturation
        c.apply_frame(&ChannelFrame::new(f));
        assert_eq!(log.count_of("set_effects"), 1);
    }

    #[test]
    fn continuous_fields_suppressed_while_stopped() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        let mut f = [0u8, 0, 0, 10, 10, 128, 128, 128, 128, 0, 128, 128, 128];
        c.apply_frame(&ChannelFrame::new(f));
        f[3] = 200;
        c.apply_frame(&ChannelFrame::new(f));
        assert!(log.commands().is_empty());

        // Loading afterwards applies the current values to the fresh media.
        f[0] = 1;
        c.apply_frame(&ChannelFrame::new(f));
        assert_eq!(log.count_of("set_volume 200"), 1);
    }

    #[test]
    fn blackout_then_retransmit_reloads() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(2, 0, 0));
        c.blackout();
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        assert_eq!(log.count_of("stop"), 1);

        // Signal comes back with the console still parked on the same values.
        c.apply_frame(&frame(2, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(log.count_of("load"), 2);
    }

    #[test]
    fn malformed_frame_reported_without_touching_playback() {
        let dir = media_tree();
        let (mut c, log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 0));
        let before = log.commands().len();
        c.report_error(&crate::dmx::frame::FrameError::Malformed(5));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(log.commands().len(), before);
        assert!(c.last_error().unwrap().contains("malformed frame"));
    }

    #[test]
    fn snapshot_reflects_committed_frame() {
        let dir = media_tree();
        let (mut c, _log) = controller(&dir);
        c.apply_frame(&frame(1, 0, 200));
        let snapshot = c.snapshot(true);
        assert_eq!(snapshot.state, PlaybackPhase::Looping);
        assert_eq!(snapshot.volume, 255);
        assert_eq!(snapshot.volume_percent, 100);
        assert!(snapshot.dmx_signal);
        let target = snapshot.target.unwrap();
        assert_eq!((target.folder_index, target.file_index), (0, 1));
        assert!(target.source.ends_with("show/a.mp4"));
    }

    // ---- Player failure handling ----

    /// Player whose load always fails; everything else succeeds.
    struct FailingLoadPlayer;

    impl Player for FailingLoadPlayer {
        fn load(&mut self, _source: &MediaSource) -> Result<(), PlayerError> {
            Err(PlayerError::Rejected {
                command: "loadfile".into(),
                reason: "no decoder".into(),
            })
        }
        fn play(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn pause(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn resume(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn set_loop(&mut self, _enabled: bool) -> Result<(), PlayerError> { Ok(()) }
        fn stop(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn set_volume(&mut self, _v: u8) -> Result<(), PlayerError> { Ok(()) }
        fn set_brightness(&mut self, _v: u8) -> Result<(), PlayerError> { Ok(()) }
        fn set_effects(
            &mut self,
            _effects: &crate::dmx::frame::EffectParams,
        ) -> Result<(), PlayerError> {
            Ok(())
        }
    }

    #[test]
    fn load_failure_with_no_prior_media_is_stopped() {
        let dir = media_tree();
        let mut c = Controller::new(Box::new(FailingLoadPlayer), MediaLibrary::new(dir.path()));
        c.apply_frame(&frame(1, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Stopped);
        assert!(c.last_error().unwrap().contains("loadfile"));
    }

    /// Player that fails loads only after the first one succeeded.
    struct FailingSecondLoadPlayer {
        loads: usize,
    }

    impl Player for FailingSecondLoadPlayer {
        fn load(&mut self, _source: &MediaSource) -> Result<(), PlayerError> {
            self.loads += 1;
            if self.loads > 1 {
                Err(PlayerError::Rejected {
                    command: "loadfile".into(),
                    reason: "no decoder".into(),
                })
            } else {
                Ok(())
            }
        }
        fn play(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn pause(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn resume(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn set_loop(&mut self, _enabled: bool) -> Result<(), PlayerError> { Ok(()) }
        fn stop(&mut self) -> Result<(), PlayerError> { Ok(()) }
        fn set_volume(&mut self, _v: u8) -> Result<(), PlayerError> { Ok(()) }
        fn set_brightness(&mut self, _v: u8) -> Result<(), PlayerError> { Ok(()) }
        fn set_effects(
            &mut self,
            _effects: &crate::dmx::frame::EffectParams,
        ) -> Result<(), PlayerError> {
            Ok(())
        }
    }

    #[test]
    fn load_failure_with_prior_media_preserves_state() {
        let dir = media_tree();
        let mut c = Controller::new(
            Box::new(FailingSecondLoadPlayer { loads: 0 }),
            MediaLibrary::new(dir.path()),
        );
        c.apply_frame(&frame(1, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        c.apply_frame(&frame(2, 0, 0));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.target(), Some((0, 1)));
        assert!(c.last_error().is_some());
    }

    // ---- Loop plumbing ----

    #[test]
    fn run_loop_processes_frames_and_shuts_down() {
        let dir = media_tree();
        let (player, log) = HeadlessPlayer::recording();
        let controller = Controller::new(Box::new(player), MediaLibrary::new(dir.path()));
        let (tx, rx) = crossbeam_channel::bounded(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let status = StatusHandle::new();
        let config = Arc::new(Mutex::new(Config {
            media_root: dir.path().to_path_buf(),
            ..Config::default()
        }));

        let flag = shutdown.clone();
        let loop_status = status.clone();
        let loop_config = config.clone();
        let handle = std::thread::spawn(move || {
            run_loop(controller, &rx, &flag, &loop_status, &loop_config);
        });

        tx.send(DmxEvent::Frame(frame(1, 0, 0))).unwrap();
        // Wait for the frame to be applied.
        for _ in 0..100 {
            if log.count_of("load") > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert_eq!(log.count_of("load"), 1);
        let json: serde_json::Value = serde_json::from_str(&status.latest_json()).unwrap();
        assert_eq!(json["state"], "playing");
        assert_eq!(json["dmx_signal"], true);
    }
}
