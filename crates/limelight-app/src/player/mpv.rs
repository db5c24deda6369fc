//! mpv playback engine over its JSON IPC socket.
//!
//! One mpv process is spawned in idle mode with a forced fullscreen window
//! and kept alive for the whole server lifetime; media is swapped via
//! `loadfile` for minimal startup latency. Every command is a one-line JSON
//! request tagged with a request id; replies are matched on that id and
//! asynchronous event lines are skipped.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::Context;
use serde_json::{Value, json};

use super::{Player, PlayerError};
use crate::dmx::frame::EffectParams;
use crate::library::MediaSource;

/// How long to wait for mpv to create its IPC socket after spawn.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-reply read timeout; mpv answers set_property/loadfile immediately.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MpvPlayer {
    child: Child,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    socket_path: PathBuf,
    request_id: u64,
}

impl MpvPlayer {
    /// Spawn mpv and connect to its IPC socket.
    pub fn spawn(hwdec: &str) -> anyhow::Result<Self> {
        let socket_path =
            std::env::temp_dir().join(format!("limelight-mpv-{}.sock", std::process::id()));

        let child = Command::new("mpv")
            .arg("--idle=yes")
            .arg("--force-window=immediate")
            .arg("--fullscreen")
            .arg("--background-color=#000000")
            .arg("--no-osc")
            .arg("--no-config")
            .arg("--input-default-bindings=no")
            .arg("--input-vo-keyboard=no")
            .arg("--keep-open=no")
            .arg("--framedrop=vo")
            .arg("--cache=auto")
            .arg(format!("--hwdec={hwdec}"))
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to start mpv (is it installed?)")?;

        let stream = connect_with_retry(&socket_path, CONNECT_TIMEOUT)
            .context("mpv did not open its IPC socket")?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        let writer = stream.try_clone()?;

        log::info!("mpv started (ipc: {})", socket_path.display());

        Ok(Self {
            child,
            reader: BufReader::new(stream),
            writer,
            socket_path,
            request_id: 0,
        })
    }

    /// Send one command and wait for its tagged reply.
    fn command(&mut self, args: Vec<Value>) -> Result<(), PlayerError> {
        self.request_id += 1;
        let id = self.request_id;
        let name = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        let request = json!({ "command": args, "request_id": id });

        let mut line = serde_json::to_string(&request).expect("command serializes");
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;

        // Replies and events are interleaved on the socket; skip events until
        // our request id comes back.
        loop {
            let mut reply = String::new();
            let n = self.reader.read_line(&mut reply)?;
            if n == 0 {
                return Err(PlayerError::Rejected {
                    command: name,
                    reason: "mpv closed the IPC socket".into(),
                });
            }
            let Ok(value) = serde_json::from_str::<Value>(&reply) else {
                continue;
            };
            if value.get("request_id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            let status = value.get("error").and_then(Value::as_str).unwrap_or("");
            if status == "success" {
                return Ok(());
            }
            return Err(PlayerError::Rejected {
                command: name,
                reason: status.to_string(),
            });
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PlayerError> {
        self.command(vec!["set_property".into(), name.into(), value])
    }
}

impl Player for MpvPlayer {
    fn load(&mut self, source: &MediaSource) -> Result<(), PlayerError> {
        let location = source.location();
        self.command(vec!["loadfile".into(), location.clone().into(), "replace".into()])?;
        log::info!("Loaded '{location}'");
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(true))
    }

    fn resume(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(false))
    }

    fn set_loop(&mut self, enabled: bool) -> Result<(), PlayerError> {
        // loop-file=inf repeats seamlessly inside the demuxer; no stop/reopen,
        // no frame drop at the boundary, no iteration cap.
        self.set_property("loop-file", json!(if enabled { "inf" } else { "no" }))
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(false))?;
        self.command(vec!["stop".into()])
    }

    fn set_volume(&mut self, dmx_value: u8) -> Result<(), PlayerError> {
        self.set_property("volume", json!(dmx_to_volume(dmx_value)))
    }

    fn set_brightness(&mut self, dmx_value: u8) -> Result<(), PlayerError> {
        self.set_property("brightness", json!(dmx_to_brightness(dmx_value)))
    }

    fn set_effects(&mut self, effects: &EffectParams) -> Result<(), PlayerError> {
        self.set_property("contrast", json!(effects.contrast))?;
        self.set_property("saturation", json!(effects.saturation))?;
        self.set_property("gamma", json!(effects.gamma))?;
        self.set_property("speed", json!(effects.speed))?;
        self.set_property("video-rotate", json!(effects.rotation))?;
        self.set_property("video-zoom", json!(effects.zoom))?;
        self.set_property("video-pan-x", json!(effects.pan_x))?;
        self.set_property("video-pan-y", json!(effects.pan_y))
    }

    fn show_message(&mut self, text: &str, duration_secs: f32) -> Result<(), PlayerError> {
        let millis = (duration_secs * 1000.0).round() as i64;
        self.command(vec!["show-text".into(), text.into(), json!(millis)])
    }

    fn shutdown(&mut self) {
        let _ = self.command(vec!["quit".into()]);
        // Give mpv a moment to exit on its own before killing it.
        for _ in 0..20 {
            match self.child.try_wait() {
                Ok(Some(_)) | Err(_) => break,
                Ok(None) => std::thread::sleep(Duration::from_millis(100)),
            }
        }
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        log::info!("mpv shut down");
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.shutdown();
        }
    }
}

fn connect_with_retry(path: &PathBuf, timeout: Duration) -> std::io::Result<UnixStream> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(e) if std::time::Instant::now() >= deadline => return Err(e),
            Err(_) => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

/// DMX 0-255 to mpv volume 0-100.
fn dmx_to_volume(value: u8) -> i64 {
    (f64::from(value) * 100.0 / 255.0).round() as i64
}

/// DMX 0-255 to mpv brightness -100..0 (0 = black, 255 = normal picture).
fn dmx_to_brightness(value: u8) -> i64 {
    (f64::from(value) * 100.0 / 255.0).round() as i64 - 100
}
