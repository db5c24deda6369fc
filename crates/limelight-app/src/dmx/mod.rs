//! DMX input: frame decoding and the Art-Net receiver lifecycle.

pub mod frame;
pub mod receiver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use self::frame::{ChannelFrame, FrameError};
use crate::config::Config;

/// What the receiver hands to the control loop per Art-Net packet.
#[derive(Debug)]
pub enum DmxEvent {
    Frame(ChannelFrame),
    /// The universe data could not cover our channel block; the previous
    /// decoded state stays authoritative.
    Malformed(FrameError),
}

/// Owns the Art-Net receiver thread and the frame channel.
pub struct DmxSystem {
    events: Receiver<DmxEvent>,
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DmxSystem {
    /// Bind the socket and start the receiver thread.
    pub fn start(config: &Config) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let (shutdown, handle) =
            receiver::spawn_receiver(config.artnet_port, config.universe, config.address, tx)?;
        Ok(Self {
            events: rx,
            shutdown,
            thread_handle: Some(handle),
        })
    }

    /// Event stream for the control loop.
    pub fn events(&self) -> Receiver<DmxEvent> {
        self.events.clone()
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DmxSystem {
    fn drop(&mut self) {
        self.stop();
    }
}
