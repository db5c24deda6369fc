//! Status web server lifecycle.

pub mod server;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::status::StatusHandle;

/// Owns the status-server accept thread.
pub struct WebSystem {
    shutdown: Option<Arc<AtomicBool>>,
    accept_handle: Option<JoinHandle<()>>,
}

impl WebSystem {
    /// Start the status server; a bind failure is logged, not fatal — the
    /// playback core runs fine without it.
    pub fn start(port: u16, status: StatusHandle) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        match server::spawn_accept_loop(port, status, shutdown.clone()) {
            Ok(handle) => Self {
                shutdown: Some(shutdown),
                accept_handle: Some(handle),
            },
            Err(e) => {
                log::error!("Failed to start status server on port {port}: {e}");
                Self {
                    shutdown: None,
                    accept_handle: None,
                }
            }
        }
    }

    /// Placeholder system when the server is disabled in config.
    pub fn disabled() -> Self {
        Self {
            shutdown: None,
            accept_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| !s.load(Ordering::Relaxed))
    }

    pub fn stop(&mut self) {
        if let Some(ref shutdown) = self.shutdown {
            shutdown.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        self.shutdown = None;
    }
}

impl Drop for WebSystem {
    fn drop(&mut self) {
        self.stop();
    }
}
