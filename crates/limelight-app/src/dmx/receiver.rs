//! Art-Net UDP receiver thread.
//!
//! Binds the Art-Net port, decodes packets with `artnet_protocol`, slices out
//! our 13-channel block and hands frames to the control loop over a bounded
//! channel. `try_send` keeps ingestion from ever blocking on a slow consumer;
//! a full channel drops the frame (consoles retransmit continuously).

use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use artnet_protocol::{ArtCommand, PortAddress};
use crossbeam_channel::Sender;

use super::DmxEvent;
use super::frame::{ChannelFrame, FrameError, NUM_CHANNELS};

/// Spawn a UDP receiver thread that decodes Art-Net and forwards our channel
/// block. Returns the shutdown flag and the thread handle.
pub fn spawn_receiver(
    port: u16,
    universe: u16,
    address: u16,
    tx: Sender<DmxEvent>,
) -> anyhow::Result<(Arc<AtomicBool>, JoinHandle<()>)> {
    let bind = format!("0.0.0.0:{port}");
    let socket = UdpSocket::bind(&bind).with_context(|| format!("failed to bind {bind}"))?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;
    let wanted = PortAddress::try_from(universe)
        .map_err(|e| anyhow::anyhow!("invalid Art-Net universe {universe}: {e:?}"))?;
    log::info!("Art-Net receiver listening on {bind} (universe {universe}, address {address})");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    let handle = thread::Builder::new()
        .name("limelight-artnet-rx".into())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            while !shutdown_flag.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((size, _addr)) => match ArtCommand::from_buffer(&buf[..size]) {
                        Ok(ArtCommand::Output(output)) if output.port_address == wanted => {
                            let event = match frame_from_universe(output.data.as_ref(), address)
                            {
                                Ok(frame) => DmxEvent::Frame(frame),
                                Err(e) => DmxEvent::Malformed(e),
                            };
                            let _ = tx.try_send(event);
                        }
                        Ok(_) => {
                            // Polls, replies and foreign universes are not ours.
                        }
                        Err(e) => {
                            log::debug!("Art-Net decode error: {e:?}");
                        }
                    },
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        // Timeout — loop back and check shutdown flag
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        // Windows-style timeout
                    }
                    Err(e) => {
                        log::error!("Art-Net recv error: {e}");
                        break;
                    }
                }
            }
            log::info!("Art-Net receiver thread shutting down");
        })?;

    Ok((shutdown, handle))
}

/// Slice our channel block out of the universe data. `address` is the
/// 1-based DMX start channel.
fn frame_from_universe(data: &[u8], address: u16) -> Result<ChannelFrame, FrameError> {
    let start = usize::from(address.saturating_sub(1));
    let end = start + NUM_CHANNELS;
    if data.len() < end {
        return Err(FrameError::Malformed(data.len().saturating_sub(start)));
    }
    ChannelFrame::from_slice(&data[start..end])
}
