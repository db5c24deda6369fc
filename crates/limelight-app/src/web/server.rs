//! Read-only HTTP status endpoint.
//!
//! Serves the latest playback snapshot as JSON plus a minimal index page.
//! The full dashboard and the file-management API live in an external
//! collaborator; this surface only exposes copy-on-read state.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::status::StatusHandle;

/// Embedded index page: fetches /status and renders the raw snapshot.
const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>limelight</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
  h1 { font-size: 1.2em; }
  pre { background: #1b1b1b; padding: 1em; border-radius: 4px; }
</style>
</head>
<body>
<h1>limelight status</h1>
<pre id="status">loading...</pre>
<script>
  async function refresh() {
    try {
      const r = await fetch('/status');
      document.getElementById('status').textContent =
        JSON.stringify(await r.json(), null, 2);
    } catch (e) {
      document.getElementById('status').textContent = 'unreachable: ' + e;
    }
  }
  refresh();
  setInterval(refresh, 1000);
</script>
</body>
</html>
"#;

/// Spawn the accept loop thread. Returns the thread handle.
pub fn spawn_accept_loop(
    port: u16,
    status: StatusHandle,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    log::info!("Status server listening on http://{addr}");

    let handle = thread::Builder::new()
        .name("limelight-web".into())
        .spawn(move || {
            // Accept with a timeout so the shutdown flag gets checked.
            let _ = listener.set_nonblocking(true);

            while !shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        log::debug!("Status request from {addr}");
                        let _ = stream.set_nonblocking(false);
                        handle_connection(stream, &status);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        if !shutdown.load(Ordering::Relaxed) {
                            log::error!("Status server accept error: {e}");
                        }
                        break;
                    }
                }
            }
            log::info!("Status server thread shutting down");
        })?;

    Ok(handle)
}

fn handle_connection(mut stream: TcpStream, status: &StatusHandle) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

    let mut buf = [0u8; 2048];
    let n = match stream.read(&mut buf) {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status_line, content_type, body) = match path {
        "/" | "/index.html" => ("200 OK", "text/html; charset=utf-8", INDEX_HTML.to_string()),
        "/status" => ("200 OK", "application/json", status.latest_json()),
        "/health" => ("200 OK", "application/json", r#"{"status":"ok"}"#.to_string()),
        _ => {
            let response = "HTTP/1.1 302 Found\r\nLocation: /\r\nContent-Length: 0\r\n\r\n";
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
            return;
        }
    };

    let response = format!(
        "HTTP/1.1 {status_line}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}
