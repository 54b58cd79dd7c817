// src/services/dispatcher.rs - Single public TCP port: sniffs the request
// line and routes source clients to the live ingest, everyone else to the
// internal HTTP backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::config;
use crate::station::RadioStation;

use super::ingest;

pub fn spawn(listener: TcpListener, station: Arc<RadioStation>, http_port: u16) -> JoinHandle<()> {
    tokio::spawn(run(listener, station, http_port))
}

async fn run(listener: TcpListener, station: Arc<RadioStation>, http_port: u16) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::debug!("Connection from {}", peer);
                let station = station.clone();
                tokio::spawn(async move {
                    handle_connection(stream, station, http_port).await;
                });
            }
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, station: Arc<RadioStation>, http_port: u16) {
    let mut prefix = Vec::with_capacity(config::SNIFF_MAX_BYTES);
    if let Err(e) = sniff_request_line(&mut stream, &mut prefix).await {
        log::debug!("Dropping connection before routing: {}", e);
        return;
    }

    let line = first_line(&prefix);
    if is_source_request(&line) {
        log::info!("Live source connecting: {}", line);
        ingest::handle(stream, prefix, station).await;
    } else {
        proxy_to_http(stream, prefix, http_port).await;
    }
}

/// Consumes bytes until the first CRLF is seen, never more than the sniff
/// window, within the sniff timeout. The consumed bytes travel with the
/// connection so the chosen handler sees an untruncated request.
async fn sniff_request_line<S>(stream: &mut S, prefix: &mut Vec<u8>) -> std::io::Result<()>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + Duration::from_secs(config::SNIFF_TIMEOUT_SECS);
    let mut tmp = [0u8; 512];

    while !contains_line_end(prefix) && prefix.len() < config::SNIFF_MAX_BYTES {
        let remaining = deadline.checked_duration_since(Instant::now()).ok_or_else(timeout_error)?;
        let cap = std::cmp::min(tmp.len(), config::SNIFF_MAX_BYTES - prefix.len());
        let n = timeout(remaining, stream.read(&mut tmp[..cap]))
            .await
            .map_err(|_| timeout_error())??;
        if n == 0 {
            break;
        }
        prefix.extend_from_slice(&tmp[..n]);
    }

    if prefix.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before any data",
        ));
    }
    Ok(())
}

fn timeout_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "no request line within sniff window")
}

fn contains_line_end(buf: &[u8]) -> bool {
    buf.contains(&b'\n')
}

/// The first line of the sniffed bytes, without the line terminator.
fn first_line(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Icecast-style source clients open with `SOURCE /live` (legacy) or
/// `PUT /live` (modern); everything else is ordinary HTTP.
pub fn is_source_request(line: &str) -> bool {
    line.starts_with("SOURCE /live") || line.starts_with("PUT /live")
}

/// Replays the sniffed bytes to the internal HTTP backend and then shuttles
/// bytes in both directions until either side closes.
async fn proxy_to_http(mut client: TcpStream, prefix: Vec<u8>, http_port: u16) {
    let mut backend = match TcpStream::connect(("127.0.0.1", http_port)).await {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("Internal HTTP backend unreachable: {}", e);
            let _ = client.write_all(b"HTTP/1.0 502 Bad Gateway\r\n\r\n").await;
            return;
        }
    };

    if let Err(e) = backend.write_all(&prefix).await {
        log::debug!("Backend write failed: {}", e);
        return;
    }
    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((to_backend, to_client)) => {
            log::debug!("Proxied connection done ({}B in, {}B out)", to_backend, to_client);
        }
        Err(e) => log::debug!("Proxy shuttle ended: {}", e),
    }
}
