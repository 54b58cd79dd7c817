// src/services/ingest.rs - Icecast-style live source ingest: header parse,
// authentication and the body pump into the live channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use crate::config;
use crate::error::{RadioError, Result};
use crate::station::RadioStation;

const RESPONSE_OK: &[u8] = b"HTTP/1.0 200 OK\r\nIcecast-Auth: 1\r\n\r\n";
const RESPONSE_UNAUTHORIZED: &[u8] = b"HTTP/1.0 401 Unauthorized\r\n\r\n";

/// One parsed request head. Header names are lowercased; values keep their
/// whitespace-trimmed form.
#[derive(Debug)]
struct RequestHead {
    headers: HashMap<String, String>,
}

/// Runs one live source session on a connection handed over by the protocol
/// dispatcher. `prefix` holds the bytes the dispatcher already consumed
/// while sniffing; they are logically prepended to the socket.
pub async fn handle<S>(stream: S, prefix: Vec<u8>, station: Arc<RadioStation>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match session(stream, prefix, &station).await {
        Ok(()) => log::info!("Live source disconnected"),
        Err(e) => log::warn!("Live ingest closed: {}", e),
    }
}

async fn session<S>(mut stream: S, prefix: Vec<u8>, station: &RadioStation) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // idle -> authenticating once the full head has arrived
    let (head, body_start) = read_head(&mut stream, prefix).await?;

    let credentials = head
        .headers
        .get("authorization")
        .and_then(|value| parse_basic_auth(value));
    let authorized = match credentials {
        Some((user, password)) => station.verify_live_credentials(&user, &password),
        None => false,
    };
    if !authorized {
        let _ = stream.write_all(RESPONSE_UNAUTHORIZED).await;
        return Err(RadioError::LiveAuth);
    }

    if let Some(name) = head.headers.get("ice-name") {
        station.set_live_name(name);
    }

    // authenticating -> streaming: the broadcaster switches source
    stream.write_all(RESPONSE_OK).await?;
    station.go_live();
    log::info!("Live source authenticated, streaming");

    let result = pump_body(&mut stream, body_start, station.live_sender()).await;

    // streaming -> closing: the broadcaster reverts to the auto DJ
    station.end_live();
    result
}

/// Reads up to the blank line that ends the request head, bounded by the
/// header timeout and a maximum header size. Returns the parsed head plus
/// any body bytes that arrived in the same reads.
async fn read_head<S>(stream: &mut S, mut buf: Vec<u8>) -> Result<(RequestHead, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + Duration::from_secs(config::INGEST_HEADER_TIMEOUT_SECS);
    let mut tmp = [0u8; 1024];

    loop {
        if let Some(end) = find_subsequence(&buf, b"\r\n\r\n") {
            let head = parse_head(&buf[..end])?;
            let body_start = buf[end + 4..].to_vec();
            return Ok((head, body_start));
        }
        if buf.len() > config::INGEST_MAX_HEADER_BYTES {
            return Err(RadioError::LiveProtocol("request head too large".to_string()));
        }

        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or_else(|| RadioError::LiveProtocol("header read timed out".to_string()))?;
        let n = timeout(remaining, stream.read(&mut tmp))
            .await
            .map_err(|_| RadioError::LiveProtocol("header read timed out".to_string()))??;
        if n == 0 {
            return Err(RadioError::LiveProtocol("connection closed during headers".to_string()));
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

fn parse_head(raw: &[u8]) -> Result<RequestHead> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| RadioError::LiveProtocol("missing request line".to_string()))?;
    log::debug!("Live ingest request: {}", request_line);

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok(RequestHead { headers })
}

/// Decodes an HTTP Basic `Authorization` value into (user, password).
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value.trim().strip_prefix("Basic ").or_else(|| value.trim().strip_prefix("basic "))?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Publishes raw MP3 body bytes into the live channel until EOF or a read
/// error. The publish is non-blocking: when the broadcaster falls behind
/// the overflow is dropped rather than back-pressuring the source client.
async fn pump_body<S>(stream: &mut S, body_start: Vec<u8>, live_tx: mpsc::Sender<Bytes>) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    for piece in body_start.chunks(config::CHUNK_SIZE) {
        publish(&live_tx, Bytes::copy_from_slice(piece));
    }

    let mut buf = vec![0u8; config::CHUNK_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => publish(&live_tx, Bytes::copy_from_slice(&buf[..n])),
            Err(e) => {
                log::debug!("Live source read error: {}", e);
                return Ok(());
            }
        }
    }
}

fn publish(live_tx: &mpsc::Sender<Bytes>, chunk: Bytes) {
    match live_tx.try_send(chunk) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            log::debug!("Live channel full, chunk dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
