// Integration tests for Radiocast
// These tests verify the interaction between different modules, including
// the shared public port serving both HTTP and Icecast-style sources.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

use radiocast::catalog::{Catalog, MediaKind};
use radiocast::config::Settings;
use radiocast::scheduler::Scheduler;
use radiocast::services::dispatcher;
use radiocast::station::RadioStation;

#[test]
fn test_interleaving_holds_over_long_programs() {
    let catalog = Catalog {
        songs: (1..=10).map(|i| format!("s{:02}.mp3", i)).collect(),
        jingles: vec!["j1.mp3".into(), "j2.mp3".into(), "j3.mp3".into()],
        ads: vec!["a1.mp3".into(), "a2.mp3".into()],
    };
    let mut scheduler = Scheduler::default(); // shuffle mode
    scheduler.set_intervals(3, 5);

    let mut songs_since_jingle = 0u32;
    let mut songs_since_ad = 0u32;
    for _ in 0..500 {
        let item = scheduler.next(&catalog).expect("program never runs dry");
        match item.kind {
            MediaKind::Song => {
                songs_since_jingle += 1;
                songs_since_ad += 1;
                assert!(songs_since_jingle <= 3, "jingle overdue");
                assert!(songs_since_ad <= 5, "ad overdue");
            }
            MediaKind::Jingle => {
                assert_eq!(songs_since_jingle, 3, "jingle emitted off schedule");
                songs_since_jingle = 0;
            }
            MediaKind::Ad => {
                assert_eq!(songs_since_ad, 5, "ad emitted off schedule");
                songs_since_ad = 0;
            }
        }
    }
}

/// Reads from the socket until the response head is complete.
async fn read_response_head(conn: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 512];
    let deadline = Duration::from_secs(3);
    let result = timeout(deadline, async {
        loop {
            let n = conn.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
            if collected.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "no response head within {:?}", deadline);
    String::from_utf8_lossy(&collected).into_owned()
}

#[tokio::test]
async fn test_source_client_on_public_port() {
    let station = RadioStation::new(Settings::default());
    let receivers = station.take_source_receivers();
    let mut live_rx = receivers.live_rx;

    let public = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = public.local_addr().unwrap();
    dispatcher::spawn(public, station.clone(), 1);

    let mut conn = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "SOURCE /live HTTP/1.0\r\nAuthorization: Basic {}\r\nice-name: Roving DJ\r\n\r\n",
        BASE64.encode("dj_live:12345")
    );
    conn.write_all(request.as_bytes()).await.unwrap();

    let response = read_response_head(&mut conn).await;
    assert!(response.starts_with("HTTP/1.0 200 OK"), "got: {}", response);
    assert!(response.contains("Icecast-Auth: 1"));

    conn.write_all(b"frame-bytes").await.unwrap();
    let chunk = timeout(Duration::from_secs(2), live_rx.recv())
        .await
        .expect("live audio within 2s")
        .expect("live channel open");
    assert_eq!(chunk.as_ref(), b"frame-bytes");
    assert!(station.live_active());
    assert_eq!(station.now_playing_display(), "Roving DJ");

    // Disconnect takes the source off air.
    drop(conn);
    for _ in 0..50 {
        if !station.live_active() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert!(!station.live_active());
}

#[tokio::test]
async fn test_wrong_source_password_is_rejected() {
    let station = RadioStation::new(Settings::default());

    let public = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = public.local_addr().unwrap();
    dispatcher::spawn(public, station.clone(), 1);

    let mut conn = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "PUT /live HTTP/1.1\r\nAuthorization: Basic {}\r\n\r\n",
        BASE64.encode("dj_live:nope")
    );
    conn.write_all(request.as_bytes()).await.unwrap();

    let response = read_response_head(&mut conn).await;
    assert!(response.starts_with("HTTP/1.0 401"), "got: {}", response);
    assert!(!station.live_active());
}

#[tokio::test]
async fn test_status_and_source_share_the_port() {
    // Stand-in HTTP backend: answers with the request line it saw, proving
    // the dispatcher replayed the sniffed bytes unharmed.
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_port = backend.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = backend.accept().await else { break };
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    seen.extend_from_slice(&buf[..n]);
                    if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let first_line_end = seen.iter().position(|&b| b == b'\r').unwrap_or(seen.len());
                let body = format!(
                    "{{\"radio_name\":\"Radiocast\",\"seen\":\"{}\"}}",
                    String::from_utf8_lossy(&seen[..first_line_end])
                );
                let response = format!(
                    "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(response.as_bytes()).await;
            });
        }
    });

    let station = RadioStation::new(Settings::default());
    let public = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = public.local_addr().unwrap();
    dispatcher::spawn(public, station.clone(), backend_port);

    // Plain HTTP on the public port reaches the backend.
    let mut http = TcpStream::connect(addr).await.unwrap();
    http.write_all(b"GET /status HTTP/1.0\r\nHost: radio\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(3), http.read_to_end(&mut response))
        .await
        .expect("proxied response within 3s")
        .unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.contains("\"radio_name\":\"Radiocast\""), "got: {}", response);
    assert!(response.contains("GET /status HTTP/1.0"), "sniffed bytes were not replayed");

    // A source client on the very same port still reaches the ingest.
    let mut source = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "SOURCE /live HTTP/1.0\r\nAuthorization: Basic {}\r\n\r\n",
        BASE64.encode("dj_live:12345")
    );
    source.write_all(request.as_bytes()).await.unwrap();
    let response = read_response_head(&mut source).await;
    assert!(response.contains("Icecast-Auth: 1"), "got: {}", response);
}
