// src/services/autodj.rs - The auto DJ producer: scheduler output pumped
// through the encoder into the auto DJ channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config;
use crate::station::RadioStation;

use super::transcoder::{self, Transcoder};

pub fn spawn(station: Arc<RadioStation>) -> JoinHandle<()> {
    let tx = station.autodj_sender();
    tokio::spawn(run(station, tx))
}

fn silent_chunk() -> Bytes {
    Bytes::from_static(&config::SILENT_FRAME)
}

async fn run(station: Arc<RadioStation>, tx: mpsc::Sender<Bytes>) {
    log::info!("Auto DJ producer started");

    loop {
        // While paused or preempted by a live source, keep the channel
        // primed with silence. Non-blocking: the broadcaster is not
        // draining this channel during live, so a full buffer just drops.
        if !station.is_playing() || station.live_active() {
            let _ = tx.try_send(silent_chunk());
            sleep(Duration::from_millis(config::PAUSED_TICK_MS)).await;
            continue;
        }

        let Some(item) = station.next_item() else {
            let _ = tx.send(silent_chunk()).await;
            sleep(Duration::from_secs(config::IDLE_RETRY_SECS)).await;
            continue;
        };

        let path = item.path();
        if !path.exists() {
            log::warn!("File not found: {}. Skipping and rescanning.", path.display());
            station.rescan(item.kind);
            continue;
        }

        station.set_current_item(&item);
        log::info!("[AutoDJ] Now playing: ({}) {}", item.kind.label(), item.filename);

        match Transcoder::start(&path) {
            Ok(mut job) => {
                pump_track(&station, &tx, &mut job).await;
                match job.wait().await {
                    Ok(status) if !transcoder::is_normal_exit(status) => {
                        log::warn!("Encoder exited with {} for {}", status, item.filename);
                    }
                    Err(e) => log::warn!("Failed to reap encoder for {}: {}", item.filename, e),
                    _ => {}
                }
            }
            Err(e) => {
                log::warn!("Cannot start encoder for {}: {}", item.filename, e);
                sleep(Duration::from_millis(500)).await;
            }
        }

        station.clear_current_item();
    }
}

/// Copies encoded chunks into the auto DJ channel until the track ends or
/// the station is paused/preempted. The bounded blocking send plus the
/// encoder's real-time pacing keep the in-flight backlog small, so a live
/// switchover flushes in well under a second.
async fn pump_track(station: &RadioStation, tx: &mpsc::Sender<Bytes>, job: &mut Transcoder) {
    loop {
        if !station.is_playing() || station.live_active() {
            job.cancel();
            return;
        }
        match job.read_chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(chunk).await.is_err() {
                    // Broadcaster gone: shutdown in progress.
                    job.cancel();
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                log::warn!("Encoder read error: {}", e);
                job.cancel();
                return;
            }
        }
    }
}
