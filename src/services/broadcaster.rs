// src/services/broadcaster.rs - The master broadcaster: selects the active
// source channel and fans chunks out to every listener sink.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config;
use crate::station::{RadioStation, SourceReceivers};

pub fn spawn(station: Arc<RadioStation>) -> JoinHandle<()> {
    let receivers = station.take_source_receivers();
    tokio::spawn(run(station, receivers))
}

fn silent_chunk() -> Bytes {
    Bytes::from_static(&config::SILENT_FRAME)
}

/// Exactly one source feeds the listeners at any instant. The switchover is
/// chunk-aligned: on a live-flag edge the queued auto DJ backlog is
/// discarded, and when a live session ends its leftover buffer is discarded
/// too, so the next session starts clean.
async fn run(station: Arc<RadioStation>, receivers: SourceReceivers) {
    let SourceReceivers { mut autodj_rx, mut live_rx } = receivers;
    log::info!("Master broadcaster started");

    let live_timeout = Duration::from_millis(config::LIVE_RECV_TIMEOUT_MS);
    let autodj_timeout = Duration::from_millis(config::AUTODJ_RECV_TIMEOUT_MS);

    let mut was_live = false;
    let mut live_silent_ticks: u32 = 0;

    loop {
        let live_now = station.live_active();
        if live_now != was_live {
            let discarded = drain(&mut autodj_rx);
            if discarded > 0 {
                log::debug!("Discarded {} queued auto DJ chunks at switchover", discarded);
            }
            if !live_now {
                let stale = drain(&mut live_rx);
                if stale > 0 {
                    log::debug!("Discarded {} stale live chunks after session end", stale);
                }
            }
            live_silent_ticks = 0;
            was_live = live_now;
        }

        let chunk = if live_now {
            match timeout(live_timeout, live_rx.recv()).await {
                Ok(Some(chunk)) => {
                    live_silent_ticks = 0;
                    chunk
                }
                Ok(None) => silent_chunk(),
                Err(_) => {
                    live_silent_ticks += 1;
                    // One notice, not one per tick.
                    if live_silent_ticks == config::LIVE_LAG_NOTICE_TICKS {
                        log::warn!("Live source connected but sending no audio (lag?)");
                    }
                    silent_chunk()
                }
            }
        } else {
            match timeout(autodj_timeout, autodj_rx.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    log::info!("Auto DJ channel closed, broadcaster stopping");
                    break;
                }
                Err(_) => silent_chunk(),
            }
        };

        station.distribute(&chunk);
    }
}

fn drain(rx: &mut mpsc::Receiver<Bytes>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}
