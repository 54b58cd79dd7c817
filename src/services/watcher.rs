// src/services/watcher.rs - Keeps the catalog in sync with the content
// directories: filesystem events plus a periodic fallback rescan.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{watcher, DebouncedEvent, RecursiveMode, Watcher};
use tokio::time::{interval, MissedTickBehavior};

use crate::catalog::MediaKind;
use crate::config;
use crate::station::RadioStation;

pub fn spawn(station: Arc<RadioStation>) {
    let fs_station = station.clone();
    // notify's debounced watcher is a blocking std channel consumer.
    std::thread::spawn(move || watch_content_dirs(fs_station));

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config::EMPTY_CATALOG_RESCAN_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if station.song_count() == 0 {
                log::debug!("Song list empty, rescanning content directories");
                station.rescan_all();
            }
        }
    });
}

fn watch_content_dirs(station: Arc<RadioStation>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = match watcher(tx, Duration::from_secs(config::WATCHER_DEBOUNCE_SECS)) {
        Ok(watcher) => watcher,
        Err(e) => {
            log::warn!("Filesystem watcher unavailable: {}", e);
            return;
        }
    };

    for kind in MediaKind::ALL {
        if let Err(e) = watcher.watch(kind.dir(), RecursiveMode::NonRecursive) {
            log::warn!("Cannot watch {}: {}", kind.dir().display(), e);
        }
    }
    log::info!("Watching content directories for changes");

    loop {
        match rx.recv() {
            Ok(DebouncedEvent::Create(path))
            | Ok(DebouncedEvent::Remove(path))
            | Ok(DebouncedEvent::Rename(_, path)) => {
                if let Some(kind) = kind_for_path(&path) {
                    log::info!("Content change detected in {} directory, rescanning", kind.label());
                    station.rescan(kind);
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

fn kind_for_path(path: &Path) -> Option<MediaKind> {
    MediaKind::ALL.into_iter().find(|kind| path.starts_with(kind.dir()))
}
