// src/scheduler.rs - Program scheduler: song rotation with jingle/ad interleaving

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, MediaItem, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Shuffle,
    Sequential,
}

impl PlaybackMode {
    pub fn parse(s: &str) -> Option<PlaybackMode> {
        match s {
            "shuffle" => Some(PlaybackMode::Shuffle),
            "sequential" => Some(PlaybackMode::Sequential),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::Shuffle => "shuffle",
            PlaybackMode::Sequential => "sequential",
        }
    }
}

/// Decides what plays next. Jingles and ads are woven into the song rotation
/// at configurable intervals; a due jingle always wins over a due ad.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub mode: PlaybackMode,
    pub jingle_interval: u32,
    pub ad_interval: u32,
    songs_since_jingle: u32,
    songs_since_ad: u32,
    last_jingle_idx: Option<usize>,
    last_ad_idx: Option<usize>,
    play_queue: Vec<String>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::Shuffle,
            jingle_interval: 3,
            ad_interval: 10,
            songs_since_jingle: 0,
            songs_since_ad: 0,
            last_jingle_idx: None,
            last_ad_idx: None,
            play_queue: Vec::new(),
        }
    }
}

impl Scheduler {
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    /// An interval of 0 disables that kind entirely.
    pub fn set_intervals(&mut self, jingle_interval: u32, ad_interval: u32) {
        self.jingle_interval = jingle_interval;
        self.ad_interval = ad_interval;
    }

    /// Picks the next item. Decision order: due jingle, then due ad, then the
    /// head of the play queue (rebuilt from the song list when exhausted).
    /// Returns `None` only when the song list itself is empty.
    pub fn next(&mut self, catalog: &Catalog) -> Option<MediaItem> {
        if self.jingle_interval > 0
            && self.songs_since_jingle >= self.jingle_interval
            && !catalog.jingles.is_empty()
        {
            let idx = advance(self.last_jingle_idx, catalog.jingles.len());
            self.last_jingle_idx = Some(idx);
            self.songs_since_jingle = 0;
            return Some(MediaItem::new(MediaKind::Jingle, catalog.jingles[idx].clone()));
        }

        if self.ad_interval > 0
            && self.songs_since_ad >= self.ad_interval
            && !catalog.ads.is_empty()
        {
            let idx = advance(self.last_ad_idx, catalog.ads.len());
            self.last_ad_idx = Some(idx);
            self.songs_since_ad = 0;
            return Some(MediaItem::new(MediaKind::Ad, catalog.ads[idx].clone()));
        }

        if self.play_queue.is_empty() {
            self.rebuild_play_queue(catalog);
        }
        if self.play_queue.is_empty() {
            return None;
        }

        let filename = self.play_queue.remove(0);
        self.songs_since_jingle += 1;
        self.songs_since_ad += 1;
        Some(MediaItem::new(MediaKind::Song, filename))
    }

    /// Same decision as `next`, without mutating any state. In shuffle mode
    /// with an exhausted queue the upcoming song is not yet determined and
    /// peek reports nothing.
    pub fn peek(&self, catalog: &Catalog) -> Option<MediaItem> {
        if self.jingle_interval > 0
            && self.songs_since_jingle >= self.jingle_interval
            && !catalog.jingles.is_empty()
        {
            let idx = advance(self.last_jingle_idx, catalog.jingles.len());
            return Some(MediaItem::new(MediaKind::Jingle, catalog.jingles[idx].clone()));
        }

        if self.ad_interval > 0
            && self.songs_since_ad >= self.ad_interval
            && !catalog.ads.is_empty()
        {
            let idx = advance(self.last_ad_idx, catalog.ads.len());
            return Some(MediaItem::new(MediaKind::Ad, catalog.ads[idx].clone()));
        }

        if let Some(filename) = self.play_queue.first() {
            return Some(MediaItem::new(MediaKind::Song, filename.clone()));
        }
        match self.mode {
            PlaybackMode::Sequential => catalog
                .songs
                .first()
                .map(|filename| MediaItem::new(MediaKind::Song, filename.clone())),
            PlaybackMode::Shuffle => None,
        }
    }

    /// Drops queued songs so the next rebuild picks up catalog changes.
    pub fn clear_play_queue(&mut self) {
        self.play_queue.clear();
    }

    fn rebuild_play_queue(&mut self, catalog: &Catalog) {
        if catalog.songs.is_empty() {
            return;
        }
        let mut queue = catalog.songs.clone();
        if self.mode == PlaybackMode::Shuffle {
            queue.shuffle(&mut rand::thread_rng());
        }
        self.play_queue = queue;
    }
}

fn advance(last: Option<usize>, len: usize) -> usize {
    match last {
        Some(idx) => (idx + 1) % len,
        None => 0,
    }
}
