// src/station.rs - The radio station aggregate: broadcast state, catalog,
// scheduler and the listener registry, shared by every task.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::catalog::{Catalog, MediaItem, MediaKind};
use crate::config::{self, Settings};
use crate::error::Result;
use crate::scheduler::{PlaybackMode, Scheduler};

pub const DEFAULT_COVER_URL: &str = "/static/cover/default.png";
const LIVE_WAITING: &str = "LIVE - waiting for metadata...";

/// Everything mutable behind the coarse station lock. Hot loops only take
/// the lock long enough to snapshot the fields they need.
struct StationState {
    settings: Settings,
    catalog: Catalog,
    scheduler: Scheduler,
    is_playing: bool,
    live_active: bool,
    current_item: Option<MediaItem>,
    now_playing: String,
    live_name: String,
    cover_url: String,
}

/// Receivers for the two source channels, handed to the master broadcaster
/// exactly once at startup.
pub struct SourceReceivers {
    pub autodj_rx: mpsc::Receiver<Bytes>,
    pub live_rx: mpsc::Receiver<Bytes>,
}

pub struct RadioStation {
    state: Mutex<StationState>,
    listeners: DashMap<Uuid, mpsc::Sender<Bytes>>,
    autodj_tx: mpsc::Sender<Bytes>,
    live_tx: mpsc::Sender<Bytes>,
    receivers: Mutex<Option<SourceReceivers>>,
}

impl RadioStation {
    pub fn new(settings: Settings) -> Arc<Self> {
        let (autodj_tx, autodj_rx) = mpsc::channel(config::AUTODJ_CHANNEL_CAPACITY);
        let (live_tx, live_rx) = mpsc::channel(config::LIVE_CHANNEL_CAPACITY);

        Arc::new(Self {
            state: Mutex::new(StationState {
                settings,
                catalog: Catalog::load(),
                scheduler: Scheduler::default(),
                is_playing: true,
                live_active: false,
                current_item: None,
                now_playing: "Radio starting...".to_string(),
                live_name: LIVE_WAITING.to_string(),
                cover_url: DEFAULT_COVER_URL.to_string(),
            }),
            listeners: DashMap::new(),
            autodj_tx,
            live_tx,
            receivers: Mutex::new(Some(SourceReceivers { autodj_rx, live_rx })),
        })
    }

    // ---- source channels ---------------------------------------------------

    /// Producer handle for the auto DJ channel (blocking send for pacing).
    pub fn autodj_sender(&self) -> mpsc::Sender<Bytes> {
        self.autodj_tx.clone()
    }

    /// Producer handle for the live channel (non-blocking publish only).
    pub fn live_sender(&self) -> mpsc::Sender<Bytes> {
        self.live_tx.clone()
    }

    /// Takes both source receivers. Panics if called twice; only the master
    /// broadcaster consumes these.
    pub fn take_source_receivers(&self) -> SourceReceivers {
        self.receivers
            .lock()
            .take()
            .expect("source receivers already taken")
    }

    // ---- playback / live flags --------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_playing
    }

    pub fn live_active(&self) -> bool {
        self.state.lock().live_active
    }

    pub fn start_playback(&self) {
        let mut s = self.state.lock();
        if !s.is_playing {
            s.is_playing = true;
            log::info!("Playback started");
        }
    }

    pub fn stop_playback(&self) {
        let mut s = self.state.lock();
        if s.is_playing {
            s.is_playing = false;
            log::info!("Playback stopped, listeners now receive silence");
        }
    }

    /// Live source authenticated: preempt the auto DJ. The broadcaster
    /// discards the queued auto DJ backlog on the flag edge so no stale
    /// program audio leaks out after the switch.
    pub fn go_live(&self) {
        let mut s = self.state.lock();
        if !s.live_active {
            s.live_active = true;
            s.live_name = LIVE_WAITING.to_string();
            s.cover_url = DEFAULT_COVER_URL.to_string();
            log::info!("Signal change: live source on air");
        }
    }

    /// Live source gone: resume the auto DJ at the next chunk boundary.
    pub fn end_live(&self) {
        let mut s = self.state.lock();
        if s.live_active {
            s.live_active = false;
            s.cover_url = DEFAULT_COVER_URL.to_string();
            log::info!("Signal change: live source off air, auto DJ resuming");
        }
    }

    pub fn set_live_name(&self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.state.lock().live_name = name.to_string();
        }
    }

    /// Metadata callback from the live source software. `+` is a space in
    /// the Icecast convention. Ignored while the auto DJ is on air.
    pub fn update_live_metadata(&self, song: &str) -> bool {
        let mut s = self.state.lock();
        if !s.live_active {
            return false;
        }
        let pretty = song.replace('+', " ").trim().to_string();
        log::info!("Live metadata updated: {}", pretty);
        s.live_name = pretty;
        true
    }

    // ---- now playing -------------------------------------------------------

    /// Called by the auto DJ when a new item starts.
    pub fn set_current_item(&self, item: &MediaItem) {
        let mut s = self.state.lock();
        s.now_playing = match item.kind {
            MediaKind::Song => item.display_name(),
            other => format!("({}) {}", other.label().to_uppercase(), item.display_name()),
        };
        s.current_item = Some(item.clone());
        s.cover_url = DEFAULT_COVER_URL.to_string();
    }

    pub fn clear_current_item(&self) {
        self.state.lock().current_item = None;
    }

    /// What listeners should see right now: the live display while a source
    /// is connected, the auto DJ item otherwise.
    pub fn now_playing_display(&self) -> String {
        let s = self.state.lock();
        if s.live_active {
            s.live_name.clone()
        } else {
            s.now_playing.clone()
        }
    }

    // ---- scheduler / catalog ----------------------------------------------

    pub fn next_item(&self) -> Option<MediaItem> {
        let mut s = self.state.lock();
        let StationState { catalog, scheduler, .. } = &mut *s;
        scheduler.next(catalog)
    }

    pub fn set_playback_mode(&self, mode: PlaybackMode) {
        let mut s = self.state.lock();
        s.scheduler.set_mode(mode);
        s.scheduler.clear_play_queue();
    }

    pub fn set_intervals(&self, jingle_interval: u32, ad_interval: u32) {
        self.state.lock().scheduler.set_intervals(jingle_interval, ad_interval);
    }

    pub fn rescan(&self, kind: MediaKind) {
        self.state.lock().catalog.rescan(kind);
    }

    pub fn rescan_all(&self) {
        self.state.lock().catalog.rescan_all();
    }

    pub fn save_order(&self, kind: MediaKind, ordered: &[String]) -> Result<()> {
        self.state.lock().catalog.save_order(kind, ordered)
    }

    pub fn catalog_snapshot(&self) -> Catalog {
        self.state.lock().catalog.clone()
    }

    pub fn song_count(&self) -> usize {
        self.state.lock().catalog.songs.len()
    }

    // ---- settings / credentials -------------------------------------------

    pub fn radio_name(&self) -> String {
        self.state.lock().settings.radio_name.clone()
    }

    pub fn set_radio_name(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock();
        s.settings.radio_name = name.to_string();
        s.settings.save(&config::SETTINGS_FILE)
    }

    /// Empty fields keep the previous value, so an admin can rename a user
    /// without re-entering the password.
    pub fn set_live_credentials(&self, user: &str, password: &str) -> Result<()> {
        let mut s = self.state.lock();
        if !user.is_empty() {
            s.settings.live_user = user.to_string();
        }
        if !password.is_empty() {
            s.settings.live_password = password.to_string();
        }
        s.settings.save(&config::SETTINGS_FILE)
    }

    pub fn set_admin_credentials(&self, user: &str, password: &str) -> Result<()> {
        let mut s = self.state.lock();
        if !user.is_empty() {
            s.settings.admin_user = user.to_string();
        }
        if !password.is_empty() {
            s.settings.admin_password = password.to_string();
        }
        s.settings.save(&config::SETTINGS_FILE)
    }

    pub fn verify_live_credentials(&self, user: &str, password: &str) -> bool {
        let s = self.state.lock();
        constant_time_pair_eq(&s.settings.live_user, &s.settings.live_password, user, password)
    }

    pub fn verify_admin_credentials(&self, user: &str, password: &str) -> bool {
        let s = self.state.lock();
        constant_time_pair_eq(&s.settings.admin_user, &s.settings.admin_password, user, password)
    }

    // ---- listener registry (fan-out) --------------------------------------

    /// Registers a new listener sink and returns its bounded receiving end.
    pub fn attach_listener(&self) -> (Uuid, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(config::LISTENER_SINK_CAPACITY);
        let id = Uuid::new_v4();
        self.listeners.insert(id, tx);
        log::info!("Listener {} connected (total: {})", short_id(&id), self.listeners.len());
        (id, rx)
    }

    pub fn detach_listener(&self, id: &Uuid) {
        if self.listeners.remove(id).is_some() {
            log::info!("Listener {} disconnected (remaining: {})", short_id(id), self.listeners.len());
        }
    }

    /// Non-blocking fan-out: a full sink drops this chunk for that listener
    /// only; a closed sink is evicted. Never blocks the broadcaster.
    pub fn distribute(&self, chunk: &Bytes) {
        let mut closed: Vec<Uuid> = Vec::new();
        for entry in self.listeners.iter() {
            match entry.value().try_send(chunk.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::debug!("Listener {} backlog full, chunk dropped", short_id(entry.key()));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(*entry.key());
                }
            }
        }
        for id in closed {
            self.detach_listener(&id);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ---- status ------------------------------------------------------------

    /// Public status document served at `/status`.
    pub fn status(&self) -> serde_json::Value {
        let s = self.state.lock();
        let display = if s.live_active { s.live_name.clone() } else { s.now_playing.clone() };
        json!({
            "radio_name": s.settings.radio_name,
            "now_playing_display": display,
            "current_cover_url": s.cover_url,
            "is_playing": s.is_playing,
            "live": s.live_active,
            "listeners": self.listeners.len(),
            "server_time": chrono::Local::now().to_rfc3339(),
        })
    }

    /// Full status for the admin surface, including scheduler settings and
    /// the next-up indicator.
    pub fn admin_status(&self) -> serde_json::Value {
        let s = self.state.lock();
        let display = if s.live_active { s.live_name.clone() } else { s.now_playing.clone() };
        let next_item = if s.live_active { None } else { s.scheduler.peek(&s.catalog) };
        let current_item = if s.live_active {
            json!({ "type": "live", "filename": s.live_name })
        } else {
            serde_json::to_value(&s.current_item).unwrap_or(serde_json::Value::Null)
        };
        json!({
            "radio_name": s.settings.radio_name,
            "live_user": s.settings.live_user,
            "admin_user": s.settings.admin_user,
            "is_playing": s.is_playing,
            "live": s.live_active,
            "listeners": self.listeners.len(),
            "current_item": current_item,
            "now_playing_display": display,
            "next_item": next_item,
            "playback_mode": s.scheduler.mode.as_str(),
            "jingle_interval": s.scheduler.jingle_interval,
            "ad_interval": s.scheduler.ad_interval,
            "current_cover_url": s.cover_url,
        })
    }
}

/// Compares a credential pair without short-circuiting, so timing reveals
/// nothing about which half matched.
fn constant_time_pair_eq(expected_user: &str, expected_pass: &str, user: &str, pass: &str) -> bool {
    let user_ok = expected_user.as_bytes().ct_eq(user.as_bytes());
    let pass_ok = expected_pass.as_bytes().ct_eq(pass.as_bytes());
    bool::from(user_ok & pass_ok)
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> Arc<RadioStation> {
        RadioStation::new(Settings::default())
    }

    #[test]
    fn test_constant_time_pair_eq() {
        assert!(constant_time_pair_eq("dj", "secret", "dj", "secret"));
        assert!(!constant_time_pair_eq("dj", "secret", "dj", "wrong"));
        assert!(!constant_time_pair_eq("dj", "secret", "wrong", "secret"));
        assert!(!constant_time_pair_eq("dj", "secret", "", ""));
        // Length mismatch is a plain rejection, not a panic.
        assert!(!constant_time_pair_eq("dj", "secret", "dj", "secret-but-longer"));
    }

    #[test]
    fn test_live_flag_transitions() {
        let station = station();
        assert!(!station.live_active());

        station.go_live();
        assert!(station.live_active());
        // Going live resets the display to the waiting placeholder.
        assert_eq!(station.now_playing_display(), LIVE_WAITING);

        station.end_live();
        assert!(!station.live_active());
    }

    #[test]
    fn test_live_metadata_only_applies_while_live() {
        let station = station();
        assert!(!station.update_live_metadata("Hello+World%21"));

        station.go_live();
        assert!(station.update_live_metadata("Hello+World!"));
        assert_eq!(station.now_playing_display(), "Hello World!");
    }

    #[test]
    fn test_now_playing_prefixes_non_songs() {
        let station = station();
        station.set_current_item(&MediaItem::new(MediaKind::Jingle, "station_id.mp3"));
        assert_eq!(station.now_playing_display(), "(JINGLE) station id");

        station.set_current_item(&MediaItem::new(MediaKind::Song, "night_drive.mp3"));
        assert_eq!(station.now_playing_display(), "night drive");
    }

    #[test]
    fn test_distribute_drops_for_full_sink_only() {
        let station = station();
        let (_slow_id, mut slow_rx) = station.attach_listener();
        let (_fast_id, mut fast_rx) = station.attach_listener();

        // Fill every sink past capacity; the slow listener never drains.
        let chunk = Bytes::from_static(b"frame");
        for _ in 0..config::LISTENER_SINK_CAPACITY + 32 {
            station.distribute(&chunk);
        }

        // Both listeners stay attached; the slow one simply lost the excess.
        assert_eq!(station.listener_count(), 2);
        let mut slow_received = 0;
        while slow_rx.try_recv().is_ok() {
            slow_received += 1;
        }
        assert_eq!(slow_received, config::LISTENER_SINK_CAPACITY);

        // The fast listener drains and keeps receiving at full rate.
        let mut fast_received = 0;
        while fast_rx.try_recv().is_ok() {
            fast_received += 1;
        }
        assert_eq!(fast_received, config::LISTENER_SINK_CAPACITY);
        station.distribute(&chunk);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn test_distribute_evicts_closed_sinks() {
        let station = station();
        let (_id, rx) = station.attach_listener();
        assert_eq!(station.listener_count(), 1);

        drop(rx);
        station.distribute(&Bytes::from_static(b"frame"));
        assert_eq!(station.listener_count(), 0);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let station = station();
        let (id, _rx) = station.attach_listener();
        station.detach_listener(&id);
        station.detach_listener(&id);
        assert_eq!(station.listener_count(), 0);
    }

    #[test]
    fn test_status_contains_public_fields() {
        let station = station();
        let status = station.status();
        assert_eq!(status["radio_name"], "Radiocast");
        assert!(status.get("now_playing_display").is_some());
        assert!(status.get("current_cover_url").is_some());
        // Credentials never appear in the public document.
        assert!(status.get("live_password").is_none());
        assert!(status.get("admin_user").is_none());
    }

    #[test]
    fn test_source_receivers_taken_once() {
        let station = station();
        let _receivers = station.take_source_receivers();
        assert!(station.receivers.lock().is_none());
    }

    #[test]
    fn test_credential_update_keeps_blank_fields() {
        let station = station();
        let _ = station.set_live_credentials("dj_night", "");
        assert!(station.verify_live_credentials("dj_night", "12345"));
        let _ = station.set_live_credentials("", "s3cret");
        assert!(station.verify_live_credentials("dj_night", "s3cret"));
    }
}
