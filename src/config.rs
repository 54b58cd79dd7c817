// src/config.rs - Station configuration: tuning constants and the persisted settings record

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::Result;

lazy_static! {
    // Base directory
    pub static ref BASE_DIR: PathBuf = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // Content directories, one per media kind
    pub static ref MUSIC_DIR: PathBuf = BASE_DIR.join("music");
    pub static ref JINGLES_DIR: PathBuf = BASE_DIR.join("jingles");
    pub static ref ADS_DIR: PathBuf = BASE_DIR.join("ads");

    // Persisted state (settings record + per-kind order files)
    pub static ref CONFIG_DIR: PathBuf = BASE_DIR.join("config");
    pub static ref SETTINGS_FILE: PathBuf = CONFIG_DIR.join("settings.json");
}

// Server configuration
pub const DEFAULT_PORT: u16 = 8000;
pub const HOST: &str = "0.0.0.0";

// Chunk handoff between tasks - 4KB chunks match the transcoder read size
pub const CHUNK_SIZE: usize = 4096;

// Channel capacities. The source channels stay small so a source switch
// flushes in well under a second; listener sinks are deeper so a short
// network stall does not immediately cost frames.
pub const AUTODJ_CHANNEL_CAPACITY: usize = 128;
pub const LIVE_CHANNEL_CAPACITY: usize = 128;
pub const LISTENER_SINK_CAPACITY: usize = 512;

// Broadcaster receive timeouts
pub const LIVE_RECV_TIMEOUT_MS: u64 = 500;
pub const AUTODJ_RECV_TIMEOUT_MS: u64 = 1000;

// Consecutive live receive timeouts before the single "source lagging" notice
pub const LIVE_LAG_NOTICE_TICKS: u32 = 10;

// Auto DJ pacing
pub const IDLE_RETRY_SECS: u64 = 5;       // empty catalog backoff
pub const PAUSED_TICK_MS: u64 = 250;      // silence cadence while paused or live

// Live ingest protocol limits
pub const INGEST_HEADER_TIMEOUT_SECS: u64 = 10;
pub const INGEST_MAX_HEADER_BYTES: usize = 8192;

// Protocol dispatcher sniffing window
pub const SNIFF_MAX_BYTES: usize = 2048;
pub const SNIFF_TIMEOUT_SECS: u64 = 5;

// Catalog housekeeping
pub const EMPTY_CATALOG_RESCAN_SECS: u64 = 30;
pub const WATCHER_DEBOUNCE_SECS: u64 = 2;

// Target MP3 wire format: 44.1kHz stereo 128kbps CBR
pub const FFMPEG_SAMPLE_RATE: &str = "44100";
pub const FFMPEG_CHANNELS: &str = "2";
pub const FFMPEG_BITRATE: &str = "128k";

// A complete silent MPEG-1 Layer III frame header, zero padded to one chunk.
// Keeps client decoders fed across pauses, gaps and source switches.
pub static SILENT_FRAME: [u8; CHUNK_SIZE] = silent_frame();

const fn silent_frame() -> [u8; CHUNK_SIZE] {
    let mut frame = [0u8; CHUNK_SIZE];
    frame[0] = 0xFF;
    frame[1] = 0xFB;
    frame[2] = 0x90;
    frame[3] = 0x44;
    frame
}

/// Path of the external MP3 encoder. Overridable for hosts where ffmpeg
/// is not on PATH.
pub fn ffmpeg_path() -> String {
    env::var("RADIOCAST_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Creates the content and config directories. Safe to call on every start.
pub fn ensure_directories() -> Result<()> {
    for dir in [&*MUSIC_DIR, &*JINGLES_DIR, &*ADS_DIR, &*CONFIG_DIR] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// The persisted settings record: station identity plus the two credential
/// pairs (admin gates the control surface, live gates source ingest).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub radio_name: String,
    pub live_user: String,
    pub live_password: String,
    pub admin_user: String,
    pub admin_password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            radio_name: "Radiocast".to_string(),
            live_user: "dj_live".to_string(),
            live_password: "12345".to_string(),
            admin_user: "admin".to_string(),
            admin_password: "12345".to_string(),
        }
    }
}

impl Settings {
    /// Loads the settings file, writing a fresh one with defaults when it is
    /// missing or unreadable.
    pub fn load_or_create(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Settings file {} is invalid ({}), recreating with defaults", path.display(), e);
                    let settings = Self::default();
                    if let Err(e) = settings.save(path) {
                        log::error!("Failed to write settings file: {}", e);
                    }
                    settings
                }
            },
            Err(_) => {
                log::info!("Settings file {} not found, creating with defaults", path.display());
                let settings = Self::default();
                if let Err(e) = settings.save(path) {
                    log::error!("Failed to write settings file: {}", e);
                }
                settings
            }
        }
    }

    /// Persists the record as pretty JSON. Credentials live in this file, so
    /// it is created owner-readable only.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut file = open_private(path)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Opens the settings file for writing without ever leaving it readable to
/// other users: the 0600 mode is set at creation time, not after.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies to newly created files; tighten a pre-existing one
    // before any new content lands in it.
    let mut perms = file.metadata()?.permissions();
    perms.set_mode(0o600);
    file.set_permissions(perms)?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
