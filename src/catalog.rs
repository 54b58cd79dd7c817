// src/catalog.rs - Media catalog: three ordered lists of on-disk MP3 files

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::Result;

/// The three kinds of program content. Each kind owns a content directory
/// and a persisted order file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Song,
    Jingle,
    Ad,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Song, MediaKind::Jingle, MediaKind::Ad];

    pub fn dir(&self) -> &'static Path {
        match self {
            MediaKind::Song => &config::MUSIC_DIR,
            MediaKind::Jingle => &config::JINGLES_DIR,
            MediaKind::Ad => &config::ADS_DIR,
        }
    }

    pub fn order_file(&self) -> PathBuf {
        config::CONFIG_DIR.join(match self {
            MediaKind::Song => "songs_order.txt",
            MediaKind::Jingle => "jingles_order.txt",
            MediaKind::Ad => "ads_order.txt",
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Song => "song",
            MediaKind::Jingle => "jingle",
            MediaKind::Ad => "ad",
        }
    }

    /// The list name used by the admin surface ("songs", "jingles", "ads").
    pub fn from_list_name(name: &str) -> Option<MediaKind> {
        match name {
            "songs" => Some(MediaKind::Song),
            "jingles" => Some(MediaKind::Jingle),
            "ads" => Some(MediaKind::Ad),
            _ => None,
        }
    }
}

/// One playable file, identified by kind plus filename relative to the
/// kind's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub filename: String,
}

impl MediaItem {
    pub fn new(kind: MediaKind, filename: impl Into<String>) -> Self {
        Self { kind, filename: filename.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.kind.dir().join(&self.filename)
    }

    /// Human-readable name: extension stripped, underscores become spaces.
    pub fn display_name(&self) -> String {
        prettify(&self.filename)
    }
}

/// Strips the extension and replaces underscores with spaces.
pub fn prettify(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    stem.replace('_', " ")
}

/// The three master lists. Mutations rebuild whole lists; readers take
/// cheap clones via `snapshot`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub songs: Vec<String>,
    pub jingles: Vec<String>,
    pub ads: Vec<String>,
}

impl Catalog {
    /// Scans all three content directories and merges each with its
    /// persisted order.
    pub fn load() -> Self {
        let mut catalog = Catalog::default();
        catalog.rescan_all();
        catalog
    }

    pub fn list(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::Song => &self.songs,
            MediaKind::Jingle => &self.jingles,
            MediaKind::Ad => &self.ads,
        }
    }

    fn list_mut(&mut self, kind: MediaKind) -> &mut Vec<String> {
        match kind {
            MediaKind::Song => &mut self.songs,
            MediaKind::Jingle => &mut self.jingles,
            MediaKind::Ad => &mut self.ads,
        }
    }

    /// Re-enumerates one kind's directory and merges with the persisted
    /// order: persisted names still on disk keep their position, newly
    /// discovered files are appended in enumeration order.
    pub fn rescan(&mut self, kind: MediaKind) {
        let available = scan_directory(kind.dir());
        let merged = merge_order(&load_order(&kind.order_file()), available);
        log::debug!("Rescanned {} list: {} entries", kind.label(), merged.len());
        *self.list_mut(kind) = merged;
    }

    pub fn rescan_all(&mut self) {
        for kind in MediaKind::ALL {
            self.rescan(kind);
        }
        log::info!(
            "Master lists reloaded: {} songs, {} jingles, {} ads",
            self.songs.len(),
            self.jingles.len(),
            self.ads.len()
        );
    }

    /// Persists a custom order for one kind and rescans it so the in-memory
    /// list reflects both the new order and the current directory contents.
    pub fn save_order(&mut self, kind: MediaKind, ordered: &[String]) -> Result<()> {
        let mut content = String::new();
        for name in ordered {
            content.push_str(name);
            content.push('\n');
        }
        fs::write(kind.order_file(), content)?;
        self.rescan(kind);
        Ok(())
    }
}

/// Lists `.mp3` files (case-insensitive) in a directory, in enumeration
/// order. A missing directory yields an empty list.
fn scan_directory(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("mp3"))
                .unwrap_or(false)
        })
        .collect()
}

/// Reads the order file as one filename per line. A missing file means no
/// custom order.
fn load_order(order_file: &Path) -> Vec<String> {
    match fs::read_to_string(order_file) {
        Ok(content) => content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Persisted order first (dropping names no longer on disk), then any new
/// files in enumeration order.
fn merge_order(ordered: &[String], available: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = ordered
        .iter()
        .filter(|name| available.contains(name))
        .cloned()
        .collect();
    for name in available {
        if !merged.contains(&name) {
            merged.push(name);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prettify_strips_extension_and_underscores() {
        assert_eq!(prettify("late_night_drive.mp3"), "late night drive");
        assert_eq!(prettify("Track01.MP3"), "Track01");
        assert_eq!(prettify("no_extension"), "no extension");
    }

    #[test]
    fn test_merge_keeps_persisted_order_and_appends_new() {
        // Directory holds {b, a, c}; persisted order says [c, a, z].
        let available = vec!["b.mp3".to_string(), "a.mp3".to_string(), "c.mp3".to_string()];
        let ordered = vec!["c.mp3".to_string(), "a.mp3".to_string(), "z.mp3".to_string()];

        let merged = merge_order(&ordered, available);
        assert_eq!(merged, vec!["c.mp3", "a.mp3", "b.mp3"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let ordered = vec!["c.mp3".to_string(), "a.mp3".to_string()];
        let available = vec!["b.mp3".to_string(), "a.mp3".to_string(), "c.mp3".to_string()];

        let once = merge_order(&ordered, available.clone());
        let twice = merge_order(&once, available);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_with_no_persisted_order() {
        let merged = merge_order(&[], vec!["x.mp3".to_string(), "y.mp3".to_string()]);
        assert_eq!(merged, vec!["x.mp3", "y.mp3"]);
    }

    #[test]
    fn test_kind_list_names() {
        assert_eq!(MediaKind::from_list_name("songs"), Some(MediaKind::Song));
        assert_eq!(MediaKind::from_list_name("jingles"), Some(MediaKind::Jingle));
        assert_eq!(MediaKind::from_list_name("ads"), Some(MediaKind::Ad));
        assert_eq!(MediaKind::from_list_name("podcasts"), None);
    }

    #[test]
    fn test_item_display_name() {
        let item = MediaItem::new(MediaKind::Jingle, "station_id_sweep.mp3");
        assert_eq!(item.display_name(), "station id sweep");
    }

    mod on_disk {
        use super::*;
        use std::fs;

        // These tests exercise the directory scan against a real temp tree.
        struct TempTree {
            root: PathBuf,
        }

        impl TempTree {
            fn new() -> Self {
                let root = std::env::temp_dir().join(format!("radiocast-catalog-{}", uuid::Uuid::new_v4()));
                fs::create_dir_all(&root).unwrap();
                Self { root }
            }
        }

        impl Drop for TempTree {
            fn drop(&mut self) {
                let _ = fs::remove_dir_all(&self.root);
            }
        }

        #[test]
        fn test_scan_filters_non_mp3() {
            let tree = TempTree::new();
            fs::write(tree.root.join("a.mp3"), b"").unwrap();
            fs::write(tree.root.join("b.MP3"), b"").unwrap();
            fs::write(tree.root.join("cover.jpg"), b"").unwrap();
            fs::write(tree.root.join("notes.txt"), b"").unwrap();

            let mut found = scan_directory(&tree.root);
            found.sort();
            assert_eq!(found, vec!["a.mp3", "b.MP3"]);
        }

        #[test]
        fn test_scan_missing_directory_is_empty() {
            let tree = TempTree::new();
            let missing = tree.root.join("nope");
            assert!(scan_directory(&missing).is_empty());
        }

        #[test]
        fn test_load_order_tolerates_blank_lines() {
            let tree = TempTree::new();
            let order_file = tree.root.join("order.txt");
            fs::write(&order_file, "b.mp3\n\n  a.mp3  \n").unwrap();

            assert_eq!(load_order(&order_file), vec!["b.mp3", "a.mp3"]);
        }
    }
}
