// Library exports for the radiocast crate
// This allows integration tests to access the public API

pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod scheduler;
pub mod services;
pub mod station;
pub mod stream;

// Re-export commonly used types
pub use catalog::{Catalog, MediaItem, MediaKind};
pub use config::Settings;
pub use error::{RadioError, Result};
pub use scheduler::{PlaybackMode, Scheduler};
pub use station::RadioStation;
