/// Shared data structures for the engine state
///
/// These structs represent the theme/image graph that flows between the
/// catalog service, the delivery engine and the host UI. The engine is
/// the sole mutator; records are replaced whole rather than patched in
/// place, so any reader between event-loop turns sees a consistent state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// A single wallpaper image inside a theme
///
/// Created when a theme's catalog is fetched; load/error flags are
/// updated as delivery events occur; never deleted except on theme
/// reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallpaperImage {
    /// Unique id within the delivery service
    pub id: u64,
    /// Filename only (e.g., "aurora_04.jpg")
    pub filename: String,
    /// Storage path on the delivery service
    pub path: String,
    /// Natural width in pixels
    pub width: u32,
    /// Natural height in pixels
    pub height: u32,
    /// Natural aspect ratio (width / height)
    pub aspect_ratio: f32,
    /// Encoded file size in bytes
    pub size_bytes: u64,
    /// Last-modified time reported by the service
    pub modified_at: DateTime<Utc>,
    /// Precomputed dominant color, if the catalog carries one
    #[serde(default)]
    pub dominant_color: Option<Rgb>,
    /// Whether a decoded copy has been shown at least once
    #[serde(default)]
    pub is_loaded: bool,
    /// Whether the preload scheduler currently holds a decoded copy
    #[serde(default)]
    pub is_preloaded: bool,
    /// Prediction rank from the last preload pass (0 = most likely)
    #[serde(default)]
    pub load_priority: u32,
    /// Consecutive failed load attempts; ≥ 3 triggers auto-advance
    #[serde(default)]
    pub error_count: u32,
}

impl WallpaperImage {
    /// Rebuild the record with updated load flags (immutable-update style)
    pub fn with_flags(&self, is_loaded: bool, is_preloaded: bool) -> Self {
        Self {
            is_loaded,
            is_preloaded,
            ..self.clone()
        }
    }

    /// Rebuild the record with one more failed attempt recorded
    pub fn with_error(&self) -> Self {
        Self {
            error_count: self.error_count + 1,
            ..self.clone()
        }
    }
}

/// A named, ordered collection of wallpaper images treated as one
/// rotation set. One theme is "current" at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallpaperTheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub images: Vec<WallpaperImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Updated whenever the theme is selected; drives catalog ordering
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub is_default: bool,
}

/// A catalog grouping for themes (surfaced to the UI, never interpreted
/// by the engine itself)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// One record of a shown wallpaper
///
/// The history is an append-only ring bounded to 3 × history_size,
/// used both to avoid near-term repeats and to reconstruct temporal
/// weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShuffleHistoryEntry {
    pub image_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Normalized color distance from the previously shown image
    pub color_distance: f32,
}

/// Coarse network classification driving every adaptive decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    Slow,
    Medium,
    Fast,
}

impl ConnectionQuality {
    /// Concurrent preload slots for this connection tier
    pub fn preload_concurrency(self) -> usize {
        match self {
            ConnectionQuality::Slow => 1,
            ConnectionQuality::Medium => 2,
            ConnectionQuality::Fast => 4,
        }
    }

    /// Pause between preload batches
    pub fn batch_pause(self) -> Duration {
        match self {
            ConnectionQuality::Slow => Duration::from_millis(2000),
            _ => Duration::from_millis(500),
        }
    }

    /// Per-load fetch+decode budget
    pub fn load_timeout(self) -> Duration {
        match self {
            ConnectionQuality::Slow => Duration::from_secs(30),
            ConnectionQuality::Medium => Duration::from_secs(15),
            ConnectionQuality::Fast => Duration::from_secs(5),
        }
    }
}

/// Where the engine currently is in its startup/load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingPhase {
    Initializing,
    Themes,
    Images,
    Preloading,
    Complete,
}

/// Transient loading progress surfaced to the UI; never persisted and
/// reset to Complete on reload
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingState {
    pub phase: LoadingPhase,
    /// 0–100
    pub progress: u8,
    pub current_task: String,
    pub estimated_remaining: Option<Duration>,
}

impl LoadingState {
    pub fn idle() -> Self {
        Self {
            phase: LoadingPhase::Complete,
            progress: 100,
            current_task: String::new(),
            estimated_remaining: None,
        }
    }

    pub fn at(phase: LoadingPhase, progress: u8, task: impl Into<String>) -> Self {
        Self {
            phase,
            progress: progress.min(100),
            current_task: task.into(),
            estimated_remaining: None,
        }
    }
}

/// Push a history entry, keeping the ring bounded to 3 × history_size
pub fn push_history(
    history: &mut Vec<ShuffleHistoryEntry>,
    entry: ShuffleHistoryEntry,
    history_size: usize,
) {
    history.push(entry);
    let cap = history_size.saturating_mul(3).max(1);
    if history.len() > cap {
        let overflow = history.len() - cap;
        history.drain(..overflow);
    }
}
