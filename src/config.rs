/// Engine configuration
///
/// All tunables the engine consults live in one explicit struct with
/// documented defaults, instead of loosely-typed passthrough objects.
/// Transition preferences are split out because they are part of the
/// persisted snapshot.

use serde::{Deserialize, Serialize};

use crate::engine::transition::TransitionKind;

/// Shuffle parameters for the selection engine
#[derive(Debug, Clone, PartialEq)]
pub struct ShuffleConfig {
    /// Number of recently-shown images to avoid repeating (5)
    /// - the history ring itself keeps 3× this many entries
    pub history_size: usize,

    /// How similar two dominant colors may be before the candidate is
    /// penalized (0.7)
    /// - distances below this multiply the weight by 0.3
    pub color_similarity_threshold: f32,

    /// Whether images shown longer ago get a likelihood boost (true)
    /// - boost is min(2.0, 0.5 + time_since_shown / cycle_duration)
    pub temporal_weighting: bool,

    /// Weight multiplier for images already decoded in the cache (1.5)
    pub cache_bonus: f32,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            history_size: 5,
            color_similarity_threshold: 0.7,
            temporal_weighting: true,
            cache_bonus: 1.5,
        }
    }
}

/// Transition preferences (persisted across sessions)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionPrefs {
    /// User-selected effect; may be overridden under poor performance
    pub kind: TransitionKind,

    /// Effect duration in milliseconds (800)
    pub duration_ms: u64,

    /// Whether GPU-accelerated "special" effects are permitted (true)
    pub special_effects: bool,
}

impl Default for TransitionPrefs {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            duration_ms: 800,
            special_effects: true,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub shuffle: ShuffleConfig,
    pub transition: TransitionPrefs,

    /// Hard byte budget for decoded images (150 MB)
    pub max_cache_size: u64,

    /// Wallpaper rotation interval in milliseconds (30 000)
    pub cycle_duration_ms: u64,

    /// Whether the engine rotates wallpapers on its cycle (true)
    pub auto_transition: bool,

    /// Whether image quality degrades on constrained networks (true)
    pub adaptive_quality: bool,

    /// How many predicted-next images to keep preloaded (5)
    pub preload_count: usize,

    /// Selection simulations per prediction pass (100)
    pub prediction_samples: usize,

    /// Target display size in CSS pixels, before DPR scaling (1920×1080)
    pub viewport: (u32, u32),

    /// Device pixel ratio; capped at 2.0 when resolving image URLs (1.0)
    pub device_pixel_ratio: f32,

    /// Minimum gap between snapshot writes in milliseconds (500)
    pub snapshot_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shuffle: ShuffleConfig::default(),
            transition: TransitionPrefs::default(),
            max_cache_size: 150 * 1024 * 1024,
            cycle_duration_ms: 30_000,
            auto_transition: true,
            adaptive_quality: true,
            preload_count: 5,
            prediction_samples: 100,
            viewport: (1920, 1080),
            device_pixel_ratio: 1.0,
            snapshot_debounce_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.shuffle.history_size, 5);
        assert_eq!(config.shuffle.color_similarity_threshold, 0.7);
        assert_eq!(config.max_cache_size, 150 * 1024 * 1024);
        assert_eq!(config.preload_count, 5);
        assert_eq!(config.prediction_samples, 100);
    }

    #[test]
    fn test_transition_prefs_serialization() {
        let prefs = TransitionPrefs {
            kind: TransitionKind::ZoomWipe,
            duration_ms: 1200,
            special_effects: false,
        };
        let json = serde_json::to_string(&prefs).unwrap();
        let restored: TransitionPrefs = serde_json::from_str(&json).unwrap();
        assert_eq!(prefs, restored);
    }
}
