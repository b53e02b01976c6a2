/// Shuffle selection engine
///
/// Chooses the next wallpaper index so the sequence feels random while
/// avoiding recently-shown images and perceptually similar back-to-back
/// pairs, with a soft bonus for images already decoded in the cache.
///
/// This is a pure function of the passed-in state plus the RNG: it
/// mutates nothing, so the preload scheduler can run it repeatedly to
/// predict likely next picks without side effects. A history reset is
/// signalled through the outcome and applied by the caller.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::config::ShuffleConfig;
use crate::state::data::{ConnectionQuality, ShuffleHistoryEntry, WallpaperImage};

/// File-size reference for the slow-connection bandwidth penalty
const BANDWIDTH_REFERENCE_BYTES: f64 = 50.0 * 1024.0 * 1024.0;
/// Penalty applied to candidates too similar to the current image
const COLOR_PENALTY: f32 = 0.3;
/// Every candidate keeps at least this weight so it stays reachable
const MIN_WEIGHT: f32 = 0.01;
/// Temporal boost cap for images shown long ago
const MAX_TEMPORAL_FACTOR: f32 = 2.0;

/// Everything the selection reads, borrowed from the engine
pub struct SelectionContext<'a> {
    pub images: &'a [WallpaperImage],
    pub history: &'a [ShuffleHistoryEntry],
    pub current_index: Option<usize>,
    /// Image ids the preload scheduler currently holds decoded
    pub preloaded: &'a HashSet<u64>,
    pub quality: ConnectionQuality,
    pub now: DateTime<Utc>,
    pub cycle_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub index: usize,
    /// True when exclusion emptied the candidate set and the caller
    /// must clear the history (liveness guarantee for tiny catalogs)
    pub reset_history: bool,
}

/// Pick the next image index
pub fn select_next(
    ctx: &SelectionContext<'_>,
    cfg: &ShuffleConfig,
    rng: &mut impl Rng,
) -> SelectionOutcome {
    if ctx.images.len() <= 1 {
        return SelectionOutcome {
            index: 0,
            reset_history: false,
        };
    }

    let excluded = recently_shown_ids(ctx, cfg);
    let candidates: Vec<usize> = (0..ctx.images.len())
        .filter(|i| !excluded.contains(&ctx.images[*i].id))
        .collect();

    if candidates.is_empty() {
        // Full reset: every image has been shown too recently, fall
        // back to uniform-random so tiny catalogs keep rotating
        return SelectionOutcome {
            index: rng.gen_range(0..ctx.images.len()),
            reset_history: true,
        };
    }

    let weights = candidate_weights(ctx, cfg, &candidates);
    SelectionOutcome {
        index: roulette(&weights, rng),
        reset_history: false,
    }
}

/// Ids shown after the recent cutoff (now − history_size × cycle)
fn recently_shown_ids(ctx: &SelectionContext<'_>, cfg: &ShuffleConfig) -> HashSet<u64> {
    let window_ms = cfg.history_size as i64 * ctx.cycle_duration_ms as i64;
    let cutoff = ctx.now - Duration::milliseconds(window_ms);
    ctx.history
        .iter()
        .filter(|entry| entry.timestamp > cutoff)
        .map(|entry| entry.image_id)
        .collect()
}

/// Weight every candidate, stable in enumeration order
fn candidate_weights(
    ctx: &SelectionContext<'_>,
    cfg: &ShuffleConfig,
    candidates: &[usize],
) -> Vec<(usize, f32)> {
    let current_color = ctx
        .current_index
        .and_then(|i| ctx.images.get(i))
        .and_then(|image| image.dominant_color);

    candidates
        .iter()
        .map(|&index| {
            let image = &ctx.images[index];
            let mut weight = 1.0f32;

            // Temporal factor: the longer ago an image was shown, the
            // more likely it becomes, capped at 2×
            if cfg.temporal_weighting {
                if let Some(last_shown) = last_shown_at(ctx.history, image.id) {
                    let since_ms = (ctx.now - last_shown).num_milliseconds().max(0) as f32;
                    let cycles = since_ms / ctx.cycle_duration_ms.max(1) as f32;
                    weight *= (0.5 + cycles).min(MAX_TEMPORAL_FACTOR);
                }
            }

            // Color-distance penalty against the image on screen
            if let (Some(current), Some(candidate)) = (current_color, image.dominant_color) {
                if current.distance(candidate) < cfg.color_similarity_threshold {
                    weight *= COLOR_PENALTY;
                }
            }

            // Cache bonus: already decoded for the predicted slot
            if ctx.preloaded.contains(&image.id) {
                weight *= cfg.cache_bonus;
            }

            // Bandwidth penalty: large files are demoted on slow links
            if ctx.quality == ConnectionQuality::Slow {
                let ratio = image.size_bytes as f64 / BANDWIDTH_REFERENCE_BYTES;
                weight *= (1.0 - ratio as f32).clamp(0.1, 1.0);
            }

            (index, weight.max(MIN_WEIGHT))
        })
        .collect()
}

fn last_shown_at(history: &[ShuffleHistoryEntry], image_id: u64) -> Option<DateTime<Utc>> {
    history
        .iter()
        .rev()
        .find(|entry| entry.image_id == image_id)
        .map(|entry| entry.timestamp)
}

/// Cumulative-weight roulette. Ties resolve in enumeration order.
fn roulette(weights: &[(usize, f32)], rng: &mut impl Rng) -> usize {
    let total: f32 = weights.iter().map(|(_, w)| w).sum();
    let pick = rng.gen_range(0.0..total);

    let mut cumulative = 0.0f32;
    for &(index, weight) in weights {
        cumulative += weight;
        if pick < cumulative {
            return index;
        }
    }
    // Floating-point edge: fall through to the last candidate
    weights.last().map(|(index, _)| *index).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::color::Rgb;

    fn image(id: u64, color: Option<&str>, size_bytes: u64) -> WallpaperImage {
        WallpaperImage {
            id,
            filename: format!("img_{id}.jpg"),
            path: format!("themes/test/img_{id}.jpg"),
            width: 3840,
            height: 2160,
            aspect_ratio: 16.0 / 9.0,
            size_bytes,
            modified_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            dominant_color: color.and_then(Rgb::from_hex),
            is_loaded: false,
            is_preloaded: false,
            load_priority: 0,
            error_count: 0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ctx<'a>(
        images: &'a [WallpaperImage],
        history: &'a [ShuffleHistoryEntry],
        current_index: Option<usize>,
        preloaded: &'a HashSet<u64>,
        quality: ConnectionQuality,
    ) -> SelectionContext<'a> {
        SelectionContext {
            images,
            history,
            current_index,
            preloaded,
            quality,
            now: now(),
            cycle_duration_ms: 30_000,
        }
    }

    fn shown(id: u64, secs_ago: i64) -> ShuffleHistoryEntry {
        ShuffleHistoryEntry {
            image_id: id,
            timestamp: now() - Duration::seconds(secs_ago),
            color_distance: 0.0,
        }
    }

    #[test]
    fn test_single_image_theme_always_returns_zero() {
        let images = vec![image(1, None, 1000)];
        let preloaded = HashSet::new();
        let c = ctx(&images, &[], Some(0), &preloaded, ConnectionQuality::Fast);
        let mut rng = SmallRng::seed_from_u64(1);

        let outcome = select_next(&c, &ShuffleConfig::default(), &mut rng);
        assert_eq!(outcome.index, 0);
        assert!(!outcome.reset_history);
    }

    #[test]
    fn test_recently_shown_images_are_never_repeated() {
        let images: Vec<_> = (0..6).map(|id| image(id, None, 1000)).collect();
        let history: Vec<_> = (0..5).map(|id| shown(id, 10 * (id as i64 + 1))).collect();
        let preloaded = HashSet::new();
        let c = ctx(
            &images,
            &history,
            Some(4),
            &preloaded,
            ConnectionQuality::Fast,
        );
        let mut rng = SmallRng::seed_from_u64(2);

        // Ids 0–4 are inside the window; only 5 remains eligible
        for _ in 0..200 {
            let outcome = select_next(&c, &ShuffleConfig::default(), &mut rng);
            assert_eq!(outcome.index, 5);
            assert!(!outcome.reset_history);
        }
    }

    #[test]
    fn test_exhausted_candidates_trigger_history_reset() {
        let images = vec![image(0, None, 1000), image(1, None, 1000)];
        let history = vec![shown(0, 5), shown(1, 3)];
        let preloaded = HashSet::new();
        let c = ctx(
            &images,
            &history,
            Some(1),
            &preloaded,
            ConnectionQuality::Fast,
        );
        let mut rng = SmallRng::seed_from_u64(3);

        let outcome = select_next(&c, &ShuffleConfig::default(), &mut rng);
        assert!(outcome.reset_history);
        assert!(outcome.index < 2);
    }

    #[test]
    fn test_weighted_selection_frequency_matches_weights() {
        let weights = vec![(0usize, 10.0f32), (1usize, 1.0f32)];
        let mut rng = SmallRng::seed_from_u64(4);

        let trials = 10_000;
        let favored = (0..trials)
            .filter(|_| roulette(&weights, &mut rng) == 0)
            .count();

        let expected = trials as f64 * 10.0 / 11.0;
        let deviation = (favored as f64 - expected).abs() / expected;
        assert!(
            deviation < 0.05,
            "favored {favored}/{trials}, expected ≈{expected}"
        );
    }

    #[test]
    fn test_temporal_factor_boosts_older_images_and_caps_at_two() {
        let images = vec![image(0, None, 1000), image(1, None, 1000)];
        // Weighted directly (no exclusion applies below), very different ages
        let history = vec![shown(0, 10), shown(1, 100_000)];
        let preloaded = HashSet::new();
        let c = ctx(&images, &history, None, &preloaded, ConnectionQuality::Fast);

        let weights = candidate_weights(&c, &ShuffleConfig::default(), &[0, 1]);
        let recent = weights[0].1;
        let ancient = weights[1].1;
        assert!(ancient > recent);
        assert!((ancient - MAX_TEMPORAL_FACTOR).abs() < 1e-6);
    }

    #[test]
    fn test_similar_colors_are_penalized() {
        // Showing A (#204060); C (#1f3f5f) is nearly identical, B is not
        let images = vec![
            image(1, Some("#204060"), 1000),
            image(2, Some("#ffeecc"), 1000),
            image(3, Some("#1f3f5f"), 1000),
        ];
        let preloaded = HashSet::new();
        let c = ctx(&images, &[], Some(0), &preloaded, ConnectionQuality::Fast);

        let weights = candidate_weights(&c, &ShuffleConfig::default(), &[1, 2]);
        let b_weight = weights[0].1;
        let c_weight = weights[1].1;
        assert!((c_weight - b_weight * COLOR_PENALTY).abs() < 1e-6);

        // Over many selections B shows up far more often than C
        let mut rng = SmallRng::seed_from_u64(5);
        let mut counts = [0usize; 4];
        for _ in 0..3000 {
            let outcome = select_next(&c, &ShuffleConfig::default(), &mut rng);
            counts[outcome.index] += 1;
        }
        assert!(counts[1] > counts[2] * 2);
    }

    #[test]
    fn test_preloaded_images_get_the_cache_bonus() {
        let images = vec![image(0, None, 1000), image(1, None, 1000)];
        let preloaded: HashSet<u64> = [1].into_iter().collect();
        let c = ctx(&images, &[], None, &preloaded, ConnectionQuality::Fast);

        let weights = candidate_weights(&c, &ShuffleConfig::default(), &[0, 1]);
        assert!((weights[1].1 - weights[0].1 * 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_large_files_are_demoted_on_slow_connections() {
        let small = image(0, None, 1024 * 1024);
        let huge = image(1, None, 200 * 1024 * 1024);
        let images = vec![small, huge];
        let preloaded = HashSet::new();
        let c = ctx(&images, &[], None, &preloaded, ConnectionQuality::Slow);

        let weights = candidate_weights(&c, &ShuffleConfig::default(), &[0, 1]);
        // The oversized file bottoms out at the 0.1 floor
        assert!((weights[1].1 - 0.1).abs() < 1e-6);
        assert!(weights[0].1 > 0.9);

        // On fast connections no penalty applies
        let c_fast = ctx(&images, &[], None, &preloaded, ConnectionQuality::Fast);
        let fast_weights = candidate_weights(&c_fast, &ShuffleConfig::default(), &[0, 1]);
        assert_eq!(fast_weights[0].1, fast_weights[1].1);
    }

    #[test]
    fn test_selection_does_not_mutate_inputs() {
        let images = vec![image(0, None, 1000), image(1, None, 1000)];
        let history = vec![shown(0, 400)];
        let history_before = history.clone();
        let preloaded = HashSet::new();
        let c = ctx(
            &images,
            &history,
            Some(0),
            &preloaded,
            ConnectionQuality::Fast,
        );
        let mut rng = SmallRng::seed_from_u64(6);

        for _ in 0..100 {
            let _ = select_next(&c, &ShuffleConfig::default(), &mut rng);
        }
        assert_eq!(history, history_before);
    }
}
