/// Predictive preload scheduler
///
/// Keeps a short rolling window of likely-next images decoded in the
/// cache before they are needed. Prediction samples the selection
/// engine (which is pure, so sampling has no side effects); the batch
/// processor drains the ranked queue under a connection-derived
/// concurrency cap, pausing between batches so interactive loads are
/// never starved.
///
/// A failed preload is logged and dropped; the image simply loads
/// synchronously if it is actually selected later. Loads for a key
/// already in flight on the show path are not deduplicated here; the
/// worst case is one wasted duplicate fetch whose result overwrites an
/// identical cache entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};
use rand::Rng;
use tokio::task::JoinSet;

use crate::clock::Clock;
use crate::config::ShuffleConfig;
use crate::engine::cache::CacheManager;
use crate::engine::shuffle::{select_next, SelectionContext};
use crate::error::EngineError;
use crate::net::catalog::CatalogClient;
use crate::net::images::{fetch_and_decode, DecodedImage, ImageRequest};
use crate::state::data::ConnectionQuality;

/// Sample the selection engine and rank distinct picks by frequency.
/// Returns up to `count` image ids, most likely first, never including
/// the currently-shown image.
pub fn predict_next_ids(
    ctx: &SelectionContext<'_>,
    cfg: &ShuffleConfig,
    samples: usize,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<u64> {
    let current_id = ctx
        .current_index
        .and_then(|i| ctx.images.get(i))
        .map(|image| image.id);

    let mut frequency: HashMap<u64, usize> = HashMap::new();
    let mut order: Vec<u64> = Vec::new();

    for _ in 0..samples {
        let outcome = select_next(ctx, cfg, rng);
        let Some(image) = ctx.images.get(outcome.index) else {
            continue;
        };
        if Some(image.id) == current_id {
            continue;
        }
        if !frequency.contains_key(&image.id) {
            order.push(image.id);
        }
        *frequency.entry(image.id).or_insert(0) += 1;
    }

    // Rank by frequency, first-observed winning ties (stable)
    order.sort_by_key(|id| std::cmp::Reverse(frequency[id]));
    order.truncate(count);
    order
}

pub struct PreloadScheduler {
    /// Predicted-next image ids, most likely first
    predicted: Vec<u64>,
    /// Ids currently held decoded in the cache by this scheduler
    preloaded: HashSet<u64>,
    /// Guards against a second concurrent drain loop
    is_processing: bool,
}

impl PreloadScheduler {
    pub fn new() -> Self {
        Self {
            predicted: Vec::new(),
            preloaded: HashSet::new(),
            is_processing: false,
        }
    }

    pub fn predicted(&self) -> &[u64] {
        &self.predicted
    }

    pub fn is_preloaded(&self, image_id: u64) -> bool {
        self.preloaded.contains(&image_id)
    }

    pub fn preloaded_ids(&self) -> &HashSet<u64> {
        &self.preloaded
    }

    /// Replace the predicted set; preload marks for indices no longer
    /// predicted are dropped and returned so the caller can clear the
    /// corresponding image flags
    pub fn sync_predictions(&mut self, predicted: Vec<u64>) -> Vec<u64> {
        let keep: HashSet<u64> = predicted.iter().copied().collect();
        let dropped: Vec<u64> = self
            .preloaded
            .iter()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();
        for id in &dropped {
            self.preloaded.remove(id);
        }
        if !dropped.is_empty() {
            debug!("dropped {} stale preload marks", dropped.len());
        }
        self.predicted = predicted;
        dropped
    }

    /// Note that a predicted image is already decoded in the cache
    /// (e.g. it was shown recently); non-predicted ids are ignored
    pub fn mark_preloaded(&mut self, image_id: u64) {
        if self.predicted.contains(&image_id) {
            self.preloaded.insert(image_id);
        }
    }

    /// Drain the ranked queue of (image id, resolved request) pairs.
    /// Returns the ids that finished decoding and still matter.
    pub async fn process(
        &mut self,
        loads: Vec<(u64, ImageRequest)>,
        quality: ConnectionQuality,
        client: Arc<dyn CatalogClient>,
        cache: &mut CacheManager,
        clock: &Arc<dyn Clock>,
    ) -> Vec<u64> {
        if self.is_processing {
            debug!("preload drain already running, skipping");
            return Vec::new();
        }
        self.is_processing = true;

        let cap = quality.preload_concurrency();
        let budget = quality.load_timeout();
        let mut completed = Vec::new();

        for (batch, chunk) in loads.chunks(cap.max(1)).enumerate() {
            if batch > 0 {
                // Breathe between batches so interactive loads get through
                tokio::time::sleep(quality.batch_pause()).await;
            }

            let mut tasks: JoinSet<(u64, ImageRequest, Result<DecodedImage, EngineError>)> =
                JoinSet::new();
            for (image_id, request) in chunk.iter().cloned() {
                let client = Arc::clone(&client);
                tasks.spawn(async move {
                    let result = fetch_and_decode(client, request.clone(), budget).await;
                    (image_id, request, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((image_id, request, Ok(decoded))) => {
                        cache.put(
                            request.canonical_key(),
                            Arc::new(decoded),
                            request.is_optimized(),
                            clock.now(),
                        );
                        // Stale results are cached but not marked: a
                        // superseded prediction is simply ignored
                        if self.predicted.contains(&image_id) {
                            self.preloaded.insert(image_id);
                            completed.push(image_id);
                        }
                    }
                    Ok((image_id, _, Err(err))) => {
                        // Dropped silently; a later selection retries it
                        info!("preload failed for image {image_id}: {err}");
                    }
                    Err(err) => {
                        info!("preload task aborted: {err}");
                    }
                }
            }
        }

        self.is_processing = false;
        completed
    }

    pub fn clear(&mut self) {
        self.predicted.clear();
        self.preloaded.clear();
    }
}

impl Default for PreloadScheduler {
    fn default() -> Self {
        Self::new()
    }
}
