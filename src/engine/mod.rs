/// Adaptive wallpaper delivery engine
///
/// This module wires the subsystems together:
/// - Connection & performance probe (probe.rs)
/// - Weighted shuffle selection (shuffle.rs)
/// - Bounded decoded-image cache (cache.rs)
/// - Predictive preload scheduler (preload.rs)
/// - Performance-adaptive transition descriptors (transition.rs)
///
/// The engine is an explicit object built from injected collaborators
/// (catalog client, clock, GPU probe, network signal, snapshot store),
/// mutated only through its commands, and observed through read-only
/// projections plus a typed event channel. All state changes happen on
/// the owning task; preload batches are the only internal concurrency.

pub mod cache;
pub mod preload;
pub mod probe;
pub mod shuffle;
pub mod transition;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use walkdir::WalkDir;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::engine::cache::CacheManager;
use crate::engine::preload::{predict_next_ids, PreloadScheduler};
use crate::engine::probe::{GpuProbe, NetworkSignal};
use crate::engine::shuffle::{select_next, SelectionContext};
use crate::engine::transition::{
    available_effects, choose_effect, TransitionDescriptor, TransitionKind,
};
use crate::error::EngineError;
use crate::net::catalog::CatalogClient;
use crate::net::images::{fetch_and_decode, optimized_request, DecodedImage};
use crate::net::retry::RetryPolicy;
use crate::state::data::{
    push_history, Category, ConnectionQuality, LoadingPhase, LoadingState, ShuffleHistoryEntry,
    WallpaperImage, WallpaperTheme,
};
use crate::state::metrics::PerformanceMetrics;
use crate::state::snapshot::{EngineSnapshot, SnapshotStore};

/// Delay before auto-advancing past a permanently-broken asset
const AUTO_ADVANCE_DELAY: Duration = Duration::from_secs(1);
/// Failed attempts after which an image is considered broken
const IMAGE_ERROR_THRESHOLD: u32 = 3;

/// Typed hand-off to the external renderer and UI, replacing dynamic
/// event dispatch with a channel the host subscribes to
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The renderer should animate to `image` using `effect`
    Transition {
        image: WallpaperImage,
        decoded: Arc<DecodedImage>,
        effect: TransitionDescriptor,
        special_effects: bool,
    },
    /// User-facing failure notification (toast material)
    Error { message: String },
}

/// Everything injected into the engine at construction time
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogClient>,
    pub clock: Arc<dyn Clock>,
    pub gpu: Arc<dyn GpuProbe>,
    pub network: Option<Arc<dyn NetworkSignal>>,
    pub snapshots: Option<SnapshotStore>,
    /// Fixed RNG seed for deterministic selection in tests
    pub rng_seed: Option<u64>,
}

/// Outcome of one attempt to put an image on screen
enum ShowResult {
    Shown,
    /// Load failed but the image is under its error budget; the last
    /// good wallpaper stays up
    FailedStay,
    /// Load failed and the image hit its error budget; advance
    FailedAdvance,
}

pub struct WallpaperEngine {
    config: EngineConfig,
    catalog: Arc<dyn CatalogClient>,
    clock: Arc<dyn Clock>,
    network: Option<Arc<dyn NetworkSignal>>,
    snapshots: Option<SnapshotStore>,
    rng: SmallRng,

    themes: Vec<WallpaperTheme>,
    categories: Vec<Category>,
    current_theme_id: Option<String>,
    current_index: usize,
    /// False until the first image actually lands on screen
    current_shown: bool,
    history: Vec<ShuffleHistoryEntry>,
    cache: CacheManager,
    scheduler: PreloadScheduler,
    metrics: PerformanceMetrics,
    loading: LoadingState,
    quality: ConnectionQuality,
    gpu_accelerated: bool,
    error_state: Option<String>,
    retry: RetryPolicy,
    events: Option<UnboundedSender<EngineEvent>>,
    last_interaction: DateTime<Utc>,
    last_transition_at: Option<DateTime<Utc>>,
}

impl WallpaperEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let rng = match collaborators.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let gpu_accelerated = collaborators.gpu.has_acceleration();
        let now = collaborators.clock.now();

        Self {
            cache: CacheManager::new(config.max_cache_size),
            config,
            catalog: collaborators.catalog,
            clock: collaborators.clock,
            network: collaborators.network,
            snapshots: collaborators.snapshots,
            rng,
            themes: Vec::new(),
            categories: Vec::new(),
            current_theme_id: None,
            current_index: 0,
            current_shown: false,
            history: Vec::new(),
            scheduler: PreloadScheduler::new(),
            metrics: PerformanceMetrics::default(),
            loading: LoadingState::idle(),
            quality: ConnectionQuality::Medium,
            gpu_accelerated,
            error_state: None,
            retry: RetryPolicy::new(),
            events: None,
            last_interaction: now,
            last_transition_at: None,
        }
    }

    /// Open the event channel; the previous receiver (if any) stops
    /// getting events
    pub fn subscribe(&mut self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    // ---------- Projections ----------

    pub fn themes(&self) -> &[WallpaperTheme] {
        &self.themes
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn current_theme(&self) -> Option<&WallpaperTheme> {
        find_theme(&self.themes, self.current_theme_id.as_deref())
    }

    pub fn current_image(&self) -> Option<&WallpaperImage> {
        if !self.current_shown {
            return None;
        }
        self.current_theme()
            .and_then(|theme| theme.images.get(self.current_index))
    }

    pub fn current_image_index(&self) -> Option<usize> {
        self.current_shown.then_some(self.current_index)
    }

    pub fn loading_state(&self) -> &LoadingState {
        &self.loading
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.quality
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_state.as_deref()
    }

    pub fn available_transitions(&self) -> Vec<TransitionDescriptor> {
        available_effects(&self.config.transition)
    }

    pub fn performance_stats(&mut self) -> PerformanceMetrics {
        self.metrics.record_hit_ratio(self.cache.hit_ratio());
        self.metrics
    }

    // ---------- Lifecycle ----------

    /// Probe the connection, load the catalog (with fallback), restore
    /// the persisted snapshot and show the first wallpaper
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.loading = LoadingState::at(LoadingPhase::Initializing, 0, "Starting engine");
        self.error_state = None;

        self.restore_snapshot();
        self.refresh_connection().await;
        self.load_theme_catalog().await?;
        self.activate_initial_theme().await
    }

    /// Clear a terminal catalog error and try again
    pub async fn retry_catalog(&mut self) -> Result<(), EngineError> {
        self.error_state = None;
        self.load_theme_catalog().await?;
        self.activate_initial_theme().await
    }

    /// Re-run the connection probe (startup runs it once; hosts may
    /// re-trigger after a connectivity change)
    pub async fn refresh_connection(&mut self) {
        let outcome = probe::probe_connection(self.network.as_deref(), &self.catalog).await;
        if let Some(quality) = outcome.quality {
            self.quality = quality;
        }
        if let Some(latency) = outcome.latency_ms {
            self.metrics.record_latency(latency);
        }
    }

    /// Flush any debounced snapshot; call on session end
    pub fn shutdown(&mut self) {
        let now = self.clock.now();
        if let Some(store) = &mut self.snapshots {
            if let Err(err) = store.flush(now) {
                warn!("snapshot flush failed: {err}");
            }
        }
    }

    // ---------- Commands ----------

    /// Advance to the next wallpaper
    pub async fn next(&mut self) -> Result<(), EngineError> {
        self.touch();
        self.show_with_auto_advance(None).await
    }

    /// Step back to the previously shown wallpaper
    pub async fn previous(&mut self) -> Result<(), EngineError> {
        self.touch();
        // The last history entry is the image on screen
        if self.history.len() < 2 {
            return Ok(());
        }
        self.history.pop();
        let Some(entry) = self.history.last() else {
            return Ok(());
        };
        let previous_id = entry.image_id;
        let Some(index) = self
            .current_theme()
            .and_then(|theme| theme.images.iter().position(|i| i.id == previous_id))
        else {
            return Ok(());
        };
        let _ = self.try_show(index, false).await;
        Ok(())
    }

    /// Switch to another theme; resets history and starts at its first
    /// image
    pub async fn switch_theme(&mut self, id: &str) -> Result<(), EngineError> {
        self.touch();
        self.load_theme(id, 0).await
    }

    /// Rotate if auto-transition is on and a full cycle has elapsed.
    /// The host drives this tick; the engine owns no background task.
    pub async fn maybe_auto_advance(&mut self) -> Result<(), EngineError> {
        if !self.config.auto_transition || self.error_state.is_some() {
            return Ok(());
        }
        let due = match self.last_transition_at {
            Some(at) => {
                (self.clock.now() - at).num_milliseconds() >= self.config.cycle_duration_ms as i64
            }
            None => true,
        };
        if due {
            self.show_with_auto_advance(None).await
        } else {
            Ok(())
        }
    }

    pub fn set_transition_kind(&mut self, kind: TransitionKind) {
        self.config.transition.kind = kind;
        self.touch_and_persist();
    }

    pub fn set_transition_duration(&mut self, duration_ms: u64) {
        self.config.transition.duration_ms = duration_ms;
        self.touch_and_persist();
    }

    pub fn set_special_effects(&mut self, enabled: bool) {
        self.config.transition.special_effects = enabled;
        self.touch_and_persist();
    }

    pub fn set_cycle_duration(&mut self, duration_ms: u64) {
        self.config.cycle_duration_ms = duration_ms;
        self.touch_and_persist();
    }

    pub fn set_auto_transition(&mut self, enabled: bool) {
        self.config.auto_transition = enabled;
        self.touch_and_persist();
    }

    pub fn set_adaptive_quality(&mut self, enabled: bool) {
        self.config.adaptive_quality = enabled;
        self.touch_and_persist();
    }

    /// Drop every decoded image and all preload marks
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.scheduler.clear();
        let ids: Vec<u64> = self
            .current_theme()
            .map(|theme| theme.images.iter().map(|i| i.id).collect())
            .unwrap_or_default();
        for id in ids {
            self.replace_image(id, |image| image.with_flags(image.is_loaded, false));
        }
        self.touch_and_persist();
    }

    /// Import local images into a theme by walking a folder
    pub async fn import_images(
        &mut self,
        theme_id: &str,
        folder: &Path,
    ) -> Result<usize, EngineError> {
        self.touch();
        let folder = folder.to_path_buf();
        let scanned = tokio::task::spawn_blocking(move || scan_image_folder(&folder))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?;

        let now = self.clock.now();
        let Some(theme) = self.themes.iter_mut().find(|t| t.id == theme_id) else {
            return Err(EngineError::UnknownTheme(theme_id.to_string()));
        };

        let mut next_id = theme.images.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let mut images = theme.images.clone();
        let added = scanned.len();
        for scan in scanned {
            images.push(WallpaperImage {
                id: next_id,
                filename: scan.filename,
                path: scan.path,
                width: scan.width,
                height: scan.height,
                aspect_ratio: scan.width as f32 / scan.height.max(1) as f32,
                size_bytes: scan.size_bytes,
                modified_at: scan.modified_at,
                dominant_color: None,
                is_loaded: false,
                is_preloaded: false,
                load_priority: 0,
                error_count: 0,
            });
            next_id += 1;
        }
        theme.images = images;
        theme.updated_at = now;

        info!("imported {added} images into theme {theme_id}");
        self.persist();
        Ok(added)
    }

    // ---------- Catalog & theme loading ----------

    async fn load_theme_catalog(&mut self) -> Result<(), EngineError> {
        self.loading = LoadingState::at(LoadingPhase::Themes, 10, "Loading theme catalog");

        let catalog_client = Arc::clone(&self.catalog);
        let fetched = self
            .retry
            .run("/themes", || {
                let client = Arc::clone(&catalog_client);
                async move { client.fetch_catalog().await }
            })
            .await;

        match fetched {
            Ok(catalog) => {
                let mut themes = catalog.themes;
                // Default theme first, then most-recently-used
                themes.sort_by(|a, b| {
                    b.is_default
                        .cmp(&a.is_default)
                        .then(b.last_used.cmp(&a.last_used))
                });
                self.themes = themes;
                self.categories = catalog.categories;
                info!("catalog loaded: {} themes", self.themes.len());
                Ok(())
            }
            Err(err) => {
                warn!("catalog fetch failed ({err}), falling back to the default theme");
                self.load_default_theme().await
            }
        }
    }

    async fn load_default_theme(&mut self) -> Result<(), EngineError> {
        let catalog_client = Arc::clone(&self.catalog);
        let fetched = self
            .retry
            .run("/themes/default", || {
                let client = Arc::clone(&catalog_client);
                async move { client.fetch_default_theme().await }
            })
            .await;

        match fetched {
            Ok(theme) => {
                self.themes = vec![theme];
                self.categories = Vec::new();
                Ok(())
            }
            Err(err) => {
                let message = format!("Wallpaper service unavailable: {err}");
                self.error_state = Some(message.clone());
                self.loading = LoadingState::idle();
                self.scheduler.clear();
                self.emit(EngineEvent::Error { message });
                Err(err)
            }
        }
    }

    async fn activate_initial_theme(&mut self) -> Result<(), EngineError> {
        let resume_index = self.current_index;
        let id = self
            .current_theme_id
            .clone()
            .filter(|id| self.themes.iter().any(|t| t.id == *id))
            .or_else(|| self.themes.first().map(|t| t.id.clone()));

        match id {
            Some(id) => self.load_theme(&id, resume_index).await,
            None => {
                let message = "Theme catalog is empty".to_string();
                self.error_state = Some(message.clone());
                self.loading = LoadingState::idle();
                self.emit(EngineEvent::Error {
                    message: message.clone(),
                });
                Err(EngineError::Catalog(message))
            }
        }
    }

    async fn load_theme(&mut self, id: &str, start_index: usize) -> Result<(), EngineError> {
        self.loading =
            LoadingState::at(LoadingPhase::Images, 40, format!("Loading theme \"{id}\""));

        let catalog_client = Arc::clone(&self.catalog);
        let theme_id = id.to_string();
        let fetched = self
            .retry
            .run(&format!("/themes/{id}"), || {
                let client = Arc::clone(&catalog_client);
                let theme_id = theme_id.clone();
                async move { client.fetch_theme(&theme_id).await }
            })
            .await;

        let mut theme = match fetched {
            Ok(theme) => theme,
            Err(err) => {
                // Contained at theme scope: the engine keeps whatever it
                // was showing before
                self.loading = LoadingState::idle();
                self.emit(EngineEvent::Error {
                    message: format!("Failed to load theme \"{id}\": {err}"),
                });
                return Err(err);
            }
        };

        theme.last_used = self.clock.now();
        self.replace_theme(theme.clone());
        self.current_theme_id = Some(theme.id.clone());
        self.history.clear();
        self.scheduler.clear();
        self.current_index = 0;
        self.current_shown = false;
        self.persist();

        let mut loading =
            LoadingState::at(LoadingPhase::Preloading, 70, "Preparing first wallpaper");
        if self.metrics.avg_load_ms > 0.0 {
            loading.estimated_remaining = Some(Duration::from_millis(self.metrics.avg_load_ms as u64));
        }
        self.loading = loading;
        let first = if start_index < theme.images.len() {
            start_index
        } else {
            0
        };
        let result = self.show_with_auto_advance(Some(first)).await;
        self.loading = LoadingState::idle();
        result
    }

    // ---------- Showing images ----------

    /// Show a forced index, or select one; on a broken image (error
    /// budget exhausted) wait a second and move on so the UI never
    /// sticks on a dead asset
    async fn show_with_auto_advance(
        &mut self,
        forced_index: Option<usize>,
    ) -> Result<(), EngineError> {
        if self.error_state.is_some() {
            return Ok(());
        }
        let image_count = self
            .current_theme()
            .map(|theme| theme.images.len())
            .unwrap_or(0);
        if image_count == 0 {
            return Ok(());
        }

        let mut forced = forced_index;
        let mut attempted: std::collections::HashSet<usize> = std::collections::HashSet::new();
        for _ in 0..image_count.max(1) {
            let index = match forced.take() {
                Some(index) => index,
                None => {
                    let mut pick = self.select_index();
                    if attempted.contains(&pick) {
                        // Don't re-roll onto an index that already failed
                        // this pass; take the first untried one instead
                        pick = (0..image_count)
                            .find(|candidate| !attempted.contains(candidate))
                            .unwrap_or(pick);
                    }
                    pick
                }
            };
            attempted.insert(index);
            match self.try_show(index, true).await {
                ShowResult::Shown | ShowResult::FailedStay => return Ok(()),
                ShowResult::FailedAdvance => {
                    tokio::time::sleep(AUTO_ADVANCE_DELAY).await;
                }
            }
        }
        Ok(())
    }

    fn select_index(&mut self) -> usize {
        let now = self.clock.now();
        let WallpaperEngine {
            themes,
            current_theme_id,
            history,
            scheduler,
            rng,
            config,
            quality,
            current_index,
            current_shown,
            ..
        } = self;

        let Some(theme) = find_theme(themes, current_theme_id.as_deref()) else {
            return 0;
        };
        let ctx = SelectionContext {
            images: &theme.images,
            history: history.as_slice(),
            current_index: current_shown.then_some(*current_index),
            preloaded: scheduler.preloaded_ids(),
            quality: *quality,
            now,
            cycle_duration_ms: config.cycle_duration_ms,
        };
        let outcome = select_next(&ctx, &config.shuffle, rng);
        if outcome.reset_history {
            self.history.clear();
        }
        outcome.index
    }

    async fn try_show(&mut self, index: usize, record_history: bool) -> ShowResult {
        let Some(image) = self
            .current_theme()
            .and_then(|theme| theme.images.get(index))
            .cloned()
        else {
            return ShowResult::FailedStay;
        };

        let degraded = self.metrics.is_load_degraded();
        let request = optimized_request(
            &image,
            self.config.viewport,
            self.config.device_pixel_ratio,
            self.quality,
            self.config.adaptive_quality,
            degraded,
        );
        let key = request.canonical_key();
        let now = self.clock.now();

        let decoded = match self.cache.get(&key, now) {
            Some(handle) => handle,
            None => {
                let started = std::time::Instant::now();
                match fetch_and_decode(
                    Arc::clone(&self.catalog),
                    request.clone(),
                    self.quality.load_timeout(),
                )
                .await
                {
                    Ok(decoded) => {
                        self.metrics
                            .record_load(started.elapsed().as_millis() as f64);
                        let handle = Arc::new(decoded);
                        self.cache.put(
                            key,
                            Arc::clone(&handle),
                            request.is_optimized(),
                            self.clock.now(),
                        );
                        handle
                    }
                    Err(err) => return self.record_image_failure(&image, err),
                }
            }
        };
        self.metrics.record_hit_ratio(self.cache.hit_ratio());

        // Color distance for the history entry, measured before the flip
        let color_distance = match (
            self.current_image().and_then(|i| i.dominant_color),
            image.dominant_color,
        ) {
            (Some(current), Some(next)) => current.distance(next),
            _ => 0.0,
        };

        let effect = choose_effect(
            &self.config.transition,
            degraded,
            self.quality,
            self.gpu_accelerated,
        );
        self.emit(EngineEvent::Transition {
            image: image.clone(),
            decoded,
            effect,
            special_effects: self.config.transition.special_effects,
        });

        // The image only becomes current after the effect's declared
        // duration, so displayed state and measured state never
        // disagree mid-transition
        tokio::time::sleep(effect.duration).await;
        self.metrics
            .record_transition(effect.duration.as_millis() as f64);

        self.current_index = index;
        self.current_shown = true;
        self.last_transition_at = Some(self.clock.now());
        self.replace_image(image.id, |img| {
            let mut shown = img.with_flags(true, img.is_preloaded);
            shown.error_count = 0;
            shown
        });
        if record_history {
            let entry = ShuffleHistoryEntry {
                image_id: image.id,
                timestamp: self.clock.now(),
                color_distance,
            };
            push_history(&mut self.history, entry, self.config.shuffle.history_size);
        }
        self.persist();

        self.refresh_preloads().await;
        ShowResult::Shown
    }

    fn record_image_failure(&mut self, image: &WallpaperImage, err: EngineError) -> ShowResult {
        let updated = image.with_error();
        let error_count = updated.error_count;
        self.replace_image(image.id, move |_| updated.clone());

        warn!(
            "wallpaper {} failed to load ({err}), failure {error_count}/{IMAGE_ERROR_THRESHOLD}",
            image.filename
        );
        self.emit(EngineEvent::Error {
            message: format!("Failed to load {}: {err}", image.filename),
        });

        if error_count >= IMAGE_ERROR_THRESHOLD {
            ShowResult::FailedAdvance
        } else {
            ShowResult::FailedStay
        }
    }

    // ---------- Preloading ----------

    /// Re-predict likely next picks and keep them decoded in the cache
    async fn refresh_preloads(&mut self) {
        if self.error_state.is_some() {
            return;
        }

        let now = self.clock.now();
        let predicted = {
            let WallpaperEngine {
                themes,
                current_theme_id,
                history,
                scheduler,
                rng,
                config,
                quality,
                current_index,
                current_shown,
                ..
            } = self;

            let Some(theme) = find_theme(themes, current_theme_id.as_deref()) else {
                return;
            };
            if theme.images.len() <= 1 {
                return;
            }
            let ctx = SelectionContext {
                images: &theme.images,
                history: history.as_slice(),
                current_index: current_shown.then_some(*current_index),
                preloaded: scheduler.preloaded_ids(),
                quality: *quality,
                now,
                cycle_duration_ms: config.cycle_duration_ms,
            };
            predict_next_ids(
                &ctx,
                &config.shuffle,
                config.prediction_samples,
                config.preload_count,
                rng,
            )
        };

        let dropped = self.scheduler.sync_predictions(predicted.clone());
        for id in dropped {
            self.replace_image(id, |image| image.with_flags(image.is_loaded, false));
        }

        let degraded = self.metrics.is_load_degraded();
        let mut loads = Vec::new();
        for (rank, id) in predicted.iter().enumerate() {
            self.replace_image(*id, move |image| {
                let mut ranked = image.clone();
                ranked.load_priority = rank as u32;
                ranked
            });
            let Some(image) = self
                .current_theme()
                .and_then(|theme| theme.images.iter().find(|i| i.id == *id))
                .cloned()
            else {
                continue;
            };
            let request = optimized_request(
                &image,
                self.config.viewport,
                self.config.device_pixel_ratio,
                self.quality,
                self.config.adaptive_quality,
                degraded,
            );
            if self.cache.contains(&request.canonical_key()) {
                self.scheduler.mark_preloaded(*id);
                self.replace_image(*id, |image| image.with_flags(image.is_loaded, true));
            } else {
                loads.push((*id, request));
            }
        }

        if loads.is_empty() {
            return;
        }

        let client = Arc::clone(&self.catalog);
        let clock = Arc::clone(&self.clock);
        let quality = self.quality;
        let completed = {
            let WallpaperEngine {
                scheduler, cache, ..
            } = self;
            scheduler
                .process(loads, quality, client, cache, &clock)
                .await
        };
        for id in completed {
            self.replace_image(id, |image| image.with_flags(image.is_loaded, true));
        }
        self.metrics.record_hit_ratio(self.cache.hit_ratio());
    }

    // ---------- State plumbing ----------

    fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn touch(&mut self) {
        self.last_interaction = self.clock.now();
    }

    fn touch_and_persist(&mut self) {
        self.touch();
        self.persist();
    }

    /// Replace a whole image record in the current theme
    fn replace_image(&mut self, image_id: u64, f: impl Fn(&WallpaperImage) -> WallpaperImage) {
        let Some(theme_id) = self.current_theme_id.clone() else {
            return;
        };
        if let Some(theme) = self.themes.iter_mut().find(|t| t.id == theme_id) {
            theme.images = theme
                .images
                .iter()
                .map(|image| {
                    if image.id == image_id {
                        f(image)
                    } else {
                        image.clone()
                    }
                })
                .collect();
        }
    }

    /// Replace a whole theme record, preserving catalog order
    fn replace_theme(&mut self, theme: WallpaperTheme) {
        let mut replaced = false;
        let mut themes: Vec<WallpaperTheme> = self
            .themes
            .iter()
            .map(|existing| {
                if existing.id == theme.id {
                    replaced = true;
                    theme.clone()
                } else {
                    existing.clone()
                }
            })
            .collect();
        if !replaced {
            themes.push(theme);
        }
        self.themes = themes;
    }

    fn persist(&mut self) {
        let snapshot = EngineSnapshot {
            current_theme_id: self.current_theme_id.clone(),
            current_index: self.current_index,
            transition: self.config.transition,
            cycle_duration_ms: self.config.cycle_duration_ms,
            auto_transition: self.config.auto_transition,
            adaptive_quality: self.config.adaptive_quality,
            last_interaction: self.last_interaction,
            metrics: self.metrics,
        };
        let now = self.clock.now();
        if let Some(store) = &mut self.snapshots {
            if let Err(err) = store.save(snapshot, now) {
                warn!("snapshot write failed: {err}");
            }
        }
    }

    fn restore_snapshot(&mut self) {
        let Some(store) = &self.snapshots else {
            return;
        };
        match store.load() {
            Ok(Some(snapshot)) => {
                self.config.transition = snapshot.transition;
                self.config.cycle_duration_ms = snapshot.cycle_duration_ms;
                self.config.auto_transition = snapshot.auto_transition;
                self.config.adaptive_quality = snapshot.adaptive_quality;
                self.current_theme_id = snapshot.current_theme_id;
                self.current_index = snapshot.current_index;
                self.last_interaction = snapshot.last_interaction;
                self.metrics = snapshot.metrics;
                info!("restored engine snapshot");
            }
            Ok(None) => {}
            Err(err) => warn!("snapshot restore failed: {err}"),
        }
    }
}

fn find_theme<'a>(themes: &'a [WallpaperTheme], id: Option<&str>) -> Option<&'a WallpaperTheme> {
    let id = id?;
    themes.iter().find(|theme| theme.id == id)
}

struct ScannedImage {
    filename: String,
    path: String,
    width: u32,
    height: u32,
    size_bytes: u64,
    modified_at: DateTime<Utc>,
}

const IMPORT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Walk a folder and collect raster images with readable headers
fn scan_image_folder(folder: &Path) -> Vec<ScannedImage> {
    WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.path();
            let extension = path.extension()?.to_str()?.to_ascii_lowercase();
            if !IMPORT_EXTENSIONS.contains(&extension.as_str()) {
                return None;
            }
            let (width, height) = image::image_dimensions(path).ok()?;
            let metadata = entry.metadata().ok()?;
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            Some(ScannedImage {
                filename: entry.file_name().to_string_lossy().into_owned(),
                path: path.display().to_string(),
                width,
                height,
                size_bytes: metadata.len(),
                modified_at,
            })
        })
        .collect()
}
