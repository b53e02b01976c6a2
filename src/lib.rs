/// wallshift: adaptive wallpaper delivery engine
///
/// Decides which wallpaper to show next, keeps a bounded in-memory
/// cache of decoded images, predicts and preloads upcoming images under
/// connection-aware concurrency limits, and adapts image quality and
/// transition complexity to measured performance. Rendering, UI and
/// palette extraction are external collaborators reached through the
/// typed interfaces exposed here.
///
/// The host constructs a [`WallpaperEngine`] from injected
/// collaborators, drives it through commands (`next`, `previous`,
/// `switch_theme`, setters), reads its projections, and subscribes to
/// the event channel for transition and error notifications.

pub mod clock;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod state;

pub use clock::{Clock, SystemClock};
pub use color::Rgb;
pub use config::{EngineConfig, ShuffleConfig, TransitionPrefs};
pub use engine::probe::{EffectiveType, GpuProbe, NetworkSignal};
pub use engine::transition::{Easing, TransitionDescriptor, TransitionKind};
pub use engine::{Collaborators, EngineEvent, WallpaperEngine};
pub use error::EngineError;
pub use net::catalog::{CatalogClient, HttpCatalogClient, ThemeCatalog};
pub use net::images::{DecodedImage, ImageRequest};
pub use state::data::{
    Category, ConnectionQuality, LoadingPhase, LoadingState, ShuffleHistoryEntry, WallpaperImage,
    WallpaperTheme,
};
pub use state::metrics::PerformanceMetrics;
pub use state::snapshot::{EngineSnapshot, SnapshotStore};
