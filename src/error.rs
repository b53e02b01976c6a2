/// Engine error taxonomy
///
/// Failures are contained at the smallest possible scope: catalog-level
/// errors fall back to the default theme, per-image errors feed the
/// error-count/auto-advance policy, and cache errors just skip caching.
/// None of these unwind past the engine boundary.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog or theme metadata could not be fetched (after retries)
    #[error("catalog request failed: {0}")]
    Catalog(String),

    /// Transport-level HTTP failure
    #[error("network request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The delivery service answered with a non-success status
    #[error("delivery service returned status {0}")]
    Status(u16),

    /// Image bytes arrived but could not be decoded
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// A fetch or decode exceeded its connection-quality timeout.
    /// Treated identically to a network failure for that image.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Snapshot database failure
    #[error("snapshot store error: {0}")]
    Snapshot(#[from] rusqlite::Error),

    /// Filesystem failure (data directory, local import)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or catalog payload (de)serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An individual image load failed for a non-transport reason
    #[error("image load failed: {0}")]
    ImageLoad(String),

    /// A theme id was requested that the catalog does not contain
    #[error("theme not found: {0}")]
    UnknownTheme(String),

    /// A background decode task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}
