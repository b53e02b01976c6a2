/// Catalog service client
///
/// The engine never talks HTTP directly; everything goes through the
/// `CatalogClient` trait so tests can inject deterministic fakes. The
/// production implementation wraps a shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::net::images::ImageRequest;
use crate::state::data::{Category, WallpaperTheme};

/// Payload of `GET /themes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeCatalog {
    pub themes: Vec<WallpaperTheme>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Injected delivery-service collaborator
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// `GET /themes`: available themes plus categories
    async fn fetch_catalog(&self) -> Result<ThemeCatalog, EngineError>;

    /// `GET /themes/{id}`: one theme with its full image list
    async fn fetch_theme(&self, id: &str) -> Result<WallpaperTheme, EngineError>;

    /// `GET /themes/default`: fallback theme when the catalog is down
    async fn fetch_default_theme(&self) -> Result<WallpaperTheme, EngineError>;

    /// `GET /image/{id}?...`: encoded image bytes; the engine never
    /// inspects them beyond handing them to the decoder
    async fn fetch_image(&self, request: &ImageRequest) -> Result<Vec<u8>, EngineError>;

    /// Fetch a small reference resource for the empirical connection
    /// probe; only the elapsed wall time matters
    async fn fetch_probe(&self) -> Result<(), EngineError>;
}

/// Production client backed by reqwest
pub struct HttpCatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("wallshift/0.1")
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_catalog(&self) -> Result<ThemeCatalog, EngineError> {
        let catalog = self
            .http
            .get(self.url("/themes"))
            .send()
            .await?
            .error_for_status()?
            .json::<ThemeCatalog>()
            .await?;
        Ok(catalog)
    }

    async fn fetch_theme(&self, id: &str) -> Result<WallpaperTheme, EngineError> {
        let theme = self
            .http
            .get(self.url(&format!("/themes/{id}")))
            .send()
            .await?
            .error_for_status()?
            .json::<WallpaperTheme>()
            .await?;
        Ok(theme)
    }

    async fn fetch_default_theme(&self) -> Result<WallpaperTheme, EngineError> {
        let theme = self
            .http
            .get(self.url("/themes/default"))
            .send()
            .await?
            .error_for_status()?
            .json::<WallpaperTheme>()
            .await?;
        Ok(theme)
    }

    async fn fetch_image(&self, request: &ImageRequest) -> Result<Vec<u8>, EngineError> {
        let response = self
            .http
            .get(self.url(&format!("/image/{}", request.image_id)))
            .query(&[
                ("w", request.width.to_string()),
                ("h", request.height.to_string()),
                ("fit", "cover".to_string()),
                ("quality", request.quality.to_string()),
                ("format", request.format.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::Status(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_probe(&self) -> Result<(), EngineError> {
        // Headers only; the probe measures latency, not throughput
        self.http
            .head(self.url("/themes"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
