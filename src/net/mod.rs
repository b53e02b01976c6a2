/// Network module
///
/// This module handles all traffic to the delivery service:
/// - Catalog client trait + HTTP implementation (catalog.rs)
/// - Optimized image requests, fetch and decode (images.rs)
/// - Capped-retry wrapper with exponential backoff (retry.rs)

pub mod catalog;
pub mod images;
pub mod retry;
