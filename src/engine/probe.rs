/// Connection & performance probe
///
/// Classifies the runtime into a coarse Slow/Medium/Fast tri-state that
/// drives every other component's budget decisions. Prefers a
/// runtime-reported effective network type; falls back to timing a
/// small reference fetch. Runs once at startup and on explicit
/// re-trigger; consumers always read the last-known classification and
/// are never blocked by a probe in flight.

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use crate::net::catalog::CatalogClient;
use crate::state::data::ConnectionQuality;

/// Effective network type as reported by the host runtime, when the
/// platform exposes one. Absence is valid and triggers the empirical
/// probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
    Slow2g,
    Cellular2g,
    Cellular3g,
    Cellular4g,
}

impl EffectiveType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "slow-2g" => Some(EffectiveType::Slow2g),
            "2g" => Some(EffectiveType::Cellular2g),
            "3g" => Some(EffectiveType::Cellular3g),
            "4g" => Some(EffectiveType::Cellular4g),
            _ => None,
        }
    }
}

/// Injected host signal for the reported network type
pub trait NetworkSignal: Send + Sync {
    fn effective_type(&self) -> Option<EffectiveType>;
}

/// Injected GPU capability signal: whether an accelerated rendering
/// context can be created. Consulted only by the transition gating rule.
pub trait GpuProbe: Send + Sync {
    fn has_acceleration(&self) -> bool;
}

/// Result of one probe pass. `quality: None` means the probe learned
/// nothing and the last-known classification stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub quality: Option<ConnectionQuality>,
    pub latency_ms: Option<u64>,
}

/// Map a reported effective type onto the tri-state
pub fn classify_effective_type(effective: EffectiveType) -> ConnectionQuality {
    match effective {
        EffectiveType::Slow2g | EffectiveType::Cellular2g => ConnectionQuality::Slow,
        EffectiveType::Cellular3g => ConnectionQuality::Medium,
        EffectiveType::Cellular4g => ConnectionQuality::Fast,
    }
}

/// Classify a measured reference-fetch latency
pub fn classify_latency(elapsed_ms: u64) -> ConnectionQuality {
    if elapsed_ms > 2000 {
        ConnectionQuality::Slow
    } else if elapsed_ms < 500 {
        ConnectionQuality::Fast
    } else {
        ConnectionQuality::Medium
    }
}

/// Run one probe pass: reported signal first, empirical timing second
pub async fn probe_connection(
    signal: Option<&dyn NetworkSignal>,
    client: &Arc<dyn CatalogClient>,
) -> ProbeOutcome {
    if let Some(effective) = signal.and_then(|s| s.effective_type()) {
        let quality = classify_effective_type(effective);
        info!("connection classified {quality:?} from reported type {effective:?}");
        return ProbeOutcome {
            quality: Some(quality),
            latency_ms: None,
        };
    }

    let started = Instant::now();
    match client.fetch_probe().await {
        Ok(()) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let quality = classify_latency(elapsed_ms);
            info!("connection classified {quality:?} from {elapsed_ms} ms probe");
            ProbeOutcome {
                quality: Some(quality),
                latency_ms: Some(elapsed_ms),
            }
        }
        Err(err) => {
            warn!("connection probe failed, keeping last classification: {err}");
            ProbeOutcome {
                quality: None,
                latency_ms: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_type_mapping() {
        assert_eq!(
            classify_effective_type(EffectiveType::Slow2g),
            ConnectionQuality::Slow
        );
        assert_eq!(
            classify_effective_type(EffectiveType::Cellular2g),
            ConnectionQuality::Slow
        );
        assert_eq!(
            classify_effective_type(EffectiveType::Cellular3g),
            ConnectionQuality::Medium
        );
        assert_eq!(
            classify_effective_type(EffectiveType::Cellular4g),
            ConnectionQuality::Fast
        );
    }

    #[test]
    fn test_latency_thresholds() {
        assert_eq!(classify_latency(2001), ConnectionQuality::Slow);
        assert_eq!(classify_latency(2000), ConnectionQuality::Medium);
        assert_eq!(classify_latency(500), ConnectionQuality::Medium);
        assert_eq!(classify_latency(499), ConnectionQuality::Fast);
        assert_eq!(classify_latency(0), ConnectionQuality::Fast);
    }

    #[test]
    fn test_unknown_effective_type_string_is_ignored() {
        assert_eq!(EffectiveType::parse("5g"), None);
        assert_eq!(EffectiveType::parse("4g"), Some(EffectiveType::Cellular4g));
        assert_eq!(EffectiveType::parse("slow-2g"), Some(EffectiveType::Slow2g));
    }
}
