/// Transition orchestration (adaptation only)
///
/// The engine never renders an effect; it picks a descriptor sized to
/// measured performance and hands it to the external renderer. Rules in
/// priority order: degraded loads or a slow connection force the
/// simplest effect, a missing GPU restricts to effects without special
/// passes, otherwise the user's selection is honored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TransitionPrefs;
use crate::state::data::ConnectionQuality;

/// Visual effects the external renderer knows how to animate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Plain crossfade; the simplest effect and the degraded fallback
    Fade,
    Slide,
    ZoomWipe,
    /// Particle-based dissolve; needs a GPU compute pass
    ParticleDissolve,
}

/// Easing applied over the effect duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

/// Duration + easing + GPU-requirement metadata for one effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionDescriptor {
    pub kind: TransitionKind,
    pub duration: Duration,
    pub easing: Easing,
    pub requires_gpu: bool,
}

impl TransitionKind {
    fn default_easing(self) -> Easing {
        match self {
            TransitionKind::Fade => Easing::Linear,
            TransitionKind::Slide => Easing::EaseInOut,
            TransitionKind::ZoomWipe => Easing::EaseOut,
            TransitionKind::ParticleDissolve => Easing::EaseIn,
        }
    }

    fn requires_gpu(self) -> bool {
        matches!(self, TransitionKind::ParticleDissolve)
    }

    fn descriptor(self, duration_ms: u64) -> TransitionDescriptor {
        TransitionDescriptor {
            kind: self,
            duration: Duration::from_millis(duration_ms),
            easing: self.default_easing(),
            requires_gpu: self.requires_gpu(),
        }
    }
}

/// All effects the engine can hand out, for the UI's effect picker
pub fn available_effects(prefs: &TransitionPrefs) -> Vec<TransitionDescriptor> {
    [
        TransitionKind::Fade,
        TransitionKind::Slide,
        TransitionKind::ZoomWipe,
        TransitionKind::ParticleDissolve,
    ]
    .into_iter()
    .map(|kind| kind.descriptor(prefs.duration_ms))
    .collect()
}

/// Pick the effect for the next transition
pub fn choose_effect(
    prefs: &TransitionPrefs,
    load_degraded: bool,
    quality: ConnectionQuality,
    gpu_accelerated: bool,
) -> TransitionDescriptor {
    // Rule 1: poor measured performance overrides everything
    if load_degraded || quality == ConnectionQuality::Slow {
        return TransitionKind::Fade.descriptor(prefs.duration_ms);
    }

    let desired = prefs.kind.descriptor(prefs.duration_ms);

    // Rule 2: special effects need both the capability and the opt-in
    if desired.requires_gpu && !(gpu_accelerated && prefs.special_effects) {
        return TransitionKind::Fade.descriptor(prefs.duration_ms);
    }

    // Rule 3: honor the user selection
    desired
}
