// tactus/src/sampling/model.rs
//
// Per-user confidence predictor.
//
// A small linear model over context features that predicts the next
// attempt's fused confidence (as a fraction of 100). Weights are an explicit,
// versioned value; `update` is pure and returns the next version.

use serde::{Deserialize, Serialize};

use crate::events::{BehaviorState, DeviceType, SamplingContext};

pub const FEATURES: usize = 8;

/// Neutral prior: predicts 0.7 until the first update.
const PRIOR_BIAS: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub version: u64,
    pub bias:    f64,
    pub weights: [f64; FEATURES],
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self { version: 0, bias: PRIOR_BIAS, weights: [0.0; FEATURES] }
    }
}

impl ModelWeights {
    /// Predicted confidence in [0,1].
    pub fn predict(&self, features: &[f64; FEATURES]) -> f64 {
        let dot: f64 = self.weights.iter().zip(features).map(|(w, x)| w * x).sum();
        (self.bias + dot).clamp(0.0, 1.0)
    }
}

/// One gradient step on squared error. `error` is predicted − observed.
pub fn update(weights: &ModelWeights, features: &[f64; FEATURES], error: f64, rate: f64) -> ModelWeights {
    let step = rate * error;
    let mut next = weights.weights;
    for (w, x) in next.iter_mut().zip(features) {
        *w -= step * x;
    }
    ModelWeights {
        version: weights.version + 1,
        bias:    weights.bias - step,
        weights: next,
    }
}

/// Map a context onto the model's input space, every feature in [0,1].
pub fn context_features(ctx: &SamplingContext) -> [f64; FEATURES] {
    let behavior = match ctx.behavior_state {
        BehaviorState::Focused    => 1.0,
        BehaviorState::Normal     => 0.75,
        BehaviorState::Rushed     => 0.5,
        BehaviorState::Fatigued   => 0.25,
        BehaviorState::Distracted => 0.0,
    };
    let device = match ctx.device_type {
        DeviceType::Desktop => 1.0,
        DeviceType::Tablet  => 0.5,
        DeviceType::Mobile  => 0.0,
    };
    let hour = f64::from(ctx.time_of_day.min(23)) * std::f64::consts::TAU / 24.0;
    [
        ctx.network_stability.clamp(0.0, 1.0),
        ctx.location_consistency.clamp(0.0, 1.0),
        (f64::from(ctx.recent_failures) / 5.0).min(1.0),
        ctx.last_confidence.map(|c| (c / 100.0).clamp(0.0, 1.0)).unwrap_or(0.5),
        behavior,
        device,
        (hour.sin() + 1.0) / 2.0,
        (hour.cos() + 1.0) / 2.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_pure_and_versioned() {
        let w0 = ModelWeights::default();
        let x  = context_features(&SamplingContext::default());
        let w1 = update(&w0, &x, 0.2, 0.1);
        assert_eq!(w0, ModelWeights::default());
        assert_eq!(w1.version, 1);
        assert_ne!(w1, w0);
    }

    #[test]
    fn repeated_updates_move_prediction_toward_target() {
        let x = context_features(&SamplingContext::default());
        let target = 0.95;
        let mut w = ModelWeights::default();
        let before = (w.predict(&x) - target).abs();
        for _ in 0..50 {
            let err = w.predict(&x) - target;
            w = update(&w, &x, err, 0.1);
        }
        assert!((w.predict(&x) - target).abs() < before);
        assert_eq!(w.version, 50);
    }

    #[test]
    fn features_are_bounded() {
        let ctx = SamplingContext { recent_failures: 40, last_confidence: Some(250.0), ..Default::default() };
        assert!(context_features(&ctx).iter().all(|f| (0.0..=1.0).contains(f)));
    }
}
