// tactus/src/engine/fusion.rs
//
// Multi-modal score fusion and the success decision.
//
// Weighted (system of record):
//   w_k  = α·Reliability_k + β·Availability_k + γ·History_k + δ·Context_k
//          normalized so Σ w_k = 1            (α .35, β .25, γ .25, δ .15)
//   S_k  = modality confidence / 100
//   C    = Σ w_k·S_k
//   U    = sqrt(Σ w_k·(S_k − C)²)
//   Risk = 1 − C + λ·U + μ·E                  (λ .30, μ .20, E = environmental risk)
//   all three reported on 0–100, clamped.
//
// Heuristic (explicit opt-in, never mixed with the above):
//   confidence = reliability-weighted mean of modality confidences
//   risk       = max(0, 100 − confidence − 10·n + device_risk + min(30, σ))
//   device_risk: desktop 5, tablet 10, mobile 15
//
// Reliability per modality:
//   Keystroke   1.0
//   Pointer     0.9
//   Touch       0.8
//   Behavioral  0.7
//
// success ⇔ confidence ≥ 70 ∧ risk < 50

use std::collections::BTreeMap;

use crate::config::{FusionConfig, FusionStrategy};
use crate::events::{DeviceType, Modality, ModalityScore};
use crate::features::stats::std_dev;
use crate::sampling::SamplingDepth;

const CONSISTENCY_CAP: f64 = 30.0;

/// Result of fusing one attempt's modality scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub confidence:  f64,
    pub risk:        f64,
    pub uncertainty: f64,
    pub success:     bool,
    pub weights:     BTreeMap<Modality, f64>,
    pub scores:      BTreeMap<Modality, f64>,
}

pub struct FusionEngine {
    cfg: FusionConfig,
}

impl FusionEngine {
    pub fn new(cfg: FusionConfig) -> Self {
        Self { cfg }
    }

    /// The single success rule.
    pub fn decide(&self, confidence: f64, risk: f64) -> bool {
        confidence >= self.cfg.success_confidence && risk < self.cfg.max_risk
    }

    /// Fuse per-modality scores. `environmental_risk` is in [0,1]. Returns
    /// None when there is nothing to fuse.
    pub fn fuse(
        &self,
        scores:             &[ModalityScore],
        depth:              &SamplingDepth,
        environmental_risk: f64,
        device:             DeviceType,
    ) -> Option<Fused> {
        if scores.is_empty() {
            return None;
        }
        let (confidence, risk, uncertainty, weights) = match self.cfg.strategy {
            FusionStrategy::Weighted  => self.weighted(scores, depth, environmental_risk),
            FusionStrategy::Heuristic => self.heuristic(scores, device),
        };
        let confidence  = round4(confidence.clamp(0.0, 100.0));
        let risk        = round4(risk.clamp(0.0, 100.0));
        let uncertainty = round4(uncertainty.clamp(0.0, 100.0));

        Some(Fused {
            confidence,
            risk,
            uncertainty,
            success: self.decide(confidence, risk),
            weights,
            scores: scores.iter().map(|s| (s.modality, s.confidence)).collect(),
        })
    }

    fn weighted(
        &self,
        scores: &[ModalityScore],
        depth:  &SamplingDepth,
        env:    f64,
    ) -> (f64, f64, f64, BTreeMap<Modality, f64>) {
        let c = &self.cfg;
        let raw: Vec<f64> = scores
            .iter()
            .map(|s| {
                c.alpha * s.modality.reliability()
                    + c.beta * s.availability
                    + c.gamma * s.history
                    + c.delta * depth.weight(s.modality)
            })
            .collect();
        let total: f64 = raw.iter().sum();
        let w: Vec<f64> = if total > 0.0 {
            raw.iter().map(|r| r / total).collect()
        } else {
            vec![1.0 / scores.len() as f64; scores.len()]
        };

        let s: Vec<f64> = scores.iter().map(|m| (m.confidence / 100.0).clamp(0.0, 1.0)).collect();
        let fused: f64 = w.iter().zip(&s).map(|(w, s)| w * s).sum();
        let unc: f64 = w.iter().zip(&s).map(|(w, s)| w * (s - fused).powi(2)).sum::<f64>().sqrt();
        let risk = 1.0 - fused + c.lambda * unc + c.mu * env.clamp(0.0, 1.0);

        let weights = scores.iter().zip(&w).map(|(m, w)| (m.modality, *w)).collect();
        (fused * 100.0, risk * 100.0, unc * 100.0, weights)
    }

    fn heuristic(&self, scores: &[ModalityScore], device: DeviceType) -> (f64, f64, f64, BTreeMap<Modality, f64>) {
        let total_rel: f64 = scores.iter().map(|s| s.modality.reliability()).sum();
        let confidence =
            scores.iter().map(|s| s.modality.reliability() * s.confidence).sum::<f64>() / total_rel;

        let device_risk = match device {
            DeviceType::Desktop => 5.0,
            DeviceType::Tablet  => 10.0,
            DeviceType::Mobile  => 15.0,
        };
        let confs: Vec<f64> = scores.iter().map(|s| s.confidence).collect();
        let spread = std_dev(&confs);
        let risk = (100.0 - confidence - 10.0 * scores.len() as f64 + device_risk + spread.min(CONSISTENCY_CAP))
            .max(0.0);

        let weights = scores.iter().map(|s| (s.modality, s.modality.reliability() / total_rel)).collect();
        (confidence, risk, spread, weights)
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
