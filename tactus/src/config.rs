// tactus/src/config.rs
//
// Engine configuration. Every tunable constant of the pipeline lives here with
// its production default; a JSON file may override any subset of fields.
//
//   {
//     "sampling": { "max_duration_ms": 6000 },
//     "fusion":   { "strategy": "heuristic" }
//   }

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub base_duration_ms: u64,
    pub min_duration_ms:  u64,
    pub max_duration_ms:  u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { base_duration_ms: 3_000, min_duration_ms: 1_000, max_duration_ms: 8_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub tap_max_distance_px:        f64, // below this (and fast) → tap / click
    pub tap_max_duration_ms:        f64,
    pub continuous_min_distance_px: f64, // above this → swipe / drag
    pub min_movement_samples:       usize,
    pub min_movement_ms:            f64,
    pub movement_pause_ms:          f64, // gap that terminates a pointer movement
    pub scroll_gap_ms:              f64, // gap that terminates a scroll gesture
    pub keystroke_burst_gap_ms:     f64, // idle gap that splits keystroke windows
    pub min_viable_units:           usize,
    pub channel_capacity:           usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tap_max_distance_px:        10.0,
            tap_max_duration_ms:        300.0,
            continuous_min_distance_px: 20.0,
            min_movement_samples:       5,
            min_movement_ms:            50.0,
            movement_pause_ms:          100.0,
            scroll_gap_ms:              150.0,
            keystroke_burst_gap_ms:     2_000.0,
            min_viable_units:           5,
            channel_capacity:           1_024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub similarity_weight: f64,
    pub anomaly_weight:    f64,
    pub anomaly_threshold: f64, // pool admission requires a score below this
    pub pool_capacity:     usize,
    pub history_saturation: u64, // template updates for full history credit
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_weight:  0.7,
            anomaly_weight:     0.3,
            anomaly_threshold:  0.5,
            pool_capacity:      50,
            history_saturation: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Reliability / availability / history / context weighting with uncertainty.
    #[default]
    Weighted,
    /// Reliability-weighted mean with the additive device / consistency risk formula.
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub strategy:           FusionStrategy,
    pub alpha:              f64, // reliability
    pub beta:               f64, // availability
    pub gamma:              f64, // history
    pub delta:              f64, // context
    pub lambda:             f64, // uncertainty penalty
    pub mu:                 f64, // environmental risk penalty
    pub success_confidence: f64,
    pub max_risk:           f64, // success requires risk strictly below
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy:           FusionStrategy::Weighted,
            alpha:              0.35,
            beta:               0.25,
            gamma:              0.25,
            delta:              0.15,
            lambda:             0.3,
            mu:                 0.2,
            success_confidence: 70.0,
            max_risk:           50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub min_confidence: f64, // learning requires confidence strictly above
    pub drift_floor:    f64, // updates at or below this similarity are rejected
    pub min_rate:       f64,
    pub max_rate:       f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { min_confidence: 70.0, drift_floor: 0.3, min_rate: 0.01, max_rate: 0.1 }
    }
}

// ── Engine config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sampling: SamplingConfig,
    pub capture:  CaptureConfig,
    pub matcher:  MatcherConfig,
    pub fusion:   FusionConfig,
    pub learning: LearningConfig,
}

impl EngineConfig {
    /// Load a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AuthResult<()> {
        let s = &self.sampling;
        if s.min_duration_ms == 0 || s.min_duration_ms > s.max_duration_ms {
            return Err(AuthError::Config(format!(
                "sampling bounds [{}, {}] ms are inconsistent",
                s.min_duration_ms, s.max_duration_ms
            )));
        }
        let c = &self.capture;
        if c.tap_max_distance_px > c.continuous_min_distance_px {
            return Err(AuthError::Config("tap distance exceeds continuous distance".into()));
        }
        if c.channel_capacity == 0 {
            return Err(AuthError::Config("channel_capacity must be positive".into()));
        }
        let f = &self.fusion;
        if [f.alpha, f.beta, f.gamma, f.delta].iter().any(|w| *w < 0.0)
            || f.alpha + f.beta + f.gamma + f.delta <= 0.0
        {
            return Err(AuthError::Config("fusion weights must be non-negative and not all zero".into()));
        }
        if self.matcher.pool_capacity == 0 {
            return Err(AuthError::Config("pool_capacity must be positive".into()));
        }
        let l = &self.learning;
        if l.min_rate <= 0.0 || l.min_rate > l.max_rate || l.max_rate > 1.0 {
            return Err(AuthError::Config(format!(
                "learning rate bounds [{}, {}] are inconsistent",
                l.min_rate, l.max_rate
            )));
        }
        Ok(())
    }
}
