// tactus/src/sampling/mod.rs
//
// Adaptive sampling controller.
//
// plan():
//   1. Risk score 0–100, additive:
//        unfamiliar hour              +20   (only once the profile has history)
//        location consistency < 0.5   +25
//        network stability   < 0.7    +15
//        recent failures              +10 each
//        last confidence     < 60     +20
//        interaction frequency outside [0.5×, 2×] the user's average   +15
//   2. Risk multiplier: >70 → 1.8, >50 → 1.4, >30 → 1.2, <10 → 0.8, else 1.0
//   3. duration = base × multiplier × Π(per-factor adjustments, each in [0.7, 1.4])
//   4. Clamp to [min, max].
//
// depth() then scales the planned duration by its frequency multiplier
// (0.7 shallow, 1.5 deep) and clamps again; the result is the capture budget.
//
// The controller is the only writer of UserContextProfile. plan(), depth()
// and recommendations() never mutate it; update_profile() runs once per
// attempt, after the decision.

pub mod model;
pub mod profile;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SamplingConfig;
use crate::events::{BehaviorState, Capabilities, DeviceType, Modality, SamplingContext};

pub use model::ModelWeights;
pub use profile::UserContextProfile;

const ADJ_MIN: f64 = 0.7;
const ADJ_MAX: f64 = 1.4;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Independent contextual duration ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    pub time_of_day: f64,
    pub behavior:    f64,
    pub network:     f64,
    pub device:      f64,
    pub location:    f64,
    pub session:     f64,
    pub frequency:   f64,
    pub performance: f64,
}

impl Adjustments {
    pub fn product(&self) -> f64 {
        self.time_of_day
            * self.behavior
            * self.network
            * self.device
            * self.location
            * self.session
            * self.frequency
            * self.performance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSamplingConfig {
    /// Planned capture duration after risk scaling, adjustments and clamping.
    pub base_duration_ms: u64,
    pub min_ms:           u64,
    pub max_ms:           u64,
    pub risk_score:       f64,
    pub risk_multiplier:  f64,
    pub adjustments:      Adjustments,
    pub risk_factors:     Vec<String>,
}

impl AdaptiveSamplingConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.base_duration_ms)
    }

    /// Apply a depth's frequency multiplier to the planned duration.
    pub fn scaled(mut self, depth: &SamplingDepth) -> Self {
        let raw = self.base_duration_ms as f64 * depth.frequency_multiplier;
        self.base_duration_ms = (raw.round() as u64).clamp(self.min_ms, self.max_ms);
        self
    }
}

// ── Depth ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Shallow,
    Standard,
    Deep,
}

impl std::fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shallow  => write!(f, "shallow"),
            Self::Standard => write!(f, "standard"),
            Self::Deep     => write!(f, "deep"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingDepth {
    /// Context weight per modality; 0 for modalities the device lacks.
    pub modality_weights:     BTreeMap<Modality, f64>,
    pub analysis_depth:       AnalysisDepth,
    pub frequency_multiplier: f64,
}

impl SamplingDepth {
    pub fn weight(&self, modality: Modality) -> f64 {
        self.modality_weights.get(&modality).copied().unwrap_or(0.0)
    }
}

// ── Recommendations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub recommended_duration_ms: u64,
    pub confidence_prediction:   f64,
    pub risk_factors:            Vec<String>,
    pub optimizations:           Vec<String>,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct SamplingController {
    cfg:      SamplingConfig,
    profiles: DashMap<String, Arc<RwLock<UserContextProfile>>>,
}

impl SamplingController {
    pub fn new(cfg: SamplingConfig) -> Self {
        Self { cfg, profiles: DashMap::new() }
    }

    /// Snapshot of a user's profile, if one has been created.
    pub fn profile(&self, user_id: &str) -> Option<UserContextProfile> {
        self.profiles.get(user_id).map(|p| p.read().clone())
    }

    /// Install a profile loaded from the profile store. A profile already in
    /// memory is newer and wins.
    pub fn restore_profile(&self, profile: UserContextProfile) {
        self.profiles
            .entry(profile.user_id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(profile)));
    }

    pub fn plan(&self, user_id: &str, ctx: &SamplingContext) -> AdaptiveSamplingConfig {
        let profile = self.profile(user_id);
        let (risk_score, risk_factors) = risk_score(ctx, profile.as_ref());
        let risk_multiplier = risk_multiplier(risk_score);
        let adjustments = adjustments(ctx, profile.as_ref());

        let raw = self.cfg.base_duration_ms as f64 * risk_multiplier * adjustments.product();
        let base_duration_ms =
            (raw.round() as u64).clamp(self.cfg.min_duration_ms, self.cfg.max_duration_ms);

        debug!(
            "sampling plan user={} risk={:.0} multiplier={:.1} duration={}ms",
            user_id, risk_score, risk_multiplier, base_duration_ms
        );

        AdaptiveSamplingConfig {
            base_duration_ms,
            min_ms: self.cfg.min_duration_ms,
            max_ms: self.cfg.max_duration_ms,
            risk_score,
            risk_multiplier,
            adjustments,
            risk_factors,
        }
    }

    pub fn depth(&self, ctx: &SamplingContext, last_confidence: Option<f64>, caps: &Capabilities) -> SamplingDepth {
        depth(ctx, last_confidence, caps)
    }

    /// Fold one attempt into the user's profile and return the new snapshot.
    pub fn update_profile(
        &self,
        user_id:             &str,
        ctx:                 &SamplingContext,
        observed_confidence: Option<f64>,
    ) -> UserContextProfile {
        let entry = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(UserContextProfile::new(user_id))))
            .clone();
        let mut p = entry.write();
        p.fold(ctx, observed_confidence);
        p.clone()
    }

    /// Advisory output for a UI. Never creates or mutates a profile.
    pub fn recommendations(&self, user_id: &str, ctx: &SamplingContext) -> Recommendations {
        let profile = self.profile(user_id);
        let last    = ctx.last_confidence.or_else(|| profile.as_ref().and_then(|p| p.last_confidence));
        let depth   = depth(ctx, last, &Capabilities::all());
        let plan    = self.plan(user_id, ctx).scaled(&depth);

        let confidence_prediction = profile
            .as_ref()
            .map(|p| p.predict_confidence(ctx))
            .unwrap_or_else(|| ModelWeights::default().predict(&model::context_features(ctx)) * 100.0);

        let mut optimizations = Vec::new();
        match depth.analysis_depth {
            AnalysisDepth::Shallow => optimizations.push("high confidence: a shorter capture is sufficient".to_string()),
            AnalysisDepth::Deep    => optimizations.push("low confidence: capture longer and use every modality".to_string()),
            AnalysisDepth::Standard => {}
        }
        if ctx.network_stability < 0.7 {
            optimizations.push("unstable network: prefer local capture before submitting".to_string());
        }
        if plan.base_duration_ms >= plan.max_ms {
            optimizations.push("duration capped at maximum: ask for active input across modalities".to_string());
        }
        if profile.as_ref().map(|p| p.is_cold()).unwrap_or(true) {
            optimizations.push("no context history yet: first attempts build the profile".to_string());
        }
        if confidence_prediction < 60.0 {
            optimizations.push("predicted confidence is low: consider a step-up factor".to_string());
        }

        Recommendations {
            recommended_duration_ms: plan.base_duration_ms,
            confidence_prediction,
            risk_factors: plan.risk_factors,
            optimizations,
        }
    }
}

// ── Pure scoring functions ────────────────────────────────────────────────────

pub fn risk_score(ctx: &SamplingContext, profile: Option<&UserContextProfile>) -> (f64, Vec<String>) {
    let mut score   = 0.0;
    let mut factors = Vec::new();

    if let Some(p) = profile.filter(|p| !p.is_cold()) {
        if !p.is_familiar_hour(ctx.time_of_day) {
            score += 20.0;
            factors.push(format!("unusual_time:{:02}h", ctx.time_of_day));
        }
        if p.is_abnormal_frequency(ctx.interaction_frequency) {
            score += 15.0;
            factors.push(format!("abnormal_frequency:{:.0}/min", ctx.interaction_frequency));
        }
    }
    if ctx.location_consistency < 0.5 {
        score += 25.0;
        factors.push(format!("low_location_consistency:{:.2}", ctx.location_consistency));
    }
    if ctx.network_stability < 0.7 {
        score += 15.0;
        factors.push(format!("low_network_stability:{:.2}", ctx.network_stability));
    }
    if ctx.recent_failures > 0 {
        score += 10.0 * f64::from(ctx.recent_failures);
        factors.push(format!("recent_failures:{}", ctx.recent_failures));
    }
    if let Some(c) = ctx.last_confidence.filter(|c| *c < 60.0) {
        score += 20.0;
        factors.push(format!("low_last_confidence:{:.0}", c));
    }

    (score.clamp(0.0, 100.0), factors)
}

pub fn risk_multiplier(risk: f64) -> f64 {
    if risk > 70.0 {
        1.8
    } else if risk > 50.0 {
        1.4
    } else if risk > 30.0 {
        1.2
    } else if risk < 10.0 {
        0.8
    } else {
        1.0
    }
}

pub fn adjustments(ctx: &SamplingContext, profile: Option<&UserContextProfile>) -> Adjustments {
    // None while the profile has no history
    let history  = profile.filter(|p| !p.is_cold());
    let familiar = history.map(|p| (p.is_familiar_hour(ctx.time_of_day), p.is_familiar_day(ctx.day_of_week)));
    let session_ratio = history.and_then(|p| p.session_ratio(ctx.session_duration_secs));
    let abnormal_freq = profile.map(|p| p.is_abnormal_frequency(ctx.interaction_frequency)).unwrap_or(false);

    let performance = {
        let base = match ctx.last_confidence {
            Some(c) if c >= 85.0 => 0.8,
            Some(c) if c >= 70.0 => 0.9,
            Some(c) if c < 60.0  => 1.3,
            _ => 1.0,
        };
        base * (1.0 + 0.1 * f64::from(ctx.recent_failures.min(4)))
    };

    let adj = |v: f64| v.clamp(ADJ_MIN, ADJ_MAX);
    Adjustments {
        time_of_day: adj(match familiar {
            Some((true, true))  => 0.9,
            Some((true, false)) => 1.05,
            Some((false, _))    => 1.2,
            None                => 1.0,
        }),
        behavior: adj(match ctx.behavior_state {
            BehaviorState::Focused    => 0.9,
            BehaviorState::Rushed     => 0.8,
            BehaviorState::Normal     => 1.0,
            BehaviorState::Distracted => 1.3,
            BehaviorState::Fatigued   => 1.2,
        }),
        network: adj(if ctx.network_stability < 0.5 {
            1.2
        } else if ctx.network_stability < 0.7 {
            1.1
        } else {
            1.0
        }),
        device: adj(match ctx.device_type {
            DeviceType::Desktop => 1.0,
            DeviceType::Mobile  => 1.2,
            DeviceType::Tablet  => 1.1,
        }),
        location: adj(if ctx.location_consistency >= 0.8 {
            0.9
        } else if ctx.location_consistency >= 0.5 {
            1.0
        } else {
            1.3
        }),
        // relative to the user's typical session once there is one
        session: adj(match session_ratio {
            Some(r) if r < 0.5  => 1.1,
            Some(r) if r >= 1.0 => 0.9,
            Some(_)             => 1.0,
            None if ctx.session_duration_secs < 60.0    => 1.1,
            None if ctx.session_duration_secs > 1_800.0 => 0.9,
            None                => 1.0,
        }),
        frequency:   adj(if abnormal_freq { 1.2 } else { 1.0 }),
        performance: adj(performance),
    }
}

/// Device base weights per modality: keystroke, pointer, touch, behavioral.
fn device_weights(device: DeviceType) -> [f64; 4] {
    match device {
        DeviceType::Desktop => [1.0, 1.0, 0.3, 0.7],
        DeviceType::Mobile  => [0.7, 0.2, 1.0, 0.7],
        DeviceType::Tablet  => [0.6, 0.4, 1.0, 0.7],
    }
}

pub fn depth(ctx: &SamplingContext, last_confidence: Option<f64>, caps: &Capabilities) -> SamplingDepth {
    let base = device_weights(ctx.device_type);
    let modality_weights = Modality::ALL
        .iter()
        .zip(base)
        .map(|(m, w)| (*m, if caps.supports(*m) { w } else { 0.0 }))
        .collect();

    let conf = last_confidence.or(ctx.last_confidence);
    let (analysis_depth, frequency_multiplier) = match (conf, ctx.behavior_state) {
        (Some(c), BehaviorState::Rushed) if c >= 85.0 => (AnalysisDepth::Shallow, 0.7),
        (Some(c), _) if c < 60.0 => (AnalysisDepth::Deep, 1.5),
        (_, BehaviorState::Distracted) => (AnalysisDepth::Deep, 1.5),
        _ => (AnalysisDepth::Standard, 1.0),
    };

    SamplingDepth { modality_weights, analysis_depth, frequency_multiplier }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SamplingController {
        SamplingController::new(SamplingConfig::default())
    }

    #[test]
    fn calm_context_shortens_capture() {
        let ctx = SamplingContext { last_confidence: Some(90.0), ..Default::default() };
        let plan = controller().plan("u1", &ctx);
        assert_eq!(plan.risk_score, 0.0);
        assert_eq!(plan.risk_multiplier, 0.8);
        assert!(plan.base_duration_ms < 3_000);
        assert!(plan.base_duration_ms >= 1_000);
    }

    #[test]
    fn more_failures_never_shorten_capture() {
        let c = controller();
        let calm  = SamplingContext { recent_failures: 0, ..Default::default() };
        let tense = SamplingContext { recent_failures: 3, ..Default::default() };
        assert!(c.plan("u1", &tense).base_duration_ms >= c.plan("u1", &calm).base_duration_ms);
    }

    #[test]
    fn hostile_context_hits_the_cap() {
        let ctx = SamplingContext {
            location_consistency: 0.1,
            network_stability:    0.3,
            recent_failures:      5,
            last_confidence:      Some(40.0),
            behavior_state:       BehaviorState::Distracted,
            device_type:          DeviceType::Mobile,
            ..Default::default()
        };
        let plan = controller().plan("u1", &ctx);
        assert_eq!(plan.risk_score, 100.0);
        assert_eq!(plan.risk_multiplier, 1.8);
        assert_eq!(plan.base_duration_ms, 8_000);
        assert!(plan.risk_factors.iter().any(|f| f.starts_with("recent_failures")));
    }

    #[test]
    fn risk_multiplier_bands() {
        assert_eq!(risk_multiplier(71.0), 1.8);
        assert_eq!(risk_multiplier(70.0), 1.4);
        assert_eq!(risk_multiplier(50.0), 1.2);
        assert_eq!(risk_multiplier(30.0), 1.0);
        assert_eq!(risk_multiplier(10.0), 1.0);
        assert_eq!(risk_multiplier(9.0), 0.8);
    }

    #[test]
    fn unusual_hour_requires_history() {
        let c = controller();
        let night = SamplingContext { time_of_day: 3, ..Default::default() };
        assert!(c.plan("u1", &night).risk_factors.is_empty());

        c.update_profile("u1", &SamplingContext { time_of_day: 14, ..Default::default() }, None);
        let plan = c.plan("u1", &night);
        assert_eq!(plan.risk_score, 20.0);
    }

    #[test]
    fn adjustments_stay_in_band() {
        let ctx = SamplingContext { recent_failures: 50, last_confidence: Some(10.0), ..Default::default() };
        let a = adjustments(&ctx, None);
        for v in [a.time_of_day, a.behavior, a.network, a.device, a.location, a.session, a.frequency, a.performance] {
            assert!((ADJ_MIN..=ADJ_MAX).contains(&v));
        }
    }

    #[test]
    fn depth_zeroes_unsupported_modalities() {
        let caps = Capabilities { keyboard: true, pointer: false, touch: false };
        let d = depth(&SamplingContext::default(), None, &caps);
        assert_eq!(d.weight(Modality::Keystroke), 1.0);
        assert_eq!(d.weight(Modality::Pointer), 0.0);
        assert_eq!(d.weight(Modality::Touch), 0.0);
        assert_eq!(d.weight(Modality::Behavioral), 0.7);
    }

    #[test]
    fn depth_tracks_confidence_and_state() {
        let caps = Capabilities::all();
        let rushed = SamplingContext { behavior_state: BehaviorState::Rushed, ..Default::default() };
        assert_eq!(depth(&rushed, Some(90.0), &caps).analysis_depth, AnalysisDepth::Shallow);
        assert_eq!(depth(&rushed, Some(50.0), &caps).analysis_depth, AnalysisDepth::Deep);
        let distracted = SamplingContext { behavior_state: BehaviorState::Distracted, ..Default::default() };
        assert_eq!(depth(&distracted, Some(90.0), &caps).frequency_multiplier, 1.5);
        assert_eq!(depth(&SamplingContext::default(), None, &caps).analysis_depth, AnalysisDepth::Standard);
    }

    #[test]
    fn depth_scales_the_capture_budget() {
        let c = controller();
        let caps = Capabilities::all();
        let rushed     = SamplingContext { behavior_state: BehaviorState::Rushed, last_confidence: Some(92.0), ..Default::default() };
        let distracted = SamplingContext { behavior_state: BehaviorState::Distracted, ..Default::default() };

        let plain_rushed = c.plan("u1", &rushed);
        let short = plain_rushed.clone().scaled(&depth(&rushed, None, &caps));
        assert_eq!(short.base_duration_ms, ((plain_rushed.base_duration_ms as f64 * 0.7).round() as u64).max(1_000));
        assert!(short.base_duration_ms < plain_rushed.base_duration_ms);

        let plain_distracted = c.plan("u1", &distracted);
        let long = plain_distracted.clone().scaled(&depth(&distracted, None, &caps));
        assert_eq!(long.base_duration_ms, (plain_distracted.base_duration_ms as f64 * 1.5).round() as u64);
        assert!(short.base_duration_ms < long.base_duration_ms);

        assert_eq!(c.recommendations("u1", &rushed).recommended_duration_ms, short.base_duration_ms);
    }

    #[test]
    fn unfamiliar_weekday_lengthens_capture() {
        let c = controller();
        let tuesday = SamplingContext::default();
        c.update_profile("u1", &tuesday, None);
        let saturday = SamplingContext { day_of_week: 5, ..tuesday.clone() };

        let usual = c.plan("u1", &tuesday);
        let odd   = c.plan("u1", &saturday);
        assert_eq!(usual.adjustments.time_of_day, 0.9);
        assert_eq!(odd.adjustments.time_of_day, 1.05);
        assert!(odd.base_duration_ms > usual.base_duration_ms);
        // the weekday alone is not a risk factor
        assert_eq!(odd.risk_score, usual.risk_score);
    }

    #[test]
    fn session_adjustment_follows_typical_session_length() {
        let c = controller();
        // no history: fixed cutoffs
        let fresh = SamplingContext { session_duration_secs: 30.0, ..Default::default() };
        assert_eq!(c.plan("u1", &fresh).adjustments.session, 1.1);

        // a user whose sessions usually last two hours
        c.update_profile("u1", &SamplingContext { session_duration_secs: 7_200.0, ..Default::default() }, None);
        let ninety_min = SamplingContext { session_duration_secs: 5_400.0, ..Default::default() };
        let ten_min    = SamplingContext { session_duration_secs: 600.0, ..Default::default() };
        let three_hrs  = SamplingContext { session_duration_secs: 10_800.0, ..Default::default() };
        assert_eq!(c.plan("u1", &ninety_min).adjustments.session, 1.0);
        assert_eq!(c.plan("u1", &ten_min).adjustments.session, 1.1);
        assert_eq!(c.plan("u1", &three_hrs).adjustments.session, 0.9);
    }

    #[test]
    fn recommendations_are_read_only() {
        let c = controller();
        let r = c.recommendations("ghost", &SamplingContext::default());
        assert!(c.profile("ghost").is_none());
        assert!(r.recommended_duration_ms >= 1_000);
        assert!((r.confidence_prediction - 70.0).abs() < 1e-9);
    }

    #[test]
    fn restore_does_not_clobber_live_profile() {
        let c = controller();
        c.update_profile("u1", &SamplingContext::default(), None);
        c.restore_profile(UserContextProfile::new("u1"));
        assert_eq!(c.profile("u1").map(|p| p.update_count), Some(1));
    }
}
