// tactus/src/sampling/profile.rs
//
// Per-user context habits, folded in after every attempt with the decaying
// rate min(0.1, 1/update_count). A cold profile is seeded from its first
// context verbatim; afterwards it moves at most 10% per attempt, and less
// once more than ten attempts have been folded in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::SamplingContext;
use crate::sampling::model::{self, ModelWeights};

const MAX_RATE:         f64 = 0.1;
const MODEL_RATE:       f64 = 0.05;
const FAMILIAR_HOUR:    f64 = 1.0 / 24.0;
const FAMILIAR_DAY:     f64 = 1.0 / 7.0;
const FREQ_RATIO_RANGE: (f64, f64) = (0.5, 2.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContextProfile {
    pub user_id:                   String,
    pub update_count:              u64,
    /// Share of recent attempts per hour of day.
    pub hour_affinity:             [f64; 24],
    /// Share of recent attempts per weekday, Monday first.
    pub day_affinity:              [f64; 7],
    pub avg_interaction_frequency: f64,
    pub avg_session_secs:          f64,
    pub last_confidence:           Option<f64>,
    pub model:                     ModelWeights,
    pub updated_at:                DateTime<Utc>,
}

impl UserContextProfile {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id:                   user_id.to_string(),
            update_count:              0,
            hour_affinity:             [0.0; 24],
            day_affinity:              [0.0; 7],
            avg_interaction_frequency: 0.0,
            avg_session_secs:          0.0,
            last_confidence:           None,
            model:                     ModelWeights::default(),
            updated_at:                Utc::now(),
        }
    }

    pub fn is_cold(&self) -> bool {
        self.update_count == 0
    }

    /// Rate the next fold will use.
    pub fn learning_rate(&self) -> f64 {
        if self.is_cold() { 1.0 } else { MAX_RATE.min(1.0 / (self.update_count + 1) as f64) }
    }

    pub fn is_familiar_hour(&self, hour: u8) -> bool {
        self.hour_affinity.get(usize::from(hour)).map(|a| *a >= FAMILIAR_HOUR).unwrap_or(false)
    }

    pub fn is_familiar_day(&self, day: u8) -> bool {
        self.day_affinity.get(usize::from(day)).map(|a| *a >= FAMILIAR_DAY).unwrap_or(false)
    }

    /// Current frequency over the historical average, when there is one.
    pub fn frequency_ratio(&self, frequency: f64) -> Option<f64> {
        if self.is_cold() || self.avg_interaction_frequency <= 0.0 {
            return None;
        }
        Some(frequency / self.avg_interaction_frequency)
    }

    /// Current session length over the user's typical one, when known.
    pub fn session_ratio(&self, session_secs: f64) -> Option<f64> {
        if self.is_cold() || self.avg_session_secs <= 0.0 {
            return None;
        }
        Some(session_secs.max(0.0) / self.avg_session_secs)
    }

    pub fn is_abnormal_frequency(&self, frequency: f64) -> bool {
        self.frequency_ratio(frequency)
            .map(|r| r < FREQ_RATIO_RANGE.0 || r > FREQ_RATIO_RANGE.1)
            .unwrap_or(false)
    }

    /// Fold one attempt's context, and its fused confidence if the attempt
    /// reached a decision, into the profile.
    pub fn fold(&mut self, ctx: &SamplingContext, observed_confidence: Option<f64>) {
        let rate = self.learning_rate();
        self.update_count += 1;

        let hour = usize::from(ctx.time_of_day.min(23));
        for (h, a) in self.hour_affinity.iter_mut().enumerate() {
            let hit = if h == hour { 1.0 } else { 0.0 };
            *a = *a * (1.0 - rate) + hit * rate;
        }
        let day = usize::from(ctx.day_of_week.min(6));
        for (d, a) in self.day_affinity.iter_mut().enumerate() {
            let hit = if d == day { 1.0 } else { 0.0 };
            *a = *a * (1.0 - rate) + hit * rate;
        }

        self.avg_interaction_frequency =
            self.avg_interaction_frequency * (1.0 - rate) + ctx.interaction_frequency.max(0.0) * rate;
        self.avg_session_secs = self.avg_session_secs * (1.0 - rate) + ctx.session_duration_secs.max(0.0) * rate;

        if let Some(conf) = observed_confidence {
            let x   = model::context_features(ctx);
            let err = self.model.predict(&x) - (conf / 100.0).clamp(0.0, 1.0);
            self.model = model::update(&self.model, &x, err, MODEL_RATE);
            self.last_confidence = Some(conf);
        }
        self.updated_at = Utc::now();
    }

    /// Predicted confidence in [0,100] for an attempt in `ctx`.
    pub fn predict_confidence(&self, ctx: &SamplingContext) -> f64 {
        self.model.predict(&model::context_features(ctx)) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(hour: u8, freq: f64) -> SamplingContext {
        SamplingContext { time_of_day: hour, interaction_frequency: freq, ..Default::default() }
    }

    #[test]
    fn first_fold_copies_context() {
        let mut p = UserContextProfile::new("u1");
        assert!(p.is_cold());
        p.fold(&ctx(9, 40.0), None);
        assert_eq!(p.update_count, 1);
        assert_eq!(p.avg_interaction_frequency, 40.0);
        assert_eq!(p.hour_affinity[9], 1.0);
        assert!(p.is_familiar_hour(9));
        assert!(!p.is_familiar_hour(3));
    }

    #[test]
    fn rate_is_capped_then_decays() {
        let mut p = UserContextProfile::new("u1");
        p.fold(&ctx(9, 40.0), None);
        assert_eq!(p.learning_rate(), 0.1);
        p.fold(&ctx(9, 140.0), None);
        // one step at rate 0.1 from 40
        assert!((p.avg_interaction_frequency - 50.0).abs() < 1e-9);
        for _ in 0..18 {
            p.fold(&ctx(9, 50.0), None);
        }
        assert_eq!(p.update_count, 20);
        assert!((p.learning_rate() - 1.0 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn abnormal_frequency_needs_history() {
        let mut p = UserContextProfile::new("u1");
        assert!(!p.is_abnormal_frequency(1_000.0));
        p.fold(&ctx(9, 40.0), None);
        assert!(p.is_abnormal_frequency(100.0));
        assert!(p.is_abnormal_frequency(10.0));
        assert!(!p.is_abnormal_frequency(60.0));
    }

    #[test]
    fn weekday_and_session_habits_are_tracked() {
        let mut p = UserContextProfile::new("u1");
        assert_eq!(p.session_ratio(600.0), None);
        let monday = SamplingContext { day_of_week: 0, session_duration_secs: 1_200.0, ..Default::default() };
        p.fold(&monday, None);
        assert!(p.is_familiar_day(0));
        assert!(!p.is_familiar_day(6));
        assert_eq!(p.session_ratio(600.0), Some(0.5));

        // one Sunday among many Mondays stays unfamiliar
        for _ in 0..9 {
            p.fold(&monday, None);
        }
        p.fold(&SamplingContext { day_of_week: 6, ..monday.clone() }, None);
        assert!(!p.is_familiar_day(6));
        assert!(p.is_familiar_day(0));
    }

    #[test]
    fn observed_confidence_trains_predictor() {
        let mut p = UserContextProfile::new("u1");
        let c = ctx(9, 40.0);
        p.fold(&c, Some(95.0));
        assert_eq!(p.model.version, 1);
        assert_eq!(p.last_confidence, Some(95.0));
        assert!(p.predict_confidence(&c) > 70.0);
    }
}
