// tactus/src/engine/learning.rs
//
// Template learning loop.
//
// Per modality, in order:
//   no template                         → bootstrap (vector becomes template, seeds pool)
//   success ∧ confidence > 70:
//     similarity > drift floor (0.3)    → blend at rate clamp(hours_since_update / 24, .01, .1)
//                                         and admit to the pool if not anomalous
//     similarity ≤ drift floor          → rejected, template untouched
//   otherwise                           → skipped
//
// The whole pass, including persisting the changed references, runs under the
// user's learning gate, so concurrent attempts for one user apply and save
// their updates one after the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::events::Modality;
use crate::features::FeatureVector;
use crate::state::templates::{cosine_similarity, TemplateStore};
use crate::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LearnAction {
    Bootstrapped,
    Blended       { rate: f64, similarity: f64, pooled: bool },
    RejectedDrift { similarity: f64 },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnOutcome {
    pub modality: Modality,
    pub action:   LearnAction,
    /// Reference digest after the pass.
    pub digest:   Option<String>,
}

/// One captured vector of the attempt with the anomaly it scored at match time.
#[derive(Debug, Clone)]
pub struct Observation {
    pub vector:  FeatureVector,
    pub anomaly: f64,
}

pub struct LearningLoop {
    cfg:               LearningConfig,
    anomaly_threshold: f64,
}

impl LearningLoop {
    pub fn new(cfg: LearningConfig, anomaly_threshold: f64) -> Self {
        Self { cfg, anomaly_threshold }
    }

    /// Blend rate for a template last updated at `last_update`.
    pub fn rate(&self, last_update: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let hours = (now - last_update).num_milliseconds().max(0) as f64 / 3_600_000.0;
        (hours / 24.0).clamp(self.cfg.min_rate, self.cfg.max_rate)
    }

    /// Whether an attempt qualifies for template blending.
    pub fn eligible(&self, success: bool, confidence: f64) -> bool {
        success && confidence > self.cfg.min_confidence
    }

    /// Apply one attempt's observations and persist every changed reference
    /// to `profiles` before releasing the user's gate.
    pub async fn learn(
        &self,
        store:        &TemplateStore,
        profiles:     &dyn ProfileStore,
        user_id:      &str,
        observations: &[Observation],
        success:      bool,
        confidence:   f64,
        now:          DateTime<Utc>,
    ) -> Vec<LearnOutcome> {
        let _gate = store.lock_user(user_id).await;
        let eligible = self.eligible(success, confidence);

        let mut outcomes = Vec::with_capacity(observations.len());
        for obs in observations {
            let v = &obs.vector;
            let action = match store.get(user_id, v.modality) {
                None => {
                    store.bootstrap(user_id, v);
                    debug!("bootstrapped {} template for {}", v.modality, user_id);
                    LearnAction::Bootstrapped
                }
                Some(_) if !eligible => LearnAction::Skipped,
                Some(t) => {
                    let similarity = cosine_similarity(&t.reference, &v.values);
                    if similarity > self.cfg.drift_floor {
                        let rate = self.rate(t.updated_at, now);
                        store.blend(user_id, v, rate);
                        let pooled = obs.anomaly < self.anomaly_threshold;
                        if pooled {
                            store.admit(user_id, v);
                        }
                        LearnAction::Blended { rate, similarity, pooled }
                    } else {
                        info!(
                            "rejected {} template update for {}: similarity {:.3} ≤ {:.2}",
                            v.modality, user_id, similarity, self.cfg.drift_floor
                        );
                        LearnAction::RejectedDrift { similarity }
                    }
                }
            };

            let current = store.get(user_id, v.modality);
            if matches!(action, LearnAction::Bootstrapped | LearnAction::Blended { .. }) {
                if let Some(t) = &current {
                    if let Err(e) = profiles.save_template(user_id, v.modality, &t.reference).await {
                        warn!("saving {} template for {}: {}", v.modality, user_id, e);
                    }
                }
            }
            outcomes.push(LearnOutcome {
                modality: v.modality,
                action,
                digest:   current.map(|t| t.digest()),
            });
        }
        outcomes
    }
}

impl Default for LearningLoop {
    fn default() -> Self {
        Self::new(LearningConfig::default(), 0.5)
    }
}
