// tactus/src/state/templates.rs
//
// Per-user behavioral templates and the matcher that reads them.
// DashMap = sharded concurrent HashMap; attempts for different users never
// contend, and readers only take a short parking_lot read lock.
//
// Layout:
//   (user, modality) → UserTemplate { reference vector, bounded pool of recent
//                                     normal vectors, update bookkeeping }
//   user             → learning gate (tokio Mutex): at most one attempt per
//                                     user mutates templates at a time
//
// Only the learning loop writes (bootstrap / blend / admit) and it must hold
// the user's gate while doing so. Matching always reads the last committed
// template.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::MatcherConfig;
use crate::error::{AuthError, AuthResult};
use crate::events::{Modality, ModalityScore};
use crate::features::{dims, FeatureVector};

// ── Vector math ───────────────────────────────────────────────────────────────

/// Cosine similarity clamped to [0,1]; 0 when either vector has no magnitude
/// or the lengths differ.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

// ── Per (user, modality) template ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTemplate {
    pub user_id:      String,
    pub modality:     Modality,
    pub reference:    Vec<f64>,
    pub pool:         VecDeque<Vec<f64>>,
    pub created_at:   DateTime<Utc>,
    pub updated_at:   DateTime<Utc>,
    pub update_count: u64,
}

impl UserTemplate {
    pub fn new(user_id: &str, modality: Modality, reference: Vec<f64>, now: DateTime<Utc>) -> Self {
        let mut pool = VecDeque::new();
        pool.push_back(reference.clone());
        Self {
            user_id:      user_id.to_string(),
            modality,
            reference,
            pool,
            created_at:   now,
            updated_at:   now,
            update_count: 1,
        }
    }

    /// Short stable fingerprint of the reference vector for audit lines.
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        for v in &self.reference {
            h.update(v.to_le_bytes());
        }
        hex::encode(&h.finalize()[..8])
    }

    /// Anomaly of `v` against the pool, in [0,1].
    ///
    /// Distance to the nearest pooled vector, normalized by the pool's mean
    /// pairwise distance (or the single pooled vector's norm).
    pub fn anomaly(&self, v: &[f64]) -> f64 {
        let Some(d_min) = self.pool.iter().map(|p| euclidean(p, v)).min_by(|a, b| a.total_cmp(b)) else {
            return 0.0;
        };
        let scale = if self.pool.len() >= 2 {
            let mut sum = 0.0;
            let mut n   = 0usize;
            for i in 0..self.pool.len() {
                for j in (i + 1)..self.pool.len() {
                    sum += euclidean(&self.pool[i], &self.pool[j]);
                    n += 1;
                }
            }
            sum / n as f64
        } else {
            self.pool[0].iter().map(|x| x * x).sum::<f64>().sqrt()
        };
        if scale <= f64::EPSILON {
            return if d_min <= f64::EPSILON { 0.0 } else { 1.0 };
        }
        (d_min / scale).min(1.0)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct TemplateStore {
    cfg:       MatcherConfig,
    templates: DashMap<(String, Modality), Arc<RwLock<UserTemplate>>>,
    gates:     DashMap<String, Arc<Mutex<()>>>,
    updates:   AtomicU64,
}

impl TemplateStore {
    pub fn new(cfg: MatcherConfig) -> Self {
        Self {
            cfg,
            templates: DashMap::new(),
            gates:     DashMap::new(),
            updates:   AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    fn key(user_id: &str, modality: Modality) -> (String, Modality) {
        (user_id.to_string(), modality)
    }

    /// Snapshot of the last committed template.
    pub fn get(&self, user_id: &str, modality: Modality) -> Option<UserTemplate> {
        let t = self.templates.get(&Self::key(user_id, modality))?.read().clone();
        if t.reference.len() != dims(modality) {
            // Only reachable through a bad restore; treat as cold start.
            warn!(
                "{}",
                AuthError::TemplateCorrupt {
                    user_id: user_id.to_string(),
                    modality,
                    expected: dims(modality),
                    found: t.reference.len(),
                }
            );
            self.templates.remove(&Self::key(user_id, modality));
            return None;
        }
        Some(t)
    }

    pub fn has_template(&self, user_id: &str, modality: Modality) -> bool {
        self.get(user_id, modality).is_some()
    }

    pub fn n_templates(&self) -> usize {
        self.templates.len()
    }

    /// Bootstraps and blends applied since startup.
    pub fn total_updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Install a reference vector loaded from the profile store. A vector of
    /// the wrong dimensionality resets the template and is reported.
    pub fn restore(&self, user_id: &str, modality: Modality, reference: Vec<f64>) -> AuthResult<()> {
        let expected = dims(modality);
        if reference.len() != expected {
            self.templates.remove(&Self::key(user_id, modality));
            let err = AuthError::TemplateCorrupt {
                user_id: user_id.to_string(),
                modality,
                expected,
                found: reference.len(),
            };
            warn!("{}; template reset", err);
            return Err(err);
        }
        self.templates
            .entry(Self::key(user_id, modality))
            .or_insert_with(|| Arc::new(RwLock::new(UserTemplate::new(user_id, modality, reference, Utc::now()))));
        Ok(())
    }

    // ── Matcher (read-only) ───────────────────────────────────────────────────

    /// Cosine similarity against the template; 0 on cold start.
    pub fn compare(&self, user_id: &str, modality: Modality, v: &FeatureVector) -> f64 {
        self.get(user_id, modality)
            .map(|t| cosine_similarity(&t.reference, &v.values))
            .unwrap_or(0.0)
    }

    /// Anomaly against the user's pool for this modality; 0 when the pool is
    /// empty (the first vector is never anomalous).
    pub fn anomaly_score(&self, user_id: &str, modality: Modality, v: &FeatureVector) -> f64 {
        self.get(user_id, modality).map(|t| t.anomaly(&v.values)).unwrap_or(0.0)
    }

    /// Template maturity in [0,1].
    pub fn history(&self, user_id: &str, modality: Modality) -> f64 {
        let saturation = self.cfg.history_saturation.max(1) as f64;
        self.get(user_id, modality)
            .map(|t| (t.update_count as f64 / saturation).min(1.0))
            .unwrap_or(0.0)
    }

    /// confidence = (w_sim × similarity + w_anom × (1 − anomaly)) × 100
    pub fn confidence(&self, similarity: f64, anomaly: f64) -> f64 {
        ((self.cfg.similarity_weight * similarity + self.cfg.anomaly_weight * (1.0 - anomaly)) * 100.0)
            .clamp(0.0, 100.0)
    }

    /// Full matcher output for one modality.
    pub fn score(
        &self,
        user_id:       &str,
        v:             &FeatureVector,
        pattern_count: usize,
        availability:  f64,
    ) -> ModalityScore {
        let modality   = v.modality;
        let similarity = self.compare(user_id, modality, v);
        let anomaly    = self.anomaly_score(user_id, modality, v);
        ModalityScore {
            modality,
            similarity,
            anomaly,
            confidence: self.confidence(similarity, anomaly),
            pattern_count,
            availability: availability.clamp(0.0, 1.0),
            history: self.history(user_id, modality),
        }
    }

    // ── Writes (learning loop only, under the user's gate) ────────────────────

    /// Per-user learning gate.
    pub fn learning_gate(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.gates.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the user's gate, waiting behind any attempt already learning.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let gate = self.learning_gate(user_id);
        match gate.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("{}", AuthError::ConcurrentWriteConflict { user_id: user_id.to_string() });
                gate.lock_owned().await
            }
        }
    }

    /// First vector for (user, modality) becomes the template and seeds the pool.
    pub fn bootstrap(&self, user_id: &str, v: &FeatureVector) -> UserTemplate {
        let t = UserTemplate::new(user_id, v.modality, v.values.clone(), Utc::now());
        self.templates.insert(Self::key(user_id, v.modality), Arc::new(RwLock::new(t.clone())));
        self.updates.fetch_add(1, Ordering::Relaxed);
        t
    }

    /// template ← template × (1 − rate) + v × rate
    pub fn blend(&self, user_id: &str, v: &FeatureVector, rate: f64) -> Option<UserTemplate> {
        let entry = self.templates.get(&Self::key(user_id, v.modality))?.clone();
        let mut t = entry.write();
        for (r, x) in t.reference.iter_mut().zip(&v.values) {
            *r = *r * (1.0 - rate) + x * rate;
        }
        t.update_count += 1;
        t.updated_at = Utc::now();
        self.updates.fetch_add(1, Ordering::Relaxed);
        Some(t.clone())
    }

    /// Admit a normal vector into the bounded FIFO pool.
    pub fn admit(&self, user_id: &str, v: &FeatureVector) -> usize {
        let Some(entry) = self.templates.get(&Self::key(user_id, v.modality)).map(|e| e.clone()) else {
            return 0;
        };
        let mut t = entry.write();
        t.pool.push_back(v.values.clone());
        while t.pool.len() > self.cfg.pool_capacity {
            t.pool.pop_front();
        }
        t.pool.len()
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}
