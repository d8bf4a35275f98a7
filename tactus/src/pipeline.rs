// tactus/src/pipeline.rs
//
// Authentication pipeline.
//
//   begin_capture ──► per-modality capture tasks (bounded by the sampling plan)
//         │                 ▲ SessionHandle::feed routes RawSamples
//         ▼
//   end_capture_and_authenticate
//         ├─ stop + join capturers (a capturer that never finishes is dropped
//         │  with CaptureTimeout once the max sampling duration has passed)
//         ├─ extract → match → fuse → decide           (bounded by max duration)
//         └─ learn + profile fold                      (after the decision, runs whole)
//
// Every fault short of "no usable modality" degrades the attempt instead of
// failing it; the only Err a caller sees is Timeout.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{self, capturer_for, CaptureControl, CaptureEnd, CaptureOutcome, Pattern};
use crate::config::EngineConfig;
use crate::engine::{Fused, FusionEngine, LearnAction, LearningLoop, Observation};
use crate::error::{AuthError, AuthResult};
use crate::events::{
    AttemptPhase, AuthDecision, Capabilities, Modality, ModalityIssue, ModalityScore, RawSample, SamplingContext,
};
use crate::features::{self, FeatureVector};
use crate::sampling::{AdaptiveSamplingConfig, Recommendations, SamplingController, SamplingDepth};
use crate::state::templates::TemplateStore;
use crate::store::{CapabilityProbe, MemoryProfileStore, ProfileStore, StaticProbe};

/// Extra time granted to a capturer asked to stop after its window closed.
const STOP_GRACE: Duration = Duration::from_millis(100);

// ── Attempt bookkeeping ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Authenticate,
    /// Decide only: no learning, no profile update, no pattern log.
    ScoreOnly,
}

fn recorded_span_ms(samples: &[RawSample]) -> u64 {
    match (samples.first(), samples.last()) {
        (Some(a), Some(b)) => (b.t_ms - a.t_ms).max(0.0) as u64,
        _ => 0,
    }
}

#[derive(Debug, Clone)]
struct PhaseTracker {
    attempt_id: String,
    phase:      AttemptPhase,
}

impl PhaseTracker {
    fn new(attempt_id: &str) -> Self {
        Self { attempt_id: attempt_id.to_string(), phase: AttemptPhase::Planned }
    }

    fn advance(&mut self, next: AttemptPhase) {
        if self.phase.can_advance_to(next) {
            debug!("attempt {} {} → {}", self.attempt_id, self.phase, next);
            self.phase = next;
        } else {
            warn!("attempt {} ignored transition {} → {}", self.attempt_id, self.phase, next);
        }
    }
}

/// Writes owed by a decided attempt. Applied outside the attempt timeout so
/// a slow store never leaves learning half done.
struct Followup {
    user_id:  String,
    context:  SamplingContext,
    learning: Option<Learning>,
}

struct Learning {
    observations: Vec<Observation>,
    fused:        Fused,
    outcomes:     Vec<CaptureOutcome>,
}

#[derive(Debug, Clone)]
struct Attempt {
    attempt_id:   String,
    user_id:      String,
    context:      SamplingContext,
    plan:         AdaptiveSamplingConfig,
    depth:        SamplingDepth,
    capabilities: Capabilities,
    issues:       Vec<ModalityIssue>,
    phase:        PhaseTracker,
}

/// A live capture session returned by `begin_capture`.
pub struct SessionHandle {
    attempt:  Attempt,
    senders:  BTreeMap<Modality, mpsc::Sender<RawSample>>,
    control:  watch::Sender<CaptureControl>,
    tasks:    Vec<(Modality, JoinHandle<CaptureOutcome>)>,
    started:  Instant,
}

impl SessionHandle {
    pub fn attempt_id(&self) -> &str {
        &self.attempt.attempt_id
    }

    pub fn user_id(&self) -> &str {
        &self.attempt.user_id
    }

    pub fn plan(&self) -> &AdaptiveSamplingConfig {
        &self.attempt.plan
    }

    pub fn phase(&self) -> AttemptPhase {
        self.attempt.phase.phase
    }

    /// Modalities with a running capturer.
    pub fn modalities(&self) -> Vec<Modality> {
        self.senders.keys().copied().collect()
    }

    /// Route a sample to its modality's capturer. Returns false when the
    /// modality is not being captured or its capture window has closed.
    pub async fn feed(&self, sample: RawSample) -> bool {
        match self.senders.get(&sample.modality()) {
            Some(tx) => tx.send(sample).await.is_ok(),
            None => false,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct AuthPipeline {
    cfg:       EngineConfig,
    sampler:   SamplingController,
    templates: TemplateStore,
    fusion:    FusionEngine,
    learning:  LearningLoop,
    store:     Arc<dyn ProfileStore>,
    probe:     Arc<dyn CapabilityProbe>,
    attempts:  AtomicU64,
}

impl AuthPipeline {
    pub fn new(
        cfg:   EngineConfig,
        store: Arc<dyn ProfileStore>,
        probe: Arc<dyn CapabilityProbe>,
    ) -> AuthResult<Self> {
        cfg.validate()?;
        Ok(Self {
            sampler:   SamplingController::new(cfg.sampling.clone()),
            templates: TemplateStore::new(cfg.matcher.clone()),
            fusion:    FusionEngine::new(cfg.fusion.clone()),
            learning:  LearningLoop::new(cfg.learning.clone(), cfg.matcher.anomaly_threshold),
            cfg,
            store,
            probe,
            attempts:  AtomicU64::new(0),
        })
    }

    /// Pipeline over an in-memory store on a device with every modality.
    pub fn in_memory(cfg: EngineConfig) -> AuthResult<Self> {
        Self::new(cfg, Arc::new(MemoryProfileStore::new()), Arc::new(StaticProbe::default()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn sampler(&self) -> &SamplingController {
        &self.sampler
    }

    fn max_duration(&self) -> Duration {
        Duration::from_millis(self.cfg.sampling.max_duration_ms)
    }

    async fn start_attempt(&self, user_id: &str, context: SamplingContext) -> Attempt {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed);
        let attempt_id   = format!("att-{:08}", n);
        let capabilities = self.probe.capabilities();
        let issues       = self.hydrate(user_id).await;
        let depth        = self.sampler.depth(&context, context.last_confidence, &capabilities);
        let plan         = self.sampler.plan(user_id, &context).scaled(&depth);
        debug!(
            "attempt {} user={} depth={} budget={}ms modalities={:?}",
            attempt_id, user_id, depth.analysis_depth, plan.base_duration_ms, capabilities.captured()
        );
        Attempt {
            phase: PhaseTracker::new(&attempt_id),
            attempt_id,
            user_id: user_id.to_string(),
            context,
            plan,
            depth,
            capabilities,
            issues,
        }
    }

    /// Pull persisted state for a user the in-memory maps have not seen yet.
    async fn hydrate(&self, user_id: &str) -> Vec<ModalityIssue> {
        let mut issues = Vec::new();
        if self.sampler.profile(user_id).is_none() {
            match self.store.load_context_profile(user_id).await {
                Ok(Some(p)) => self.sampler.restore_profile(p),
                Ok(None) => {}
                Err(e) => warn!("loading context profile for {}: {}", user_id, e),
            }
        }
        for modality in Modality::ALL {
            if self.templates.has_template(user_id, modality) {
                continue;
            }
            match self.store.load_template(user_id, modality).await {
                Ok(Some(v)) => {
                    if let Err(e) = self.templates.restore(user_id, modality, v) {
                        issues.push(e.issue(modality));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("loading {} template for {}: {}", modality, user_id, e),
            }
        }
        issues
    }

    // ── Live capture ──────────────────────────────────────────────────────────

    pub async fn begin_capture(&self, user_id: &str, context: SamplingContext) -> SessionHandle {
        let mut attempt = self.start_attempt(user_id, context).await;
        let budget = attempt.plan.duration();
        let (control, ctrl_rx) = watch::channel(CaptureControl::Run);

        let mut senders = BTreeMap::new();
        let mut tasks   = Vec::new();
        for modality in attempt.capabilities.captured() {
            let Some(capturer) = capturer_for(modality, &self.cfg.capture) else { continue };
            let (tx, rx) = mpsc::channel(self.cfg.capture.channel_capacity);
            senders.insert(modality, tx);
            tasks.push((modality, tokio::spawn(capture::drive(capturer, rx, ctrl_rx.clone(), budget))));
        }
        attempt.phase.advance(AttemptPhase::Capturing);

        SessionHandle { attempt, senders, control, tasks, started: Instant::now() }
    }

    /// Cancel a session before it is decided. Partial captures are discarded
    /// and nothing is learned.
    pub async fn abort(&self, handle: SessionHandle) {
        let SessionHandle { attempt, senders, control, tasks, .. } = handle;
        let _ = control.send(CaptureControl::Abort);
        drop(senders);
        for (_, task) in tasks {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                debug!("attempt {} capturer still running after abort", attempt.attempt_id);
            }
        }
        info!("attempt {} for {} aborted", attempt.attempt_id, attempt.user_id);
    }

    pub async fn end_capture_and_authenticate(&self, handle: SessionHandle) -> AuthResult<AuthDecision> {
        let SessionHandle { mut attempt, senders, control, tasks, started } = handle;
        let _ = control.send(CaptureControl::Stop);
        let sampling_duration_ms = started.elapsed().as_millis() as u64;

        // Capturers were never given more than the max duration; past that a
        // capturer is considered hung.
        let deadline = (started + self.max_duration()).max(Instant::now() + STOP_GRACE);
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (modality, mut task) in tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    warn!("{} capturer failed: {}", modality, e);
                    attempt.issues.push(ModalityIssue { modality, reason: e.to_string() });
                }
                Err(_) => {
                    task.abort();
                    let err = AuthError::CaptureTimeout { modality };
                    warn!("attempt {}: {}", attempt.attempt_id, err);
                    attempt.issues.push(err.issue(modality));
                }
            }
        }
        drop(senders);

        self.decide(attempt, outcomes, sampling_duration_ms, Mode::Authenticate).await
    }

    // ── Recorded sessions ─────────────────────────────────────────────────────

    /// Run the full pipeline on a prerecorded sample list.
    pub async fn authenticate_recorded(
        &self,
        user_id: &str,
        context: SamplingContext,
        samples: &[RawSample],
    ) -> AuthResult<AuthDecision> {
        let mut attempt = self.start_attempt(user_id, context).await;
        attempt.phase.advance(AttemptPhase::Capturing);

        let outcomes = self.segment_recorded(&attempt.capabilities, samples);
        let span_ms = recorded_span_ms(samples);
        self.decide(attempt, outcomes, span_ms, Mode::Authenticate).await
    }

    /// Score a prerecorded session against the current templates without
    /// learning from it or touching the user's context profile.
    pub async fn score_recorded(
        &self,
        user_id: &str,
        context: SamplingContext,
        samples: &[RawSample],
    ) -> AuthResult<AuthDecision> {
        let mut attempt = self.start_attempt(user_id, context).await;
        attempt.phase.advance(AttemptPhase::Capturing);
        let outcomes = self.segment_recorded(&attempt.capabilities, samples);
        let span_ms = recorded_span_ms(samples);
        self.decide(attempt, outcomes, span_ms, Mode::ScoreOnly).await
    }

    fn segment_recorded(&self, capabilities: &Capabilities, samples: &[RawSample]) -> Vec<CaptureOutcome> {
        capabilities
            .captured()
            .into_iter()
            .map(|modality| {
                let own: Vec<RawSample> = samples.iter().filter(|s| s.modality() == modality).cloned().collect();
                CaptureOutcome {
                    modality,
                    patterns: capture::segment(modality, &self.cfg.capture, &own),
                    samples:  own.len(),
                    ended_by: CaptureEnd::InputClosed,
                }
            })
            .collect()
    }

    /// Advisory sampling output; never mutates state.
    pub fn get_recommendations(&self, user_id: &str, context: &SamplingContext) -> Recommendations {
        self.sampler.recommendations(user_id, context)
    }

    // ── Extract → match → fuse → decide → learn ──────────────────────────────

    /// Timed decision, then the attempt's followup writes.
    async fn decide(
        &self,
        attempt:              Attempt,
        outcomes:             Vec<CaptureOutcome>,
        sampling_duration_ms: u64,
        mode:                 Mode,
    ) -> AuthResult<AuthDecision> {
        let max = self.max_duration();
        let evaluated = tokio::time::timeout(max, self.evaluate(attempt, outcomes, sampling_duration_ms, mode)).await;
        let Ok((decision, followup)) = evaluated else {
            let err = AuthError::Timeout { after_ms: max.as_millis() as u64 };
            warn!("{}", err);
            return Err(err);
        };
        if let Some(f) = followup {
            self.apply(f).await;
        }
        Ok(decision)
    }

    async fn evaluate(
        &self,
        mut attempt:          Attempt,
        outcomes:             Vec<CaptureOutcome>,
        sampling_duration_ms: u64,
        mode:                 Mode,
    ) -> (AuthDecision, Option<Followup>) {
        let user_id   = attempt.user_id.clone();
        let min_units = self.cfg.capture.min_viable_units.max(1);
        let profile_only = |attempt: &Attempt| {
            (mode == Mode::Authenticate).then(|| Followup {
                user_id:  attempt.user_id.clone(),
                context:  attempt.context.clone(),
                learning: None,
            })
        };

        if attempt.capabilities.captured().is_empty() {
            let issues = Modality::CAPTURED.iter().map(|m| AuthError::InputUnavailable.issue(*m)).collect();
            warn!("attempt {} for {}: no input modality available", attempt.attempt_id, user_id);
            let followup = profile_only(&attempt);
            let mut d = AuthDecision::unavailable(&attempt.attempt_id, &user_id, issues);
            d.sampling_duration_ms = sampling_duration_ms;
            return (d, followup);
        }

        // Extract
        attempt.phase.advance(AttemptPhase::Extracting);
        let mut vectors: Vec<(FeatureVector, usize, f64)> = Vec::new();
        let mut all_patterns: Vec<Pattern> = Vec::new();
        let mut producing = 0usize;
        for outcome in &outcomes {
            let units: usize = outcome.patterns.iter().map(|p| p.units()).sum();
            if units < min_units {
                attempt.issues.push(
                    AuthError::InsufficientSamples { modality: outcome.modality, got: units, need: min_units }
                        .issue(outcome.modality),
                );
            }
            if outcome.patterns.is_empty() {
                continue;
            }
            producing += 1;
            let v = features::extract(outcome.modality, &outcome.patterns);
            let availability = (units as f64 / min_units as f64).min(1.0);
            vectors.push((v, outcome.patterns.len(), availability));
            all_patterns.extend(outcome.patterns.iter().cloned());
        }
        if producing >= 2 && attempt.capabilities.supports(Modality::Behavioral) {
            let v = features::extract(Modality::Behavioral, &all_patterns);
            let availability = (all_patterns.len() as f64 / min_units as f64).min(1.0);
            vectors.push((v, all_patterns.len(), availability));
        }

        // Match
        attempt.phase.advance(AttemptPhase::Matching);
        let scores: Vec<ModalityScore> = vectors
            .iter()
            .map(|(v, count, availability)| self.templates.score(&user_id, v, *count, *availability))
            .collect();

        // Fuse
        attempt.phase.advance(AttemptPhase::Fusing);
        let env_risk = attempt.plan.risk_score / 100.0;
        let fused = self.fusion.fuse(&scores, &attempt.depth, env_risk, attempt.context.device_type);

        let Some(fused) = fused else {
            attempt.phase.advance(AttemptPhase::Decided);
            warn!("attempt {} for {}: no modality produced a score", attempt.attempt_id, user_id);
            let followup = profile_only(&attempt);
            let mut d = AuthDecision::unavailable(&attempt.attempt_id, &user_id, attempt.issues);
            d.sampling_duration_ms = sampling_duration_ms;
            d.phase = AttemptPhase::Rejected;
            return (d, followup);
        };

        attempt.phase.advance(AttemptPhase::Decided);
        info!(
            "decision attempt={} user={} success={} confidence={:.1} risk={:.1} modalities={}",
            attempt.attempt_id, user_id, fused.success, fused.confidence, fused.risk, scores.len()
        );

        let followup = (mode == Mode::Authenticate).then(|| {
            attempt.phase.advance(if fused.success { AttemptPhase::Learning } else { AttemptPhase::Rejected });
            let observations = vectors
                .into_iter()
                .zip(&scores)
                .map(|((vector, _, _), s)| Observation { vector, anomaly: s.anomaly })
                .collect();
            Followup {
                user_id:  user_id.clone(),
                context:  attempt.context.clone(),
                learning: Some(Learning { observations, fused: fused.clone(), outcomes }),
            }
        });

        let decision = AuthDecision {
            attempt_id:           attempt.attempt_id,
            user_id,
            success:              fused.success,
            confidence:           fused.confidence,
            risk_score:           fused.risk,
            uncertainty:          fused.uncertainty,
            per_modality_scores:  fused.scores,
            modalities_used:      scores.iter().map(|s| s.modality).collect(),
            issues:               attempt.issues,
            sampling_duration_ms,
            phase:                attempt.phase.phase,
            timestamp:            Utc::now(),
        };
        (decision, followup)
    }

    /// Learn from a decided attempt, then fold its context into the profile.
    async fn apply(&self, followup: Followup) {
        let Followup { user_id, context, learning } = followup;
        let Some(Learning { observations, fused, outcomes }) = learning else {
            self.commit_profile(&user_id, &context, None).await;
            return;
        };
        let learned = self
            .learning
            .learn(&self.templates, &*self.store, &user_id, &observations, fused.success, fused.confidence, Utc::now())
            .await;
        for outcome in &learned {
            if matches!(outcome.action, LearnAction::Bootstrapped | LearnAction::Blended { .. }) {
                debug!(
                    "{} template for {} now {}",
                    outcome.modality,
                    user_id,
                    outcome.digest.as_deref().unwrap_or("-")
                );
            }
        }
        self.commit_profile(&user_id, &context, Some(fused.confidence)).await;
        self.log_patterns(&user_id, &outcomes, &fused.scores);
    }

    async fn commit_profile(&self, user_id: &str, ctx: &SamplingContext, confidence: Option<f64>) {
        let profile = self.sampler.update_profile(user_id, ctx, confidence);
        if let Err(e) = self.store.save_context_profile(&profile).await {
            warn!("saving context profile for {}: {}", user_id, e);
        }
    }

    /// Fire-and-forget audit of every captured pattern.
    fn log_patterns(&self, user_id: &str, outcomes: &[CaptureOutcome], scores: &BTreeMap<Modality, f64>) {
        let records: Vec<(Modality, Pattern, f64)> = outcomes
            .iter()
            .flat_map(|o| {
                let score = scores.get(&o.modality).copied().unwrap_or(0.0);
                o.patterns.iter().map(move |p| (o.modality, p.clone(), score))
            })
            .collect();
        if records.is_empty() {
            return;
        }
        let store   = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            for (modality, pattern, score) in records {
                if let Err(e) = store.append_pattern_log(&user_id, modality, &pattern, score).await {
                    warn!("pattern log for {}: {}", user_id, e);
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BehaviorState, DeviceType, InputEvent};

    fn typing(dwell: impl Fn(usize) -> f64, n: usize) -> Vec<RawSample> {
        let mut out = Vec::new();
        let keys = ["t", "h", "e", " ", "q", "u", "i", "c", "k", " ", "f", "o", "x"];
        for i in 0..n {
            let key = keys[i % keys.len()].to_string();
            let t = i as f64 * 200.0;
            out.push(RawSample::new(t, InputEvent::KeyDown { key: key.clone() }));
            out.push(RawSample::new(t + dwell(i), InputEvent::KeyUp { key }));
        }
        out
    }

    fn taps(n: usize) -> Vec<RawSample> {
        let mut out = Vec::new();
        for i in 0..n {
            let t = 5_000.0 + i as f64 * 300.0;
            let id = i as u32;
            out.push(RawSample::new(t, InputEvent::TouchStart { id, x: 100.0, y: 100.0, pressure: Some(0.5), area: Some(20.0) }));
            out.push(RawSample::new(t + 90.0, InputEvent::TouchEnd { id, x: 101.0, y: 100.0 }));
        }
        out
    }

    fn keyboard_only() -> Arc<dyn CapabilityProbe> {
        Arc::new(StaticProbe(Capabilities { keyboard: true, pointer: false, touch: false }))
    }

    #[tokio::test]
    async fn no_input_modality_is_a_failed_decision_not_an_error() {
        let p = AuthPipeline::new(
            EngineConfig::default(),
            Arc::new(MemoryProfileStore::new()),
            Arc::new(StaticProbe(Capabilities::NONE)),
        )
        .unwrap();
        let h = p.begin_capture("u1", SamplingContext::default()).await;
        assert!(h.modalities().is_empty());
        let d = p.end_capture_and_authenticate(h).await.unwrap();
        assert!(!d.success);
        assert_eq!(d.risk_score, 100.0);
        assert!(d.per_modality_scores.is_empty());
        assert!(d.issues.iter().all(|i| i.reason.contains("no input modality")));
    }

    #[tokio::test]
    async fn live_session_routes_samples_and_bootstraps() {
        let p = AuthPipeline::new(EngineConfig::default(), Arc::new(MemoryProfileStore::new()), keyboard_only()).unwrap();
        let h = p.begin_capture("u1", SamplingContext::default()).await;
        assert_eq!(h.phase(), AttemptPhase::Capturing);
        for s in typing(|_| 100.0, 8) {
            assert!(h.feed(s).await);
        }
        // no pointer capturer on this device
        assert!(!h.feed(RawSample::new(0.0, InputEvent::PointerMove { x: 0.0, y: 0.0 })).await);

        let d = p.end_capture_and_authenticate(h).await.unwrap();
        assert_eq!(d.modalities_used, vec![Modality::Keystroke]);
        // cold start: similarity 0, anomaly 0
        assert_eq!(d.per_modality_scores[&Modality::Keystroke], 30.0);
        assert!(!d.success);
        assert_eq!(d.phase, AttemptPhase::Rejected);
        assert!(p.templates().has_template("u1", Modality::Keystroke));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_capturer_is_excluded_not_fatal() {
        let mut cfg = EngineConfig::default();
        cfg.sampling.max_duration_ms = 2_000;
        let p = AuthPipeline::in_memory(cfg).unwrap();

        let mut h = p.begin_capture("u1", SamplingContext::default()).await;
        // replace the pointer capturer with one that never completes
        for (m, task) in h.tasks.iter_mut() {
            if *m == Modality::Pointer {
                task.abort();
                *task = tokio::spawn(std::future::pending::<CaptureOutcome>());
            }
        }
        for s in typing(|_| 100.0, 8).into_iter().chain(taps(6)) {
            h.feed(s).await;
        }

        let d = p.end_capture_and_authenticate(h).await.unwrap();
        assert!(d.issues.iter().any(|i| i.modality == Modality::Pointer && i.reason.contains("deadline")));
        assert!(!d.modalities_used.contains(&Modality::Pointer));
        assert!(d.modalities_used.contains(&Modality::Keystroke));
        assert!(d.modalities_used.contains(&Modality::Touch));
        assert!(d.modalities_used.contains(&Modality::Behavioral));
    }

    #[tokio::test]
    async fn aborted_session_learns_nothing() {
        let p = AuthPipeline::in_memory(EngineConfig::default()).unwrap();
        let h = p.begin_capture("u1", SamplingContext::default()).await;
        for s in typing(|_| 100.0, 8) {
            h.feed(s).await;
        }
        p.abort(h).await;
        assert_eq!(p.templates().n_templates(), 0);
        assert!(p.sampler().profile("u1").is_none());
    }

    #[tokio::test]
    async fn recorded_session_matches_enrolled_user() {
        let p = AuthPipeline::new(EngineConfig::default(), Arc::new(MemoryProfileStore::new()), keyboard_only()).unwrap();
        let enroll = typing(|i| 100.0 + if i % 2 == 0 { 10.0 } else { -10.0 }, 12);
        let first = p.authenticate_recorded("u1", SamplingContext::default(), &enroll).await.unwrap();
        assert!(!first.success);

        let again = typing(|i| 102.0 + if i % 2 == 0 { 11.0 } else { -11.0 }, 12);
        let d = p.authenticate_recorded("u1", SamplingContext::default(), &again).await.unwrap();
        assert!(d.success, "{:?}", d);
        assert!(d.confidence > 85.0);
        assert_eq!(d.phase, AttemptPhase::Learning);
    }

    #[tokio::test]
    async fn corrupt_persisted_template_is_reset_and_reported() {
        let store = Arc::new(MemoryProfileStore::new());
        store.save_template("u1", Modality::Keystroke, &[1.0, 2.0, 3.0]).await.unwrap();
        let p = AuthPipeline::new(EngineConfig::default(), store.clone(), keyboard_only()).unwrap();

        let d = p.authenticate_recorded("u1", SamplingContext::default(), &typing(|_| 100.0, 8)).await.unwrap();
        assert!(d.issues.iter().any(|i| i.modality == Modality::Keystroke && i.reason.contains("expected")));
        // treated as cold start, then bootstrapped and persisted with the right shape
        let saved = store.load_template("u1", Modality::Keystroke).await.unwrap().unwrap();
        assert_eq!(saved.len(), features::dims(Modality::Keystroke));
    }

    #[tokio::test]
    async fn recommendations_do_not_create_state() {
        let p = AuthPipeline::in_memory(EngineConfig::default()).unwrap();
        let ctx = SamplingContext { device_type: DeviceType::Mobile, ..Default::default() };
        let r = p.get_recommendations("nobody", &ctx);
        assert!(r.recommended_duration_ms >= 1_000 && r.recommended_duration_ms <= 8_000);
        assert!(p.sampler().profile("nobody").is_none());
    }

    #[tokio::test]
    async fn capture_budget_follows_sampling_depth() {
        let p = AuthPipeline::in_memory(EngineConfig::default()).unwrap();
        let rushed     = SamplingContext { behavior_state: BehaviorState::Rushed, last_confidence: Some(92.0), ..Default::default() };
        let distracted = SamplingContext { behavior_state: BehaviorState::Distracted, ..Default::default() };

        let quick = p.begin_capture("u1", rushed.clone()).await;
        let slow  = p.begin_capture("u1", distracted.clone()).await;
        assert!(quick.plan().base_duration_ms < p.sampler().plan("u1", &rushed).base_duration_ms);
        assert!(slow.plan().base_duration_ms > p.sampler().plan("u1", &distracted).base_duration_ms);
        assert!(quick.plan().base_duration_ms < slow.plan().base_duration_ms);
        p.abort(quick).await;
        p.abort(slow).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shallow_capture_window_closes_first() {
        let p = AuthPipeline::new(EngineConfig::default(), Arc::new(MemoryProfileStore::new()), keyboard_only()).unwrap();
        let rushed = SamplingContext { behavior_state: BehaviorState::Rushed, last_confidence: Some(92.0), ..Default::default() };
        let h = p.begin_capture("u1", rushed).await;
        let budget = h.plan().duration();

        tokio::time::sleep(budget + Duration::from_millis(50)).await;
        // the keystroke capturer has finished and dropped its receiver
        assert!(!h.feed(RawSample::new(0.0, InputEvent::KeyDown { key: "a".into() })).await);
        p.abort(h).await;
    }

    #[tokio::test]
    async fn score_only_leaves_templates_and_profile_alone() {
        let p = AuthPipeline::new(EngineConfig::default(), Arc::new(MemoryProfileStore::new()), keyboard_only()).unwrap();
        p.authenticate_recorded("u1", SamplingContext::default(), &typing(|_| 100.0, 12)).await.unwrap();
        let before = p.templates().get("u1", Modality::Keystroke).unwrap();
        let profile = p.sampler().profile("u1").unwrap();

        let d = p.score_recorded("u1", SamplingContext::default(), &typing(|_| 103.0, 12)).await.unwrap();
        assert_eq!(d.phase, AttemptPhase::Decided);
        assert_eq!(p.templates().get("u1", Modality::Keystroke).unwrap(), before);
        assert_eq!(p.sampler().profile("u1").unwrap().update_count, profile.update_count);

        // a user with no templates is never bootstrapped by scoring
        p.score_recorded("u2", SamplingContext::default(), &typing(|_| 100.0, 12)).await.unwrap();
        assert!(!p.templates().has_template("u2", Modality::Keystroke));
    }
}
