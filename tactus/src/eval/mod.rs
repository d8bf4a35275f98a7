// tactus/src/eval/mod.rs
//
// Recorded-corpus evaluation.
//
//   1. Loads a labeled JSONL corpus of recorded sessions
//   2. Replays every `enroll` session through the full pipeline (learning on)
//   3. Scores every `genuine` / `impostor` session against the enrolled
//      templates without learning from it
//   4. Computes FAR / FRR at the configured decision rule, the EER from a
//      confidence-threshold sweep, and a confidence histogram per class
//
// Corpus format (one JSON object per line):
//   { "user_id": "alice", "label": "genuine", "context": { ... }, "samples": [ ... ] }
//
// `user_id` is the claimed identity. An impostor session is someone else's
// input presented as that user. `context` is optional.
//
// Run:
//   tactus --mode eval --path corpus.jsonl
//   tactus --mode eval --path corpus.jsonl --json

pub mod report;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::events::{RawSample, SamplingContext};
use crate::pipeline::AuthPipeline;

/// Width of a confidence histogram bin.
const BIN_WIDTH: f64 = 10.0;
/// Step of the EER threshold sweep.
const SWEEP_STEP: f64 = 0.5;

// ── Corpus ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLabel {
    Enroll,
    Genuine,
    Impostor,
}

impl std::fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Enroll   => "enroll",
            Self::Genuine  => "genuine",
            Self::Impostor => "impostor",
        };
        write!(f, "{}", s)
    }
}

/// One recorded session. Also the line format of `--mode replay`, where
/// `label` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSession {
    pub user_id: String,
    #[serde(default)]
    pub label:   Option<SessionLabel>,
    #[serde(default)]
    pub context: SamplingContext,
    pub samples: Vec<RawSample>,
}

impl RecordedSession {
    /// Unlabeled sessions count as enrollment.
    pub fn label(&self) -> SessionLabel {
        self.label.unwrap_or(SessionLabel::Enroll)
    }
}

/// Parse a JSONL corpus. Bad lines are logged and skipped.
pub fn parse_sessions(content: &str) -> Vec<RecordedSession> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str::<RecordedSession>(line) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("corpus line {}: {}", i + 1, e);
                    None
                }
            }
        })
        .collect()
}

// ── Error counters ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ErrorCounts {
    pub genuine_accepted:  u64,
    pub genuine_rejected:  u64,
    pub impostor_accepted: u64,
    pub impostor_rejected: u64,
}

impl ErrorCounts {
    pub fn record(&mut self, label: SessionLabel, accepted: bool) {
        match (label, accepted) {
            (SessionLabel::Genuine, true)   => self.genuine_accepted  += 1,
            (SessionLabel::Genuine, false)  => self.genuine_rejected  += 1,
            (SessionLabel::Impostor, true)  => self.impostor_accepted += 1,
            (SessionLabel::Impostor, false) => self.impostor_rejected += 1,
            (SessionLabel::Enroll, _)       => {}
        }
    }

    /// False accept rate: impostors let in.
    pub fn far(&self) -> f64 {
        let denom = self.impostor_accepted + self.impostor_rejected;
        if denom == 0 { 0.0 } else { self.impostor_accepted as f64 / denom as f64 }
    }

    /// False reject rate: genuine users turned away.
    pub fn frr(&self) -> f64 {
        let denom = self.genuine_accepted + self.genuine_rejected;
        if denom == 0 { 0.0 } else { self.genuine_rejected as f64 / denom as f64 }
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.genuine_accepted + self.genuine_rejected + self.impostor_accepted + self.impostor_rejected;
        if total == 0 {
            return 0.0;
        }
        (self.genuine_accepted + self.impostor_rejected) as f64 / total as f64
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Outcome of one scored (non-enroll) session.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSession {
    pub user_id:    String,
    pub label:      SessionLabel,
    pub confidence: f64,
    pub risk:       f64,
    pub accepted:   bool,
}

/// One point of the confidence-threshold sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    pub threshold: f64,
    pub far:       f64,
    pub frr:       f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower:    f64,
    pub genuine:  usize,
    pub impostor: usize,
}

#[derive(Debug)]
pub struct EvalResult {
    pub n_sessions:    usize,
    pub n_enroll:      usize,
    pub n_genuine:     usize,
    pub n_impostor:    usize,
    /// Sessions that ended in a pipeline error and were not scored.
    pub n_errors:      usize,
    pub threshold:     f64,
    pub max_risk:      f64,
    pub counts:        ErrorCounts,
    pub per_user:      BTreeMap<String, ErrorCounts>,
    pub eer:           f64,
    pub eer_threshold: f64,
    pub sweep:         Vec<SweepPoint>,
    pub histogram:     Vec<HistogramBin>,
    pub scored:        Vec<ScoredSession>,
}

/// FAR / FRR when accepting every session with confidence ≥ threshold.
pub fn sweep(scored: &[ScoredSession], step: f64) -> Vec<SweepPoint> {
    let step = if step > 0.0 { step } else { SWEEP_STEP };
    let n = (100.0 / step).round() as usize;
    (0..=n)
        .map(|i| {
            let threshold = (i as f64 * step).min(100.0);
            let mut counts = ErrorCounts::default();
            for s in scored {
                counts.record(s.label, s.confidence >= threshold);
            }
            SweepPoint { threshold, far: counts.far(), frr: counts.frr() }
        })
        .collect()
}

/// Equal error rate and the threshold it occurs at: the sweep point with the
/// smallest |FAR − FRR|, reported as their mean. Lowest threshold wins ties.
pub fn equal_error_rate(points: &[SweepPoint]) -> (f64, f64) {
    points
        .iter()
        .fold(None::<&SweepPoint>, |best, p| match best {
            Some(b) if (b.far - b.frr).abs() <= (p.far - p.frr).abs() => Some(b),
            _ => Some(p),
        })
        .map(|p| ((p.far + p.frr) / 2.0, p.threshold))
        .unwrap_or((0.0, 0.0))
}

pub fn histogram(scored: &[ScoredSession]) -> Vec<HistogramBin> {
    let n_bins = (100.0 / BIN_WIDTH) as usize;
    let mut bins: Vec<HistogramBin> = (0..n_bins)
        .map(|i| HistogramBin { lower: i as f64 * BIN_WIDTH, genuine: 0, impostor: 0 })
        .collect();
    for s in scored {
        let i = ((s.confidence / BIN_WIDTH) as usize).min(n_bins - 1);
        match s.label {
            SessionLabel::Genuine  => bins[i].genuine  += 1,
            SessionLabel::Impostor => bins[i].impostor += 1,
            SessionLabel::Enroll   => {}
        }
    }
    bins
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

pub struct Evaluator {
    cfg: EngineConfig,
}

impl Evaluator {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    pub async fn run_dataset(&self, path: &Path) -> Result<EvalResult> {
        let content  = tokio::fs::read_to_string(path).await?;
        let sessions = parse_sessions(&content);
        info!("loaded {} sessions from {}", sessions.len(), path.display());
        self.evaluate(sessions).await
    }

    /// Enroll first, then score.
    pub async fn evaluate(&self, sessions: Vec<RecordedSession>) -> Result<EvalResult> {
        let pipeline = AuthPipeline::in_memory(self.cfg.clone())?;
        let (enroll, test): (Vec<&RecordedSession>, Vec<&RecordedSession>) =
            sessions.iter().partition(|s| s.label() == SessionLabel::Enroll);
        let mut n_errors = 0;

        for s in &enroll {
            if let Err(e) = pipeline.authenticate_recorded(&s.user_id, s.context.clone(), &s.samples).await {
                warn!("enroll session for {}: {}", s.user_id, e);
                n_errors += 1;
            }
        }

        let mut counts   = ErrorCounts::default();
        let mut per_user: BTreeMap<String, ErrorCounts> = BTreeMap::new();
        let mut scored   = Vec::with_capacity(test.len());
        for s in &test {
            let label = s.label();
            match pipeline.score_recorded(&s.user_id, s.context.clone(), &s.samples).await {
                Ok(d) => {
                    counts.record(label, d.success);
                    per_user.entry(s.user_id.clone()).or_default().record(label, d.success);
                    scored.push(ScoredSession {
                        user_id:    s.user_id.clone(),
                        label,
                        confidence: d.confidence,
                        risk:       d.risk_score,
                        accepted:   d.success,
                    });
                }
                Err(e) => {
                    warn!("{} session for {}: {}", label, s.user_id, e);
                    n_errors += 1;
                }
            }
        }

        let sweep = sweep(&scored, SWEEP_STEP);
        let (eer, eer_threshold) = equal_error_rate(&sweep);
        info!(
            "evaluated {} sessions: FAR={:.4} FRR={:.4} EER={:.4}@{:.1}",
            sessions.len(), counts.far(), counts.frr(), eer, eer_threshold
        );

        Ok(EvalResult {
            n_sessions: sessions.len(),
            n_enroll:   enroll.len(),
            n_genuine:  test.iter().filter(|s| s.label() == SessionLabel::Genuine).count(),
            n_impostor: test.iter().filter(|s| s.label() == SessionLabel::Impostor).count(),
            n_errors,
            threshold:  self.cfg.fusion.success_confidence,
            max_risk:   self.cfg.fusion.max_risk,
            counts,
            per_user,
            eer,
            eer_threshold,
            histogram:  histogram(&scored),
            sweep,
            scored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InputEvent;

    fn scored(label: SessionLabel, confidence: f64) -> ScoredSession {
        ScoredSession { user_id: "u1".into(), label, confidence, risk: 100.0 - confidence, accepted: confidence >= 70.0 }
    }

    fn typing(dwell: f64, interval: f64, n: usize) -> Vec<RawSample> {
        let keys = ["t", "h", "e", " ", "q", "u", "i", "c", "k"];
        let mut out = Vec::new();
        for i in 0..n {
            let key = keys[i % keys.len()].to_string();
            let t = i as f64 * interval;
            let jitter = if i % 2 == 0 { 8.0 } else { -8.0 };
            out.push(RawSample::new(t, InputEvent::KeyDown { key: key.clone() }));
            out.push(RawSample::new(t + dwell + jitter, InputEvent::KeyUp { key }));
        }
        out
    }

    fn session(user: &str, label: SessionLabel, samples: Vec<RawSample>) -> RecordedSession {
        RecordedSession { user_id: user.into(), label: Some(label), context: SamplingContext::default(), samples }
    }

    #[test]
    fn rates_from_counts() {
        let mut c = ErrorCounts::default();
        c.record(SessionLabel::Genuine, true);
        c.record(SessionLabel::Genuine, false);
        c.record(SessionLabel::Impostor, false);
        c.record(SessionLabel::Impostor, false);
        c.record(SessionLabel::Impostor, true);
        c.record(SessionLabel::Enroll, true);
        assert_eq!(c.frr(), 0.5);
        assert!((c.far() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.accuracy(), 0.6);
        assert_eq!(ErrorCounts::default().far(), 0.0);
    }

    #[test]
    fn separable_scores_have_zero_eer() {
        let s = vec![
            scored(SessionLabel::Genuine, 92.0),
            scored(SessionLabel::Genuine, 88.0),
            scored(SessionLabel::Impostor, 41.0),
            scored(SessionLabel::Impostor, 55.0),
        ];
        let points = sweep(&s, 1.0);
        assert_eq!(points.len(), 101);
        assert_eq!(points[0], SweepPoint { threshold: 0.0, far: 1.0, frr: 0.0 });
        assert_eq!(points[100].frr, 1.0);
        let (eer, at) = equal_error_rate(&points);
        assert_eq!(eer, 0.0);
        // first threshold above every impostor
        assert_eq!(at, 56.0);
    }

    #[test]
    fn overlapping_scores_meet_in_the_middle() {
        let s = vec![
            scored(SessionLabel::Genuine, 80.0),
            scored(SessionLabel::Genuine, 60.0),
            scored(SessionLabel::Impostor, 70.0),
            scored(SessionLabel::Impostor, 50.0),
        ];
        let (eer, at) = equal_error_rate(&sweep(&s, 1.0));
        // FAR and FRR cross at 0.5 once the 60 genuine score is rejected
        assert_eq!(eer, 0.5);
        assert_eq!(at, 61.0);
    }

    #[test]
    fn histogram_bins_by_class() {
        let s = vec![
            scored(SessionLabel::Genuine, 95.0),
            scored(SessionLabel::Genuine, 100.0),
            scored(SessionLabel::Impostor, 12.0),
        ];
        let h = histogram(&s);
        assert_eq!(h.len(), 10);
        assert_eq!(h[9].genuine, 2);
        assert_eq!(h[1].impostor, 1);
    }

    #[test]
    fn bad_corpus_lines_are_skipped() {
        let line = serde_json::to_string(&session("u1", SessionLabel::Genuine, typing(100.0, 200.0, 3))).unwrap();
        let content = format!("{}\n\nnot json\n{}\n", line, line);
        let parsed = parse_sessions(&content);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].label, Some(SessionLabel::Genuine));
        assert_eq!(parsed[0].samples.len(), 6);
    }

    #[tokio::test]
    async fn enrolled_user_is_told_apart_from_impostor() {
        let corpus = vec![
            session("alice", SessionLabel::Genuine, typing(102.0, 200.0, 12)),
            session("alice", SessionLabel::Enroll, typing(100.0, 200.0, 12)),
            session("alice", SessionLabel::Impostor, typing(30.0, 600.0, 12)),
        ];
        let r = Evaluator::new(EngineConfig::default()).evaluate(corpus).await.unwrap();
        assert_eq!((r.n_enroll, r.n_genuine, r.n_impostor, r.n_errors), (1, 1, 1, 0));
        assert_eq!(r.counts.genuine_accepted, 1);
        assert_eq!(r.counts.impostor_accepted, 0);
        assert_eq!(r.eer, 0.0);
        let genuine = r.scored.iter().find(|s| s.label == SessionLabel::Genuine).unwrap();
        let impostor = r.scored.iter().find(|s| s.label == SessionLabel::Impostor).unwrap();
        assert!(genuine.confidence > impostor.confidence);
    }
}
