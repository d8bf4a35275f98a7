// tactus/src/eval/report.rs
//
// Markdown / JSON rendering of an evaluation result.

use std::fmt::Write;

use super::EvalResult;

/// Sweep points shown in the markdown DET table.
const DET_THRESHOLDS: [f64; 7] = [40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0];

/// Render the full report as markdown.
pub fn render_markdown(result: &EvalResult) -> String {
    let mut out = String::new();
    let c = &result.counts;

    let _ = writeln!(out, "# Tactus Evaluation Report\n");
    let _ = writeln!(
        out,
        "**Sessions**: {}  **Enroll**: {}  **Genuine**: {}  **Impostor**: {}  **Errors**: {}\n",
        result.n_sessions, result.n_enroll, result.n_genuine, result.n_impostor, result.n_errors
    );
    let _ = writeln!(out, "Decision rule: confidence ≥ {:.1} and risk < {:.1}\n", result.threshold, result.max_risk);
    let _ = writeln!(out, "| Metric   | Value  |");
    let _ = writeln!(out, "|----------|--------|");
    let _ = writeln!(out, "| FAR      | {:.4} |", c.far());
    let _ = writeln!(out, "| FRR      | {:.4} |", c.frr());
    let _ = writeln!(out, "| Accuracy | {:.4} |", c.accuracy());
    let _ = writeln!(out, "| EER      | {:.4} |", result.eer);
    let _ = writeln!(out, "| EER at   | {:.1}   |", result.eer_threshold);

    if !result.per_user.is_empty() {
        let _ = writeln!(out, "\n### Per-User\n");
        let _ = writeln!(out, "| User | FAR | FRR | Genuine | Impostor |");
        let _ = writeln!(out, "|------|-----|-----|---------|----------|");
        for (user, m) in &result.per_user {
            let _ = writeln!(
                out,
                "| {} | {:.3} | {:.3} | {} | {} |",
                user,
                m.far(),
                m.frr(),
                m.genuine_accepted + m.genuine_rejected,
                m.impostor_accepted + m.impostor_rejected,
            );
        }
    }

    let _ = writeln!(out, "\n### Confidence Threshold Sweep\n");
    let _ = writeln!(out, "| Threshold | FAR | FRR |");
    let _ = writeln!(out, "|-----------|-----|-----|");
    for t in DET_THRESHOLDS {
        if let Some(p) = result.sweep.iter().find(|p| (p.threshold - t).abs() < 1e-9) {
            let _ = writeln!(out, "| {:>5.1} | {:.4} | {:.4} |", p.threshold, p.far, p.frr);
        }
    }

    let _ = writeln!(out, "\n### Confidence Distribution\n");
    let scored = result.scored.len().max(1) as f64;
    for bin in &result.histogram {
        let g: String = "#".repeat((bin.genuine as f64 / scored * 60.0) as usize);
        let i: String = "x".repeat((bin.impostor as f64 / scored * 60.0) as usize);
        let _ = writeln!(
            out,
            "{:>5.1}–{:<5.1} | {:4} {:4} | {}{}",
            bin.lower,
            bin.lower + 10.0,
            bin.genuine,
            bin.impostor,
            g,
            i
        );
    }
    out
}

/// Serialize the evaluation result to JSON for downstream consumption.
pub fn to_json(result: &EvalResult) -> String {
    serde_json::json!({
        "n_sessions":    result.n_sessions,
        "n_enroll":      result.n_enroll,
        "n_genuine":     result.n_genuine,
        "n_impostor":    result.n_impostor,
        "n_errors":      result.n_errors,
        "threshold":     result.threshold,
        "max_risk":      result.max_risk,
        "far":           result.counts.far(),
        "frr":           result.counts.frr(),
        "accuracy":      result.counts.accuracy(),
        "eer":           result.eer,
        "eer_threshold": result.eer_threshold,
        "counts":        result.counts,
        "per_user":      result.per_user,
        "histogram":     result.histogram,
        "sweep":         result.sweep,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{equal_error_rate, histogram, sweep, ErrorCounts, ScoredSession, SessionLabel};
    use std::collections::BTreeMap;

    fn result() -> EvalResult {
        let scored = vec![
            ScoredSession { user_id: "u1".into(), label: SessionLabel::Genuine, confidence: 91.0, risk: 12.0, accepted: true },
            ScoredSession { user_id: "u1".into(), label: SessionLabel::Impostor, confidence: 44.0, risk: 70.0, accepted: false },
        ];
        let mut counts = ErrorCounts::default();
        for s in &scored {
            counts.record(s.label, s.accepted);
        }
        let sweep = sweep(&scored, 0.5);
        let (eer, eer_threshold) = equal_error_rate(&sweep);
        EvalResult {
            n_sessions: 3,
            n_enroll: 1,
            n_genuine: 1,
            n_impostor: 1,
            n_errors: 0,
            threshold: 70.0,
            max_risk: 50.0,
            per_user: BTreeMap::from([("u1".to_string(), counts.clone())]),
            counts,
            eer,
            eer_threshold,
            histogram: histogram(&scored),
            sweep,
            scored,
        }
    }

    #[test]
    fn markdown_has_headline_metrics() {
        let md = render_markdown(&result());
        assert!(md.starts_with("# Tactus Evaluation Report"));
        assert!(md.contains("| FAR      | 0.0000 |"));
        assert!(md.contains("| EER      | 0.0000 |"));
        assert!(md.contains("| u1 |"));
        assert!(md.contains("|  70.0 | 0.0000 | 0.0000 |"));
    }

    #[test]
    fn json_round_trips_through_value() {
        let v: serde_json::Value = serde_json::from_str(&to_json(&result())).unwrap();
        assert_eq!(v["n_genuine"], 1);
        assert_eq!(v["far"], 0.0);
        assert_eq!(v["counts"]["impostor_rejected"], 1);
        assert_eq!(v["histogram"].as_array().unwrap().len(), 10);
    }
}
