// tactus/src/features/behavioral.rs
//
// Cross-modal timing features, derived from every pattern of the attempt.
//
// Layout (9 dims):
//   [0]  pattern rate          (patterns per second of span)
//   [1]  mean gap              (ms, next start − previous end, floored at 0)
//   [2]  gap std               (ms)
//   [3]  gap CV
//   [4]  idle ratio            (fraction of gaps longer than 500 ms)
//   [5]  keystroke share       (of evidence units)
//   [6]  pointer share
//   [7]  touch share
//   [8]  span                  (s, first start → last end)

use crate::capture::pattern::Pattern;
use crate::events::Modality;
use crate::features::stats::{cv, mean, std_dev};

pub const DIMS: usize = 9;

const IDLE_GAP_MS: f64 = 500.0;

pub fn extract(patterns: &[Pattern]) -> Vec<f64> {
    let mut out = vec![0.0; DIMS];
    if patterns.is_empty() {
        return out;
    }

    let mut ordered: Vec<&Pattern> = patterns.iter().collect();
    ordered.sort_by(|a, b| a.start_ms().total_cmp(&b.start_ms()));

    let first = ordered[0].start_ms();
    let last  = ordered.iter().map(|p| p.end_ms()).fold(f64::MIN, f64::max);
    let span_ms = (last - first).max(0.0);

    let gaps: Vec<f64> = ordered
        .windows(2)
        .map(|w| (w[1].start_ms() - w[0].end_ms()).max(0.0))
        .collect();
    let idle = gaps.iter().filter(|g| **g > IDLE_GAP_MS).count();

    let mut units = [0usize; 3];
    for p in patterns {
        let slot = match p.modality() {
            Modality::Keystroke => 0,
            Modality::Pointer   => 1,
            Modality::Touch     => 2,
            Modality::Behavioral => continue,
        };
        units[slot] += p.units();
    }
    let total_units = units.iter().sum::<usize>().max(1) as f64;

    out[0] = if span_ms > 0.0 { patterns.len() as f64 / (span_ms / 1000.0) } else { 0.0 };
    out[1] = mean(&gaps);
    out[2] = std_dev(&gaps);
    out[3] = cv(&gaps);
    out[4] = if gaps.is_empty() { 0.0 } else { idle as f64 / gaps.len() as f64 };
    out[5] = units[0] as f64 / total_units;
    out[6] = units[1] as f64 / total_units;
    out[7] = units[2] as f64 / total_units;
    out[8] = span_ms / 1000.0;
    out
}
