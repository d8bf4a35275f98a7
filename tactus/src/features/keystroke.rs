// tactus/src/features/keystroke.rs
//
// Keystroke feature layout (22 dims):
//   [0..7)   dwell time summary            (ms)
//   [7..14)  flight time summary           (ms, release → next press, per window)
//   [14]     rhythm: CV of inter-press intervals
//   [15]     typing speed                  (strokes per active second)
//   [16]     stroke count
//   [17..22) mean dwell for ' ', e, t, a, o (ms, 0 when unseen)

use crate::capture::pattern::{Keystroke, Pattern};
use crate::features::stats::{cv, mean, Summary};

pub const DIMS: usize = 22;

/// Most frequent keys in running text; per-key dwell is tracked for these.
const FREQUENT_KEYS: [&str; 5] = [" ", "e", "t", "a", "o"];

fn normalize_key(key: &str) -> String {
    let k = key.to_lowercase();
    if k == "space" || k == "spacebar" { " ".to_string() } else { k }
}

pub fn extract(patterns: &[Pattern]) -> Vec<f64> {
    let windows: Vec<&[Keystroke]> = patterns
        .iter()
        .filter_map(|p| match p {
            Pattern::Keystroke(w) => Some(w.strokes.as_slice()),
            _ => None,
        })
        .collect();

    let mut dwell     = Vec::new();
    let mut flight    = Vec::new();
    let mut intervals = Vec::new();
    let mut active_ms = 0.0;
    let mut per_key: Vec<Vec<f64>> = vec![Vec::new(); FREQUENT_KEYS.len()];

    for strokes in &windows {
        for s in strokes.iter() {
            dwell.push(s.duration_ms);
            let key = normalize_key(&s.key);
            if let Some(i) = FREQUENT_KEYS.iter().position(|k| *k == key) {
                per_key[i].push(s.duration_ms);
            }
        }
        for w in strokes.windows(2) {
            flight.push(w[1].press_ms - w[0].release_ms);
            intervals.push(w[1].press_ms - w[0].press_ms);
        }
        if let (Some(first), Some(last)) = (strokes.first(), strokes.last()) {
            active_ms += (last.release_ms - first.press_ms).max(0.0);
        }
    }

    let mut out = Vec::with_capacity(DIMS);
    Summary::of(&dwell).push_into(&mut out);
    Summary::of(&flight).push_into(&mut out);
    out.push(cv(&intervals));
    out.push(if active_ms > 0.0 { dwell.len() as f64 / (active_ms / 1000.0) } else { 0.0 });
    out.push(dwell.len() as f64);
    out.extend(per_key.iter().map(|v| mean(v)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pattern::KeystrokeWindow;

    fn window(strokes: &[(&str, f64, f64)]) -> Pattern {
        let strokes: Vec<Keystroke> = strokes
            .iter()
            .map(|(k, p, r)| Keystroke { key: k.to_string(), press_ms: *p, release_ms: *r, duration_ms: r - p })
            .collect();
        Pattern::Keystroke(KeystrokeWindow {
            start_ms: strokes[0].press_ms,
            end_ms:   strokes[strokes.len() - 1].release_ms,
            strokes,
        })
    }

    #[test]
    fn layout_is_fixed() {
        assert_eq!(extract(&[]).len(), DIMS);
        assert_eq!(extract(&[window(&[("a", 0.0, 100.0)])]).len(), DIMS);
    }

    #[test]
    fn flight_is_measured_within_windows_only() {
        let a = window(&[("t", 0.0, 100.0), ("e", 150.0, 240.0)]);
        let b = window(&[("a", 9_000.0, 9_080.0)]);
        let v = extract(&[a, b]);
        // one flight: 150 - 100
        assert_eq!(v[7], 50.0);
        assert_eq!(v[16], 3.0);
    }

    #[test]
    fn frequent_key_dwell_is_tracked_case_insensitively() {
        let v = extract(&[window(&[("E", 0.0, 120.0), ("Space", 200.0, 260.0), ("x", 300.0, 390.0)])]);
        assert_eq!(v[17], 60.0); // space
        assert_eq!(v[18], 120.0); // e
        assert_eq!(v[19], 0.0); // t unseen
    }
}
