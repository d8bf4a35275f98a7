// tactus/src/features/touch.rs
//
// Touch feature layout (32 dims):
//   [0..7)   tap dwell summary               (ms)
//   [7..14)  pressure summary                (taps and swipes)
//   [14..17) contact area mean, std, max
//   [17..24) swipe velocity summary          (px/s)
//   [24..26) swipe curvature mean, std
//   [26..28) pinch scale change mean, std
//   [28]     mean |pinch rotation|           (rad)
//   [29..32) counts: tap, swipe, pinch

use crate::capture::pattern::Pattern;
use crate::features::stats::{mean, std_dev, Summary};

pub const DIMS: usize = 32;

pub fn extract(patterns: &[Pattern]) -> Vec<f64> {
    let mut dwell     = Vec::new();
    let mut pressure  = Vec::new();
    let mut area      = Vec::new();
    let mut swipe_v   = Vec::new();
    let mut swipe_c   = Vec::new();
    let mut scale     = Vec::new();
    let mut rotation  = Vec::new();
    let mut counts    = [0usize; 3];

    for p in patterns {
        match p {
            Pattern::Tap(t) => {
                counts[0] += 1;
                dwell.push(t.dwell_ms);
                if t.pressure_mean > 0.0 {
                    pressure.push(t.pressure_mean);
                }
                if t.contact_area > 0.0 {
                    area.push(t.contact_area);
                }
            }
            Pattern::Swipe(s) => {
                counts[1] += 1;
                swipe_v.push(s.velocity);
                swipe_c.push(s.curvature);
                if s.pressure_mean > 0.0 {
                    pressure.push(s.pressure_mean);
                }
                if s.contact_area > 0.0 {
                    area.push(s.contact_area);
                }
            }
            Pattern::Pinch(p) => {
                counts[2] += 1;
                scale.push(p.scale_change);
                rotation.push(p.rotation.abs());
            }
            Pattern::Keystroke(_) | Pattern::Movement(_) | Pattern::Click(_) | Pattern::Scroll(_) | Pattern::Drag(_) => {}
        }
    }

    let mut out = Vec::with_capacity(DIMS);
    Summary::of(&dwell).push_into(&mut out);
    Summary::of(&pressure).push_into(&mut out);
    let a = Summary::of(&area);
    out.extend_from_slice(&[a.mean, a.std, a.max]);
    Summary::of(&swipe_v).push_into(&mut out);
    out.extend_from_slice(&[mean(&swipe_c), std_dev(&swipe_c)]);
    out.extend_from_slice(&[mean(&scale), std_dev(&scale)]);
    out.push(mean(&rotation));
    out.extend(counts.iter().map(|c| *c as f64));
    out
}
