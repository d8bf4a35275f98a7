// tactus/src/features/pointer.rs
//
// Pointer feature layout (26 dims):
//   [0..7)   movement velocity summary       (px/s)
//   [7..14)  movement acceleration summary   (px/s per ms)
//   [14..17) curvature mean, std, max
//   [17]     mean direction changes per movement
//   [18..20) click dwell mean, std           (ms)
//   [20]     mean scroll speed
//   [21]     mean drag velocity              (px/s)
//   [22..26) counts: movement, click, scroll, drag

use crate::capture::pattern::{accelerations, velocities, Pattern};
use crate::features::stats::{mean, std_dev, Summary};

pub const DIMS: usize = 26;

pub fn extract(patterns: &[Pattern]) -> Vec<f64> {
    let mut vel        = Vec::new();
    let mut acc        = Vec::new();
    let mut curvature  = Vec::new();
    let mut dir_change = Vec::new();
    let mut dwell      = Vec::new();
    let mut scroll     = Vec::new();
    let mut drag       = Vec::new();
    let mut counts     = [0usize; 4];

    for p in patterns {
        match p {
            Pattern::Movement(m) => {
                counts[0] += 1;
                vel.extend(velocities(&m.points));
                acc.extend(accelerations(&m.points).into_iter().map(|a| a / 1000.0));
                curvature.push(m.kinematics.curvature);
                dir_change.push(m.kinematics.direction_changes as f64);
            }
            Pattern::Click(c) => {
                counts[1] += 1;
                dwell.push(c.dwell_ms);
            }
            Pattern::Scroll(s) => {
                counts[2] += 1;
                scroll.push(s.speed);
            }
            Pattern::Drag(d) => {
                counts[3] += 1;
                drag.push(d.velocity);
            }
            Pattern::Keystroke(_) | Pattern::Tap(_) | Pattern::Swipe(_) | Pattern::Pinch(_) => {}
        }
    }

    let mut out = Vec::with_capacity(DIMS);
    Summary::of(&vel).push_into(&mut out);
    Summary::of(&acc).push_into(&mut out);
    let curv = Summary::of(&curvature);
    out.extend_from_slice(&[curv.mean, curv.std, curv.max]);
    out.push(mean(&dir_change));
    out.extend_from_slice(&[mean(&dwell), std_dev(&dwell)]);
    out.push(mean(&scroll));
    out.push(mean(&drag));
    out.extend(counts.iter().map(|c| *c as f64));
    out
}
