// tactus/src/capture/touch.rs
//
// Touch segmentation: Tap | Swipe | Pinch.
//
// Each touch identifier is tracked independently. A touch that starts while
// exactly one unpaired touch is down forms a pinch pair with it; the pair is
// reconciled when the first of the two lifts (one Pinch is emitted and the
// partner's later release produces nothing). Single touches follow the same
// tie-break as pointer presses:
//   travel < 10 px                         → Tap
//   travel ≤ 20 px and duration < 300 ms   → Tap
//   anything else                          → Swipe
// Cancelled touches are discarded, and cancelling one finger of a pair
// discards the pinch.

use std::collections::BTreeMap;

use crate::capture::pattern::{path_stats, Direction, Pattern, Pinch, Point, Swipe, Tap};
use crate::capture::{CaptureState, Capturer};
use crate::config::CaptureConfig;
use crate::events::{InputEvent, Modality, RawSample};

struct Track {
    points:    Vec<Point>,
    pressures: Vec<f64>,
    areas:     Vec<f64>,
    partner:   Option<u32>,
    /// Set once the pair's pinch has been emitted or discarded.
    consumed:  bool,
}

impl Track {
    fn new(p: Point, pressure: Option<f64>, area: Option<f64>) -> Self {
        Self {
            points:    vec![p],
            pressures: pressure.into_iter().collect(),
            areas:     area.into_iter().collect(),
            partner:   None,
            consumed:  false,
        }
    }

    fn last(&self) -> Point {
        self.points[self.points.len() - 1]
    }
}

struct PairOrigin {
    start_ms: f64,
    a:        Point,
    b:        Point,
}

pub struct TouchCapturer {
    cfg:    CaptureConfig,
    state:  CaptureState,
    active: BTreeMap<u32, Track>,
    pairs:  BTreeMap<(u32, u32), PairOrigin>,
    out:    Vec<Pattern>,
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 }
}

fn pair_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

impl TouchCapturer {
    pub fn new(cfg: &CaptureConfig) -> Self {
        Self {
            cfg:    cfg.clone(),
            state:  CaptureState::Idle,
            active: BTreeMap::new(),
            pairs:  BTreeMap::new(),
            out:    Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.active.clear();
        self.pairs.clear();
        self.out.clear();
    }

    fn begin(&mut self, id: u32, p: Point, pressure: Option<f64>, area: Option<f64>) {
        let mut track = Track::new(p, pressure, area);

        let lone: Vec<u32> = self
            .active
            .iter()
            .filter(|(_, t)| t.partner.is_none() && !t.consumed)
            .map(|(id, _)| *id)
            .collect();
        if let [other] = lone.as_slice() {
            let other = *other;
            if let Some(o) = self.active.get_mut(&other) {
                o.partner = Some(id);
                track.partner = Some(other);
                let (a, b) = if other < id { (o.last(), p) } else { (p, o.last()) };
                self.pairs.insert(pair_key(id, other), PairOrigin { start_ms: p.t_ms, a, b });
            }
        }
        self.active.insert(id, track);
    }

    fn finish(&mut self, id: u32, end: Option<Point>) {
        let Some(mut track) = self.active.remove(&id) else { return };
        if let Some(p) = end {
            track.points.push(p);
        }
        if track.consumed {
            return;
        }

        if let Some(partner) = track.partner {
            let origin = self.pairs.remove(&pair_key(id, partner));
            if let (Some(origin), Some(other)) = (origin, self.active.get_mut(&partner)) {
                other.consumed = true;
                let (a, b) = if id < partner { (track.last(), other.last()) } else { (other.last(), track.last()) };
                let d0 = origin.a.distance(&origin.b);
                let d1 = a.distance(&b);
                let angle0 = (origin.b.y - origin.a.y).atan2(origin.b.x - origin.a.x);
                let angle1 = (b.y - a.y).atan2(b.x - a.x);
                let mut rotation = angle1 - angle0;
                if rotation > std::f64::consts::PI {
                    rotation -= 2.0 * std::f64::consts::PI;
                } else if rotation < -std::f64::consts::PI {
                    rotation += 2.0 * std::f64::consts::PI;
                }
                self.out.push(Pattern::Pinch(Pinch {
                    start_ms:     origin.start_ms,
                    end_ms:       track.last().t_ms.max(origin.start_ms),
                    scale_change: if d0 > 0.0 { d1 / d0 } else { 1.0 },
                    rotation,
                }));
            }
            return;
        }

        let first = track.points[0];
        let last  = track.last();
        let travel   = first.distance(&last);
        let duration = (last.t_ms - first.t_ms).max(0.0);
        let discrete = travel < self.cfg.tap_max_distance_px
            || (travel <= self.cfg.continuous_min_distance_px && duration < self.cfg.tap_max_duration_ms);

        if discrete {
            self.out.push(Pattern::Tap(Tap {
                start_ms:      first.t_ms,
                end_ms:        first.t_ms + duration,
                dwell_ms:      duration,
                pressure_mean: mean(&track.pressures),
                pressure_max:  track.pressures.iter().copied().fold(0.0, f64::max),
                contact_area:  mean(&track.areas),
            }));
        } else {
            let kin = path_stats(&track.points);
            let span_s = (duration / 1000.0).max(0.001);
            self.out.push(Pattern::Swipe(Swipe {
                start_ms:      first.t_ms,
                end_ms:        first.t_ms + duration,
                direction:     Direction::of(last.x - first.x, last.y - first.y),
                distance:      travel,
                velocity:      travel / span_s,
                curvature:     kin.curvature,
                pressure_mean: mean(&track.pressures),
                contact_area:  mean(&track.areas),
                points:        track.points,
            }));
        }
    }

    fn cancel(&mut self, id: u32) {
        if let Some(track) = self.active.remove(&id) {
            if let Some(partner) = track.partner {
                self.pairs.remove(&pair_key(id, partner));
                if let Some(other) = self.active.get_mut(&partner) {
                    other.consumed = true;
                }
            }
        }
    }
}

impl Capturer for TouchCapturer {
    fn modality(&self) -> Modality {
        Modality::Touch
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn start(&mut self) {
        self.reset();
        self.state = CaptureState::Capturing;
    }

    fn push(&mut self, sample: &RawSample) {
        if self.state != CaptureState::Capturing {
            return;
        }
        let t = sample.t_ms;
        match sample.event {
            InputEvent::TouchStart { id, x, y, pressure, area } => {
                if self.active.contains_key(&id) {
                    self.finish(id, None); // lost end event for a reused id
                }
                self.begin(id, Point::new(x, y, t), pressure, area);
            }
            InputEvent::TouchMove { id, x, y, pressure, area } => {
                if let Some(track) = self.active.get_mut(&id) {
                    track.points.push(Point::new(x, y, t));
                    track.pressures.extend(pressure);
                    track.areas.extend(area);
                }
            }
            InputEvent::TouchEnd { id, x, y } => self.finish(id, Some(Point::new(x, y, t))),
            InputEvent::TouchCancel { id } => self.cancel(id),
            _ => {}
        }
    }

    fn stop(&mut self) -> Vec<Pattern> {
        let ids: Vec<u32> = self.active.keys().copied().collect();
        for id in ids {
            self.finish(id, None);
        }
        let mut out = std::mem::take(&mut self.out);
        out.sort_by(|a, b| a.start_ms().total_cmp(&b.start_ms()));
        self.reset();
        self.state = CaptureState::Idle;
        out
    }

    fn abort(&mut self) {
        self.reset();
        self.state = CaptureState::Idle;
    }
}
