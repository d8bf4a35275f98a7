// tactus/src/capture/pointer.rs
//
// Pointer segmentation: Movement | Click | Scroll | Drag.
//
// Press classification (down → up):
//   travel < 10 px                         → Click (long presses included)
//   travel ≤ 20 px and duration < 300 ms   → Click
//   anything else                          → Drag
//
// Free movement (no button held) is one segment until the pointer pauses for
// `movement_pause_ms` or a button goes down. A segment becomes a Movement only
// with ≥5 samples spanning ≥50 ms; shorter fragments are held back and merged
// into a single Movement at stop() if together they reach that minimum.
//
// A Click stays pending until the next movement segment finishes, so it can
// carry both the movement that led into it and the one that followed.
// Scroll gestures are runs of wheel events separated by less than
// `scroll_gap_ms`.

use crate::capture::pattern::{path_stats, Click, Direction, Drag, Movement, PathStats, Pattern, Point, Scroll};
use crate::capture::{CaptureState, Capturer};
use crate::config::CaptureConfig;
use crate::events::{InputEvent, Modality, RawSample};

struct Press {
    button: u8,
    path:   Vec<Point>,
    pre:    Option<PathStats>,
}

struct ScrollRun {
    start_ms: f64,
    last_ms:  f64,
    dx:       f64,
    dy:       f64,
    ticks:    u32,
}

pub struct PointerCapturer {
    cfg:           CaptureConfig,
    state:         CaptureState,
    path:          Vec<Point>,
    fragments:     Vec<Point>,
    last_movement: Option<PathStats>,
    press:         Option<Press>,
    pending_click: Option<Click>,
    scroll:        Option<ScrollRun>,
    out:           Vec<Pattern>,
}

impl PointerCapturer {
    pub fn new(cfg: &CaptureConfig) -> Self {
        Self {
            cfg:           cfg.clone(),
            state:         CaptureState::Idle,
            path:          Vec::new(),
            fragments:     Vec::new(),
            last_movement: None,
            press:         None,
            pending_click: None,
            scroll:        None,
            out:           Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.path.clear();
        self.fragments.clear();
        self.last_movement = None;
        self.press         = None;
        self.pending_click = None;
        self.scroll        = None;
        self.out.clear();
    }

    fn viable(&self, points: &[Point]) -> bool {
        points.len() >= self.cfg.min_movement_samples
            && points.last().map(|l| l.t_ms - points[0].t_ms).unwrap_or(0.0) >= self.cfg.min_movement_ms
    }

    /// Terminate the current free-movement segment.
    fn end_segment(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let points = std::mem::take(&mut self.path);
        if self.viable(&points) {
            let kinematics = path_stats(&points);
            if let Some(mut click) = self.pending_click.take() {
                click.post_movement = Some(kinematics);
                self.out.push(Pattern::Click(click));
            }
            self.last_movement = Some(kinematics);
            self.out.push(Pattern::Movement(Movement {
                start_ms: points[0].t_ms,
                end_ms:   points[points.len() - 1].t_ms,
                points,
                kinematics,
            }));
        } else {
            self.fragments.extend(points);
        }
    }

    fn flush_click(&mut self) {
        if let Some(click) = self.pending_click.take() {
            self.out.push(Pattern::Click(click));
        }
    }

    fn close_scroll(&mut self) {
        if let Some(run) = self.scroll.take() {
            let delta = if run.dy.abs() >= run.dx.abs() { run.dy } else { run.dx };
            let span_s = ((run.last_ms - run.start_ms) / 1000.0).max(0.001);
            self.out.push(Pattern::Scroll(Scroll {
                start_ms:  run.start_ms,
                end_ms:    run.last_ms,
                direction: Direction::of(run.dx, run.dy),
                delta,
                speed:     delta.abs() / span_s,
                ticks:     run.ticks,
            }));
        }
    }

    fn release(&mut self, press: Press) {
        let path = press.path;
        let (first, last) = match (path.first(), path.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return,
        };
        let travel   = first.distance(&last);
        let duration = last.t_ms - first.t_ms;
        let discrete = travel < self.cfg.tap_max_distance_px
            || (travel <= self.cfg.continuous_min_distance_px && duration < self.cfg.tap_max_duration_ms);

        if discrete {
            self.pending_click = Some(Click {
                start_ms:      first.t_ms,
                end_ms:        last.t_ms,
                button:        press.button,
                dwell_ms:      duration,
                pre_movement:  press.pre,
                post_movement: None,
            });
        } else {
            let span_s = (duration / 1000.0).max(0.001);
            self.out.push(Pattern::Drag(Drag {
                start_ms: first.t_ms,
                end_ms:   last.t_ms,
                button:   press.button,
                start:    first,
                end:      last,
                distance: travel,
                velocity: travel / span_s,
                points:   path,
            }));
        }
    }
}

impl Capturer for PointerCapturer {
    fn modality(&self) -> Modality {
        Modality::Pointer
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

        let scroll_expired = self.scroll.as_ref().map(|r| t - r.last_ms >= self.cfg.scroll_gap_ms).unwrap_or(false);
        if scroll_expired {
            self.close_scroll();
        }

        match sample.event {
            InputEvent::PointerMove { x, y } => {
                let p = Point::new(x, y, t);
                if let Some(press) = self.press.as_mut() {
                    press.path.push(p);
                    return;
                }
                let paused = self.path.last().map(|l| t - l.t_ms > self.cfg.movement_pause_ms).unwrap_or(false);
                if paused {
                    self.end_segment();
                }
                self.path.push(p);
            }
            InputEvent::PointerDown { x, y, button } => {
                self.end_segment();
                self.flush_click();
                if let Some(prev) = self.press.take() {
                    self.release(prev); // missed up event
                    self.flush_click();
                }
                self.press = Some(Press {
                    button,
                    path: vec![Point::new(x, y, t)],
                    pre:  self.last_movement.take(),
                });
            }
            InputEvent::PointerUp { x, y, .. } => {
                if let Some(mut press) = self.press.take() {
                    press.path.push(Point::new(x, y, t));
                    self.release(press);
                }
            }
            InputEvent::Wheel { dx, dy } => {
                let run = self.scroll.get_or_insert(ScrollRun { start_ms: t, last_ms: t, dx: 0.0, dy: 0.0, ticks: 0 });
                run.last_ms = t;
                run.dx += dx;
                run.dy += dy;
                run.ticks += 1;
            }
            _ => {}
        }
    }

    fn stop(&mut self) -> Vec<Pattern> {
        // Finalize whatever is in flight.
        self.end_segment();
        if let Some(press) = self.press.take() {
            self.release(press);
        }
        self.flush_click();
        self.close_scroll();

        let mut fragments = std::mem::take(&mut self.fragments);
        fragments.sort_by(|a, b| a.t_ms.total_cmp(&b.t_ms));
        if self.viable(&fragments) {
            let kinematics = path_stats(&fragments);
            self.out.push(Pattern::Movement(Movement {
                start_ms: fragments[0].t_ms,
                end_ms:   fragments[fragments.len() - 1].t_ms,
                points:   fragments,
                kinematics,
            }));
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
