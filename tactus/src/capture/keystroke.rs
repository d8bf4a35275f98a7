// tactus/src/capture/keystroke.rs
//
// Keystroke segmentation.
//
// A stroke is emitted only on key release. Auto-repeat key-downs while a key
// is already held are ignored, as are releases with no matching press.
// Strokes are grouped into typing bursts: an idle gap of at least
// `keystroke_burst_gap_ms` since the previous key event closes the current
// window. Keys still held at stop() are closed at the last key event seen.

use std::collections::HashMap;

use crate::capture::pattern::{Keystroke, KeystrokeWindow, Pattern};
use crate::capture::{CaptureState, Capturer};
use crate::config::CaptureConfig;
use crate::events::{InputEvent, Modality, RawSample};

pub struct KeystrokeCapturer {
    burst_gap_ms: f64,
    state:        CaptureState,
    held:         HashMap<String, f64>,
    strokes:      Vec<Keystroke>,
    last_event:   Option<f64>,
    windows:      Vec<Pattern>,
}

impl KeystrokeCapturer {
    pub fn new(cfg: &CaptureConfig) -> Self {
        Self {
            burst_gap_ms: cfg.keystroke_burst_gap_ms,
            state:        CaptureState::Idle,
            held:         HashMap::new(),
            strokes:      Vec::new(),
            last_event:   None,
            windows:      Vec::new(),
        }
    }

    fn close_window(&mut self) {
        if self.strokes.is_empty() {
            return;
        }
        let mut strokes = std::mem::take(&mut self.strokes);
        strokes.sort_by(|a, b| a.press_ms.total_cmp(&b.press_ms));
        let start_ms = strokes.iter().map(|s| s.press_ms).fold(f64::INFINITY, f64::min);
        let end_ms   = strokes.iter().map(|s| s.release_ms).fold(f64::NEG_INFINITY, f64::max);
        self.windows.push(Pattern::Keystroke(KeystrokeWindow { start_ms, end_ms, strokes }));
    }

    /// Release every held key at the last key event time.
    fn release_held(&mut self) {
        let held: Vec<(String, f64)> = self.held.drain().collect();
        for (key, press_ms) in held {
            let release_ms = self.last_event.unwrap_or(press_ms).max(press_ms);
            self.strokes.push(Keystroke { key, press_ms, release_ms, duration_ms: release_ms - press_ms });
        }
    }

    fn reset(&mut self) {
        self.held.clear();
        self.strokes.clear();
        self.windows.clear();
        self.last_event = None;
    }
}

impl Capturer for KeystrokeCapturer {
    fn modality(&self) -> Modality {
        Modality::Keystroke
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
        match &sample.event {
            InputEvent::KeyDown { key } => {
                if self.held.contains_key(key) {
                    return; // auto-repeat
                }
                let idle = self.last_event.map(|last| t - last >= self.burst_gap_ms).unwrap_or(false);
                if idle && self.held.is_empty() {
                    self.close_window();
                }
                self.held.insert(key.clone(), t);
                self.last_event = Some(t);
            }
            InputEvent::KeyUp { key } => {
                if let Some(press_ms) = self.held.remove(key) {
                    let release_ms = t.max(press_ms);
                    self.strokes.push(Keystroke {
                        key: key.clone(),
                        press_ms,
                        release_ms,
                        duration_ms: release_ms - press_ms,
                    });
                    self.last_event = Some(t);
                }
            }
            _ => {}
        }
    }

    fn stop(&mut self) -> Vec<Pattern> {
        self.release_held();
        self.close_window();
        let out = std::mem::take(&mut self.windows);
        self.reset();
        self.state = CaptureState::Idle;
        out
    }

    fn abort(&mut self) {
        self.reset();
        self.state = CaptureState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(t: f64, k: &str) -> RawSample {
        RawSample::new(t, InputEvent::KeyDown { key: k.into() })
    }
    fn up(t: f64, k: &str) -> RawSample {
        RawSample::new(t, InputEvent::KeyUp { key: k.into() })
    }

    fn run(samples: &[RawSample]) -> Vec<Pattern> {
        let mut c = KeystrokeCapturer::new(&CaptureConfig::default());
        c.start();
        for s in samples {
            c.push(s);
        }
        c.stop()
    }

    #[test]
    fn strokes_are_emitted_on_release_in_press_order() {
        // overlapping: h pressed, e pressed, h released, e released
        let out = run(&[down(0.0, "h"), down(50.0, "e"), up(90.0, "h"), up(130.0, "e")]);
        assert_eq!(out.len(), 1);
        let Pattern::Keystroke(w) = &out[0] else { panic!("expected keystroke window") };
        assert_eq!(w.strokes.len(), 2);
        assert_eq!(w.strokes[0].key, "h");
        assert_eq!(w.strokes[0].duration_ms, 90.0);
        assert_eq!(w.strokes[1].duration_ms, 80.0);
        assert_eq!((w.start_ms, w.end_ms), (0.0, 130.0));
    }

    #[test]
    fn autorepeat_and_orphan_releases_are_ignored() {
        let out = run(&[down(0.0, "a"), down(30.0, "a"), down(60.0, "a"), up(100.0, "a"), up(120.0, "z")]);
        let Pattern::Keystroke(w) = &out[0] else { panic!() };
        assert_eq!(w.strokes.len(), 1);
        assert_eq!(w.strokes[0].duration_ms, 100.0);
    }

    #[test]
    fn idle_gap_splits_windows() {
        let out = run(&[down(0.0, "a"), up(80.0, "a"), down(5_000.0, "b"), up(5_090.0, "b")]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.end_ms() >= p.start_ms()));
    }

    #[test]
    fn held_keys_at_stop_are_closed_at_the_last_event() {
        let out = run(&[down(0.0, "a"), down(40.0, "b"), up(120.0, "a")]);
        assert_eq!(out.len(), 1);
        let Pattern::Keystroke(w) = &out[0] else { panic!("expected keystroke window") };
        assert_eq!(w.strokes.len(), 2);
        assert_eq!(w.strokes[1].key, "b");
        assert_eq!((w.strokes[1].press_ms, w.strokes[1].release_ms), (40.0, 120.0));
        assert_eq!(w.end_ms, 120.0);

        // pressed last and never released: zero-length, still kept
        let out = run(&[down(0.0, "a"), up(80.0, "a"), down(100.0, "b")]);
        assert_eq!(out[0].units(), 2);
    }

    #[test]
    fn samples_before_start_and_after_abort_are_ignored() {
        let mut c = KeystrokeCapturer::new(&CaptureConfig::default());
        c.push(&down(0.0, "a"));
        c.start();
        c.push(&down(10.0, "b"));
        c.abort();
        assert_eq!(c.state(), CaptureState::Idle);
        c.push(&up(20.0, "b"));
        assert!(c.stop().is_empty());
    }
}
