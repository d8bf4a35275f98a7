// Synthetic input streams shared by the integration tests.
#![allow(dead_code)]

use tactus::events::InputEvent;
use tactus::RawSample;

const KEYS: [&str; 13] = ["t", "h", "e", " ", "q", "u", "i", "c", "k", " ", "f", "o", "x"];

/// `n` keystrokes, one every `interval` ms, dwell alternating `dwell ± spread`.
pub fn typing(dwell: f64, spread: f64, interval: f64, n: usize) -> Vec<RawSample> {
    let mut out = Vec::with_capacity(2 * n);
    for i in 0..n {
        let key = KEYS[i % KEYS.len()].to_string();
        let t = i as f64 * interval;
        let d = if i % 2 == 0 { dwell + spread } else { dwell - spread };
        out.push(RawSample::new(t, InputEvent::KeyDown { key: key.clone() }));
        out.push(RawSample::new(t + d, InputEvent::KeyUp { key }));
    }
    out
}

/// `strokes` straight pointer movements of 10 samples each, 20 ms apart,
/// separated by pauses long enough to end a segment.
pub fn pointer_strokes(start_ms: f64, strokes: usize) -> Vec<RawSample> {
    let mut out = Vec::new();
    for s in 0..strokes {
        let t0 = start_ms + s as f64 * 500.0;
        for i in 0..10 {
            let x = 100.0 + i as f64 * 12.0;
            let y = 200.0 + s as f64 * 30.0 + i as f64 * 3.0;
            out.push(RawSample::new(t0 + i as f64 * 20.0, InputEvent::PointerMove { x, y }));
        }
    }
    out
}

/// `n` short taps at one spot.
pub fn taps(start_ms: f64, n: usize) -> Vec<RawSample> {
    let mut out = Vec::new();
    for i in 0..n {
        let t = start_ms + i as f64 * 300.0;
        let id = i as u32;
        out.push(RawSample::new(
            t,
            InputEvent::TouchStart { id, x: 50.0, y: 80.0, pressure: Some(0.5), area: Some(18.0) },
        ));
        out.push(RawSample::new(t + 90.0, InputEvent::TouchEnd { id, x: 51.0, y: 80.0 }));
    }
    out
}
