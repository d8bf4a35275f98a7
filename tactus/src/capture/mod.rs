// tactus/src/capture/mod.rs
//
// Modality capturers.
//
// Each capturer is a small synchronous state machine (Idle → Capturing → Idle)
// that turns RawSamples into Patterns. `drive()` runs one capturer as an async
// task draining a bounded sample channel until one of:
//   - the caller signals Stop          → in-flight patterns are finalized
//   - the planned sampling budget ends → in-flight patterns are finalized
//   - the input layer closes the channel
//   - the caller signals Abort         → everything is discarded

pub mod keystroke;
pub mod pattern;
pub mod pointer;
pub mod touch;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::CaptureConfig;
use crate::events::{Modality, RawSample};

pub use keystroke::KeystrokeCapturer;
pub use pattern::Pattern;
pub use pointer::PointerCapturer;
pub use touch::TouchCapturer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

pub trait Capturer: Send {
    fn modality(&self) -> Modality;
    fn state(&self) -> CaptureState;
    /// Reset all buffers and begin consuming samples.
    fn start(&mut self);
    /// Feed one sample. Ignored unless capturing.
    fn push(&mut self, sample: &RawSample);
    /// Finalize in-flight patterns and return everything, ordered by start time.
    fn stop(&mut self) -> Vec<Pattern>;
    /// Discard everything. Never fails.
    fn abort(&mut self);
}

/// Build the capturer for a captured modality. Behavioral has none.
pub fn capturer_for(modality: Modality, cfg: &CaptureConfig) -> Option<Box<dyn Capturer>> {
    match modality {
        Modality::Keystroke  => Some(Box::new(KeystrokeCapturer::new(cfg))),
        Modality::Pointer    => Some(Box::new(PointerCapturer::new(cfg))),
        Modality::Touch      => Some(Box::new(TouchCapturer::new(cfg))),
        Modality::Behavioral => None,
    }
}

/// Segment a prerecorded sample list in one pass.
pub fn segment(modality: Modality, cfg: &CaptureConfig, samples: &[RawSample]) -> Vec<Pattern> {
    let Some(mut capturer) = capturer_for(modality, cfg) else { return Vec::new() };
    capturer.start();
    for s in samples.iter().filter(|s| s.modality() == modality) {
        capturer.push(s);
    }
    capturer.stop()
}

// ── Async driver ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureControl {
    Run,
    Stop,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Stopped,
    Deadline,
    InputClosed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub modality: Modality,
    pub patterns: Vec<Pattern>,
    pub samples:  usize,
    pub ended_by: CaptureEnd,
}

pub async fn drive(
    mut capturer: Box<dyn Capturer>,
    mut rx:       mpsc::Receiver<RawSample>,
    mut ctrl:     watch::Receiver<CaptureControl>,
    budget:       Duration,
) -> CaptureOutcome {
    let modality = capturer.modality();
    capturer.start();
    let mut samples = 0usize;

    let deadline = tokio::time::sleep(budget);
    tokio::pin!(deadline);

    let ended_by = loop {
        tokio::select! {
            biased;
            changed = ctrl.changed() => {
                match changed {
                    // Session handle dropped without stop or abort.
                    Err(_) => break CaptureEnd::Aborted,
                    Ok(()) => match *ctrl.borrow_and_update() {
                        CaptureControl::Run   => {}
                        CaptureControl::Stop  => break CaptureEnd::Stopped,
                        CaptureControl::Abort => break CaptureEnd::Aborted,
                    },
                }
            }
            _ = &mut deadline => break CaptureEnd::Deadline,
            sample = rx.recv() => match sample {
                Some(s) => {
                    if s.modality() == modality {
                        capturer.push(&s);
                        samples += 1;
                    }
                }
                None => break CaptureEnd::InputClosed,
            },
        }
    };

    if ended_by == CaptureEnd::Aborted {
        capturer.abort();
        debug!("{} capture aborted after {} samples", modality, samples);
        return CaptureOutcome { modality, patterns: Vec::new(), samples, ended_by };
    }

    // Samples already delivered before an explicit stop still count.
    if ended_by == CaptureEnd::Stopped {
        while let Ok(s) = rx.try_recv() {
            if s.modality() == modality {
                capturer.push(&s);
                samples += 1;
            }
        }
    }

    let patterns = capturer.stop();
    debug!("{} capture ended ({:?}): {} samples → {} patterns", modality, ended_by, samples, patterns.len());
    CaptureOutcome { modality, patterns, samples, ended_by }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InputEvent;

    fn key(t: f64, k: &str, down: bool) -> RawSample {
        let event = if down { InputEvent::KeyDown { key: k.into() } } else { InputEvent::KeyUp { key: k.into() } };
        RawSample::new(t, event)
    }

    #[test]
    fn segment_filters_foreign_modalities() {
        let samples = vec![
            key(0.0, "a", true),
            RawSample::new(5.0, InputEvent::PointerMove { x: 1.0, y: 1.0 }),
            key(80.0, "a", false),
        ];
        let out = segment(Modality::Keystroke, &CaptureConfig::default(), &samples);
        assert_eq!(out.len(), 1);
        assert!(segment(Modality::Behavioral, &CaptureConfig::default(), &samples).is_empty());
    }

    #[tokio::test]
    async fn stop_drains_queued_samples() {
        let (tx, rx) = mpsc::channel(16);
        let (ctrl_tx, ctrl_rx) = watch::channel(CaptureControl::Run);
        let cap = capturer_for(Modality::Keystroke, &CaptureConfig::default()).unwrap();
        let task = tokio::spawn(drive(cap, rx, ctrl_rx, Duration::from_secs(60)));

        tx.send(key(0.0, "a", true)).await.unwrap();
        tx.send(key(90.0, "a", false)).await.unwrap();
        ctrl_tx.send(CaptureControl::Stop).unwrap();

        let out = task.await.unwrap();
        assert_eq!(out.ended_by, CaptureEnd::Stopped);
        assert_eq!(out.samples, 2);
        assert_eq!(out.patterns.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_finalizes_partial_capture() {
        let (tx, rx) = mpsc::channel(16);
        let (_ctrl_tx, ctrl_rx) = watch::channel(CaptureControl::Run);
        let cap = capturer_for(Modality::Touch, &CaptureConfig::default()).unwrap();
        let task = tokio::spawn(drive(cap, rx, ctrl_rx, Duration::from_millis(500)));

        tx.send(RawSample::new(0.0, InputEvent::TouchStart { id: 1, x: 0.0, y: 0.0, pressure: None, area: None }))
            .await
            .unwrap();
        let out = task.await.unwrap();
        assert_eq!(out.ended_by, CaptureEnd::Deadline);
        // the touch never lifted but is finalized, not discarded
        assert_eq!(out.patterns.len(), 1);
    }

    #[tokio::test]
    async fn abort_discards_everything() {
        let (tx, rx) = mpsc::channel(16);
        let (ctrl_tx, ctrl_rx) = watch::channel(CaptureControl::Run);
        let cap = capturer_for(Modality::Keystroke, &CaptureConfig::default()).unwrap();
        let task = tokio::spawn(drive(cap, rx, ctrl_rx, Duration::from_secs(60)));

        tx.send(key(0.0, "a", true)).await.unwrap();
        tx.send(key(90.0, "a", false)).await.unwrap();
        tokio::task::yield_now().await;
        ctrl_tx.send(CaptureControl::Abort).unwrap();

        let out = task.await.unwrap();
        assert_eq!(out.ended_by, CaptureEnd::Aborted);
        assert!(out.patterns.is_empty());
    }

    #[tokio::test]
    async fn closed_input_ends_capture() {
        let (tx, rx) = mpsc::channel(16);
        let (_ctrl_tx, ctrl_rx) = watch::channel(CaptureControl::Run);
        let cap = capturer_for(Modality::Pointer, &CaptureConfig::default()).unwrap();
        let task = tokio::spawn(drive(cap, rx, ctrl_rx, Duration::from_secs(60)));
        drop(tx);
        let out = task.await.unwrap();
        assert_eq!(out.ended_by, CaptureEnd::InputClosed);
    }
}
