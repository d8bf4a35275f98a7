// tactus/src/events.rs
//
// Shared event types and all domain types flowing through Tactus.
//
//   RawSample        one hardware input event, produced by the input layer
//   SamplingContext  per-attempt snapshot consumed by the sampling controller
//   ModalityScore    matcher output for one modality
//   AuthDecision     the immutable result handed back to the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Modalities ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Keystroke,
    Pointer,
    Touch,
    Behavioral, // derived from cross-modal pattern timing, no capturer of its own
}

impl Modality {
    /// Modalities that own a capturer.
    pub const CAPTURED: [Modality; 3] = [Modality::Keystroke, Modality::Pointer, Modality::Touch];
    pub const ALL: [Modality; 4] =
        [Modality::Keystroke, Modality::Pointer, Modality::Touch, Modality::Behavioral];

    /// Fixed reliability weight used by fusion.
    pub fn reliability(self) -> f64 {
        match self {
            Self::Keystroke  => 1.0,
            Self::Pointer    => 0.9,
            Self::Touch      => 0.8,
            Self::Behavioral => 0.7,
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keystroke  => write!(f, "keystroke"),
            Self::Pointer    => write!(f, "pointer"),
            Self::Touch      => write!(f, "touch"),
            Self::Behavioral => write!(f, "behavioral"),
        }
    }
}

// ── Raw input ─────────────────────────────────────────────────────────────────

/// One hardware event. `t_ms` is the input layer's monotonic clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub t_ms:  f64,
    #[serde(flatten)]
    pub event: InputEvent,
}

impl RawSample {
    pub fn new(t_ms: f64, event: InputEvent) -> Self {
        Self { t_ms, event }
    }

    pub fn modality(&self) -> Modality {
        self.event.modality()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    KeyDown     { key: String },
    KeyUp       { key: String },
    PointerMove { x: f64, y: f64 },
    PointerDown { x: f64, y: f64, button: u8 },
    PointerUp   { x: f64, y: f64, button: u8 },
    Wheel       { dx: f64, dy: f64 },
    TouchStart  { id: u32, x: f64, y: f64, pressure: Option<f64>, area: Option<f64> },
    TouchMove   { id: u32, x: f64, y: f64, pressure: Option<f64>, area: Option<f64> },
    TouchEnd    { id: u32, x: f64, y: f64 },
    TouchCancel { id: u32 },
}

impl InputEvent {
    pub fn modality(&self) -> Modality {
        match self {
            Self::KeyDown { .. } | Self::KeyUp { .. } => Modality::Keystroke,
            Self::PointerMove { .. }
            | Self::PointerDown { .. }
            | Self::PointerUp { .. }
            | Self::Wheel { .. } => Modality::Pointer,
            Self::TouchStart { .. }
            | Self::TouchMove { .. }
            | Self::TouchEnd { .. }
            | Self::TouchCancel { .. } => Modality::Touch,
        }
    }
}

// ── Device / context ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop => write!(f, "desktop"),
            Self::Mobile  => write!(f, "mobile"),
            Self::Tablet  => write!(f, "tablet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    #[default]
    Normal,
    Focused,
    Rushed,
    Distracted,
    Fatigued,
}

/// Input modalities present on the current device, as reported by a capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub keyboard: bool,
    pub pointer:  bool,
    pub touch:    bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities { keyboard: false, pointer: false, touch: false };

    pub fn all() -> Self {
        Self { keyboard: true, pointer: true, touch: true }
    }

    pub fn supports(&self, modality: Modality) -> bool {
        match modality {
            Modality::Keystroke  => self.keyboard,
            Modality::Pointer    => self.pointer,
            Modality::Touch      => self.touch,
            Modality::Behavioral => self.keyboard || self.pointer || self.touch,
        }
    }

    /// Captured modalities available on this device, in fixed order.
    pub fn captured(&self) -> Vec<Modality> {
        Modality::CAPTURED.into_iter().filter(|m| self.supports(*m)).collect()
    }
}

/// Snapshot created fresh for each authentication attempt. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingContext {
    pub time_of_day:           u8,  // hour 0–23
    pub day_of_week:           u8,  // 0 = Monday
    pub behavior_state:        BehaviorState,
    pub network_stability:     f64, // [0,1]
    pub device_type:           DeviceType,
    pub location_consistency:  f64, // [0,1]
    pub session_duration_secs: f64,
    pub interaction_frequency: f64, // input events per minute
    pub last_confidence:       Option<f64>,
    pub recent_failures:       u32,
}

impl Default for SamplingContext {
    fn default() -> Self {
        Self {
            time_of_day:           12,
            day_of_week:           2,
            behavior_state:        BehaviorState::Normal,
            network_stability:     1.0,
            device_type:           DeviceType::Desktop,
            location_consistency:  1.0,
            session_duration_secs: 300.0,
            interaction_frequency: 60.0,
            last_confidence:       None,
            recent_failures:       0,
        }
    }
}

impl SamplingContext {
    /// Context stamped with the wall-clock hour and weekday of `now`.
    pub fn at(now: DateTime<Utc>, device_type: DeviceType) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            time_of_day: now.hour() as u8,
            day_of_week: now.weekday().num_days_from_monday() as u8,
            device_type,
            ..Self::default()
        }
    }
}

// ── Attempt lifecycle ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Planned,
    Capturing,
    Extracting,
    Matching,
    Fusing,
    Decided,
    Learning,
    Rejected,
}

impl AttemptPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Planned    => 0,
            Self::Capturing  => 1,
            Self::Extracting => 2,
            Self::Matching   => 3,
            Self::Fusing     => 4,
            Self::Decided    => 5,
            Self::Learning | Self::Rejected => 6,
        }
    }

    /// Phases only move forward; Learning and Rejected are alternatives after Decided.
    pub fn can_advance_to(self, next: AttemptPhase) -> bool {
        next.rank() == self.rank() + 1
    }
}

impl std::fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planned    => "planned",
            Self::Capturing  => "capturing",
            Self::Extracting => "extracting",
            Self::Matching   => "matching",
            Self::Fusing     => "fusing",
            Self::Decided    => "decided",
            Self::Learning   => "learning",
            Self::Rejected   => "rejected",
        };
        write!(f, "{}", s)
    }
}

// ── Scores and decisions ──────────────────────────────────────────────────────

/// Matcher output for one modality of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityScore {
    pub modality:      Modality,
    pub similarity:    f64, // [0,1] cosine vs template, 0 on cold start
    pub anomaly:       f64, // [0,1] distance to the normal pool
    pub confidence:    f64, // [0,100]
    pub pattern_count: usize,
    pub availability:  f64, // [0,1] how much usable data the capture produced
    pub history:       f64, // [0,1] template maturity
}

/// A non-fatal fault that removed or degraded one modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityIssue {
    pub modality: Modality,
    pub reason:   String,
}

impl std::fmt::Display for ModalityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.modality, self.reason)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthDecision {
    pub attempt_id:           String,
    pub user_id:              String,
    pub success:              bool,
    pub confidence:           f64, // [0,100]
    pub risk_score:           f64, // [0,100]
    pub uncertainty:          f64, // [0,100]
    pub per_modality_scores:  BTreeMap<Modality, f64>,
    pub modalities_used:      Vec<Modality>,
    pub issues:               Vec<ModalityIssue>,
    pub sampling_duration_ms: u64,
    pub phase:                AttemptPhase,
    pub timestamp:            DateTime<Utc>,
}

impl AuthDecision {
    /// Decision returned when no modality produced a usable score.
    pub fn unavailable(attempt_id: &str, user_id: &str, issues: Vec<ModalityIssue>) -> Self {
        Self {
            attempt_id:           attempt_id.to_string(),
            user_id:              user_id.to_string(),
            success:              false,
            confidence:           0.0,
            risk_score:           100.0,
            uncertainty:          0.0,
            per_modality_scores:  BTreeMap::new(),
            modalities_used:      Vec::new(),
            issues,
            sampling_duration_ms: 0,
            phase:                AttemptPhase::Decided,
            timestamp:            Utc::now(),
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_events_map_to_their_modality() {
        assert_eq!(InputEvent::KeyUp { key: "a".into() }.modality(), Modality::Keystroke);
        assert_eq!(InputEvent::Wheel { dx: 0.0, dy: 3.0 }.modality(), Modality::Pointer);
        assert_eq!(InputEvent::TouchCancel { id: 1 }.modality(), Modality::Touch);
    }

    #[test]
    fn raw_sample_json_is_flat_and_tagged() {
        let s = RawSample::new(12.5, InputEvent::PointerDown { x: 1.0, y: 2.0, button: 0 });
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"type\":\"pointer_down\""));
        let back: RawSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn phases_only_move_forward() {
        assert!(AttemptPhase::Planned.can_advance_to(AttemptPhase::Capturing));
        assert!(AttemptPhase::Decided.can_advance_to(AttemptPhase::Learning));
        assert!(AttemptPhase::Decided.can_advance_to(AttemptPhase::Rejected));
        assert!(!AttemptPhase::Matching.can_advance_to(AttemptPhase::Capturing));
        assert!(!AttemptPhase::Learning.can_advance_to(AttemptPhase::Rejected));
        assert!(!AttemptPhase::Planned.can_advance_to(AttemptPhase::Matching));
    }

    #[test]
    fn capabilities_gate_behavioral_on_any_input() {
        assert!(!Capabilities::NONE.supports(Modality::Behavioral));
        let touch_only = Capabilities { keyboard: false, pointer: false, touch: true };
        assert!(touch_only.supports(Modality::Behavioral));
        assert_eq!(touch_only.captured(), vec![Modality::Touch]);
    }
}
