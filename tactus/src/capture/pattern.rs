// tactus/src/capture/pattern.rs
//
// Segmented gestures. Every variant carries only the fields its feature
// extractor needs; kinematics are computed once, at segmentation time.
//
// Coordinates are screen pixels (y grows downward), times are the input
// layer's millisecond clock, velocities are px/s.

use serde::{Deserialize, Serialize};

use crate::events::Modality;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x:    f64,
    pub y:    f64,
    pub t_ms: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, t_ms: f64) -> Self {
        Self { x, y, t_ms }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Dominant axis of a displacement. Ties resolve to the horizontal axis.
    pub fn of(dx: f64, dy: f64) -> Self {
        if dx.abs() >= dy.abs() {
            if dx < 0.0 { Self::Left } else { Self::Right }
        } else if dy < 0.0 {
            Self::Up
        } else {
            Self::Down
        }
    }
}

// ── Path kinematics ───────────────────────────────────────────────────────────

/// Summary of a point path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PathStats {
    pub samples:           usize,
    pub duration_ms:       f64,
    pub path_length:       f64,
    pub mean_velocity:     f64,
    pub max_velocity:      f64,
    pub velocity_std:      f64,
    /// 0 for a straight line, approaching 1 as the path folds back on itself.
    pub curvature:         f64,
    pub direction_changes: u32,
}

const DIRECTION_CHANGE_RAD: f64 = std::f64::consts::FRAC_PI_4;

/// Segment velocities (px/s). Pairs with no elapsed time are skipped.
pub fn velocities(points: &[Point]) -> Vec<f64> {
    points
        .windows(2)
        .filter_map(|w| {
            let dt = w[1].t_ms - w[0].t_ms;
            if dt > 0.0 { Some(w[0].distance(&w[1]) / dt * 1000.0) } else { None }
        })
        .collect()
}

/// Accelerations (px/s²) between consecutive velocity segments.
pub fn accelerations(points: &[Point]) -> Vec<f64> {
    let timed: Vec<(f64, f64)> = points
        .windows(2)
        .filter_map(|w| {
            let dt = w[1].t_ms - w[0].t_ms;
            if dt > 0.0 {
                Some((w[0].distance(&w[1]) / dt * 1000.0, (w[0].t_ms + w[1].t_ms) / 2.0))
            } else {
                None
            }
        })
        .collect();
    timed
        .windows(2)
        .filter_map(|w| {
            let dt = w[1].1 - w[0].1;
            if dt > 0.0 { Some((w[1].0 - w[0].0) / dt * 1000.0) } else { None }
        })
        .collect()
}

pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

pub fn path_stats(points: &[Point]) -> PathStats {
    if points.is_empty() {
        return PathStats::default();
    }
    let first = points[0];
    let last  = points[points.len() - 1];
    let length = path_length(points);
    let straight = first.distance(&last);
    let curvature = if length > 0.0 { (1.0 - straight / length).clamp(0.0, 1.0) } else { 0.0 };

    let vels = velocities(points);
    let (mean_v, std_v, max_v) = if vels.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let n = vels.len() as f64;
        let mean = vels.iter().sum::<f64>() / n;
        let std  = (vels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        (mean, std, vels.iter().copied().fold(0.0, f64::max))
    };

    // Heading changes sharper than 45° between consecutive non-zero segments
    let headings: Vec<f64> = points
        .windows(2)
        .filter(|w| w[0].distance(&w[1]) > 0.0)
        .map(|w| (w[1].y - w[0].y).atan2(w[1].x - w[0].x))
        .collect();
    let direction_changes = headings
        .windows(2)
        .filter(|h| {
            let mut d = (h[1] - h[0]).abs();
            if d > std::f64::consts::PI {
                d = 2.0 * std::f64::consts::PI - d;
            }
            d > DIRECTION_CHANGE_RAD
        })
        .count() as u32;

    PathStats {
        samples:       points.len(),
        duration_ms:   (last.t_ms - first.t_ms).max(0.0),
        path_length:   length,
        mean_velocity: mean_v,
        max_velocity:  max_v,
        velocity_std:  std_v,
        curvature,
        direction_changes,
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keystroke {
    pub key:         String,
    pub press_ms:    f64,
    pub release_ms:  f64,
    pub duration_ms: f64,
}

/// Ordered keystrokes of one typing burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeWindow {
    pub start_ms: f64,
    pub end_ms:   f64,
    pub strokes:  Vec<Keystroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub start_ms:   f64,
    pub end_ms:     f64,
    pub points:     Vec<Point>,
    pub kinematics: PathStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Click {
    pub start_ms:      f64,
    pub end_ms:        f64,
    pub button:        u8,
    pub dwell_ms:      f64,
    pub pre_movement:  Option<PathStats>,
    pub post_movement: Option<PathStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scroll {
    pub start_ms:  f64,
    pub end_ms:    f64,
    pub direction: Direction,
    pub delta:     f64,
    pub speed:     f64, // |delta| per second
    pub ticks:     u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drag {
    pub start_ms: f64,
    pub end_ms:   f64,
    pub button:   u8,
    pub start:    Point,
    pub end:      Point,
    pub distance: f64,
    pub velocity: f64,
    pub points:   Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tap {
    pub start_ms:      f64,
    pub end_ms:        f64,
    pub dwell_ms:      f64,
    pub pressure_mean: f64,
    pub pressure_max:  f64,
    pub contact_area:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swipe {
    pub start_ms:      f64,
    pub end_ms:        f64,
    pub direction:     Direction,
    pub distance:      f64,
    pub velocity:      f64,
    pub curvature:     f64,
    pub pressure_mean: f64,
    pub contact_area:  f64,
    pub points:        Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pinch {
    pub start_ms:     f64,
    pub end_ms:       f64,
    pub scale_change: f64, // final / initial finger separation
    pub rotation:     f64, // radians, signed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Keystroke(KeystrokeWindow),
    Movement(Movement),
    Click(Click),
    Scroll(Scroll),
    Drag(Drag),
    Tap(Tap),
    Swipe(Swipe),
    Pinch(Pinch),
}

impl Pattern {
    pub fn start_ms(&self) -> f64 {
        match self {
            Self::Keystroke(p) => p.start_ms,
            Self::Movement(p)  => p.start_ms,
            Self::Click(p)     => p.start_ms,
            Self::Scroll(p)    => p.start_ms,
            Self::Drag(p)      => p.start_ms,
            Self::Tap(p)       => p.start_ms,
            Self::Swipe(p)     => p.start_ms,
            Self::Pinch(p)     => p.start_ms,
        }
    }

    pub fn end_ms(&self) -> f64 {
        match self {
            Self::Keystroke(p) => p.end_ms,
            Self::Movement(p)  => p.end_ms,
            Self::Click(p)     => p.end_ms,
            Self::Scroll(p)    => p.end_ms,
            Self::Drag(p)      => p.end_ms,
            Self::Tap(p)       => p.end_ms,
            Self::Swipe(p)     => p.end_ms,
            Self::Pinch(p)     => p.end_ms,
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            Self::Keystroke(_) => Modality::Keystroke,
            Self::Movement(_) | Self::Click(_) | Self::Scroll(_) | Self::Drag(_) => Modality::Pointer,
            Self::Tap(_) | Self::Swipe(_) | Self::Pinch(_) => Modality::Touch,
        }
    }

    /// Countable evidence units: keystrokes for a typing window, one per gesture otherwise.
    pub fn units(&self) -> usize {
        match self {
            Self::Keystroke(w) => w.strokes.len(),
            _ => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Keystroke(_) => "keystroke",
            Self::Movement(_)  => "movement",
            Self::Click(_)     => "click",
            Self::Scroll(_)    => "scroll",
            Self::Drag(_)      => "drag",
            Self::Tap(_)       => "tap",
            Self::Swipe(_)     => "swipe",
            Self::Pinch(_)     => "pinch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_path_has_zero_curvature() {
        let pts: Vec<Point> = (0..6).map(|i| Point::new(i as f64 * 10.0, 0.0, i as f64 * 10.0)).collect();
        let s = path_stats(&pts);
        assert_eq!(s.samples, 6);
        assert!(s.curvature.abs() < 1e-12);
        assert_eq!(s.direction_changes, 0);
        // 10 px per 10 ms = 1000 px/s
        assert!((s.mean_velocity - 1000.0).abs() < 1e-9);
        assert!(s.velocity_std.abs() < 1e-9);
    }

    #[test]
    fn zig_zag_counts_direction_changes() {
        let pts = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 0.0, 10.0),
            Point::new(10.0, 10.0, 20.0),
            Point::new(20.0, 10.0, 30.0),
            Point::new(20.0, 20.0, 40.0),
        ];
        let s = path_stats(&pts);
        assert_eq!(s.direction_changes, 3);
        assert!(s.curvature > 0.0);
    }

    #[test]
    fn duplicate_timestamps_do_not_produce_infinite_velocity() {
        let pts = vec![Point::new(0.0, 0.0, 5.0), Point::new(3.0, 4.0, 5.0), Point::new(6.0, 8.0, 10.0)];
        let v = velocities(&pts);
        assert_eq!(v.len(), 1);
        assert!(v[0].is_finite());
    }

    #[test]
    fn direction_prefers_dominant_axis() {
        assert_eq!(Direction::of(-30.0, 5.0), Direction::Left);
        assert_eq!(Direction::of(2.0, 40.0), Direction::Down);
        assert_eq!(Direction::of(0.0, -1.0), Direction::Up);
    }
}
