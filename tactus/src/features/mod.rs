// tactus/src/features/mod.rs
//
// Feature extraction: Patterns → fixed-length FeatureVector.
//
// `extract` is pure, deterministic and total. Every modality has a fixed
// dimensionality for the lifetime of the process; undefined statistics are
// zero-filled and the output is truncated or zero-padded to that length.

pub mod behavioral;
pub mod keystroke;
pub mod pointer;
pub mod stats;
pub mod touch;

use serde::{Deserialize, Serialize};

use crate::capture::Pattern;
use crate::events::Modality;

/// Fixed dimensionality of a modality's feature vector.
pub fn dims(modality: Modality) -> usize {
    match modality {
        Modality::Keystroke  => keystroke::DIMS,
        Modality::Pointer    => pointer::DIMS,
        Modality::Touch      => touch::DIMS,
        Modality::Behavioral => behavioral::DIMS,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub modality: Modality,
    pub values:   Vec<f64>,
}

impl FeatureVector {
    /// Wrap raw values, forcing the modality's fixed length.
    pub fn new(modality: Modality, mut values: Vec<f64>) -> Self {
        values.resize(dims(modality), 0.0);
        for v in values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        Self { modality, values }
    }

    pub fn zeros(modality: Modality) -> Self {
        Self { modality, values: vec![0.0; dims(modality)] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

/// Extract the feature vector of `modality` from `patterns`.
///
/// Patterns belonging to other modalities are ignored, except for
/// `Modality::Behavioral`, which is derived from all of them.
pub fn extract(modality: Modality, patterns: &[Pattern]) -> FeatureVector {
    let values = match modality {
        Modality::Behavioral => behavioral::extract(patterns),
        m => {
            let own: Vec<Pattern> = patterns.iter().filter(|p| p.modality() == m).cloned().collect();
            match m {
                Modality::Keystroke => keystroke::extract(&own),
                Modality::Pointer   => pointer::extract(&own),
                _                   => touch::extract(&own),
            }
        }
    };
    FeatureVector::new(modality, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::segment;
    use crate::config::CaptureConfig;
    use crate::events::{InputEvent, RawSample};

    fn typing() -> Vec<RawSample> {
        let mut out = Vec::new();
        for (i, k) in ["t", "h", "e", " ", "c", "a", "t"].iter().enumerate() {
            let t = i as f64 * 180.0;
            out.push(RawSample::new(t, InputEvent::KeyDown { key: k.to_string() }));
            out.push(RawSample::new(t + 95.0 + i as f64, InputEvent::KeyUp { key: k.to_string() }));
        }
        out
    }

    #[test]
    fn every_modality_has_fixed_length_even_without_patterns() {
        for m in Modality::ALL {
            assert_eq!(extract(m, &[]).len(), dims(m));
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let patterns = segment(Modality::Keystroke, &CaptureConfig::default(), &typing());
        let a = extract(Modality::Keystroke, &patterns);
        let b = extract(Modality::Keystroke, &patterns);
        let bits = |v: &FeatureVector| v.values.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn single_pattern_gives_full_length_vector() {
        let samples = &typing()[..2];
        let patterns = segment(Modality::Keystroke, &CaptureConfig::default(), samples);
        assert_eq!(patterns.len(), 1);
        let v = extract(Modality::Keystroke, &patterns);
        assert_eq!(v.len(), dims(Modality::Keystroke));
        assert_eq!(v.values[0], 95.0);
    }

    #[test]
    fn constructor_pads_truncates_and_scrubs() {
        let short = FeatureVector::new(Modality::Behavioral, vec![1.0, f64::NAN]);
        assert_eq!(short.len(), behavioral::DIMS);
        assert_eq!(short.values[1], 0.0);
        let long = FeatureVector::new(Modality::Behavioral, vec![1.0; 40]);
        assert_eq!(long.len(), behavioral::DIMS);
    }
}
