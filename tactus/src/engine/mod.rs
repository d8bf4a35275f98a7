// tactus/src/engine/mod.rs

pub mod fusion;
pub mod learning;

pub use fusion::{Fused, FusionEngine};
pub use learning::{LearnAction, LearnOutcome, LearningLoop, Observation};
