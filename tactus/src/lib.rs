// tactus/src/lib.rs
//
// Tactus: adaptive multi-modal behavioral biometric authentication.
//
//   capture   keystroke / pointer / touch capturers and the capture driver
//   features  fixed-length feature vectors per modality
//   sampling  adaptive sampling duration, depth and per-user context profiles
//   state     per (user, modality) templates and the matcher
//   engine    score fusion and the template learning loop
//   store     profile store and capability probe seams
//   pipeline  one authentication attempt end to end
//   eval      FAR / FRR / EER over a labeled recorded corpus

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod events;
pub mod features;
pub mod pipeline;
pub mod sampling;
pub mod state;
pub mod store;

pub use config::EngineConfig;
pub use error::{AuthError, AuthResult};
pub use events::{AuthDecision, Capabilities, Modality, RawSample, SamplingContext};
pub use pipeline::{AuthPipeline, SessionHandle};
