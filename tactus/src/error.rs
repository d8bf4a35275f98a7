// tactus/src/error.rs
//
// Error taxonomy. Only `Timeout`, `Store` and `Config` ever reach a caller as
// `Err`; the rest degrade one modality and are recorded on the decision as a
// `ModalityIssue`.

use thiserror::Error;

use crate::events::{Modality, ModalityIssue};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("no input modality is available on this device")]
    InputUnavailable,

    #[error("{modality} capture did not finish within the sampling deadline")]
    CaptureTimeout { modality: Modality },

    #[error("{modality}: {got} patterns captured, {need} needed")]
    InsufficientSamples { modality: Modality, got: usize, need: usize },

    #[error("stored {modality} template for {user_id} has {found} dims, expected {expected}")]
    TemplateCorrupt { user_id: String, modality: Modality, expected: usize, found: usize },

    #[error("learning for {user_id} is serialized behind a concurrent attempt")]
    ConcurrentWriteConflict { user_id: String },

    #[error("attempt did not complete within {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("profile store: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Record this error against a modality on the decision.
    pub fn issue(&self, modality: Modality) -> ModalityIssue {
        ModalityIssue { modality, reason: self.to_string() }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
