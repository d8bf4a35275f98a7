// tactus/src/store/mod.rs
//
// External collaborators of the pipeline.
//
//   ProfileStore     persistence for templates, context profiles and the
//                    pattern audit log
//   CapabilityProbe  reports which input modalities the device has

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::Pattern;
use crate::error::AuthResult;
use crate::events::{Capabilities, Modality};
use crate::sampling::UserContextProfile;

pub use memory::MemoryProfileStore;

/// One audit line per captured pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLogRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id:   String,
    pub modality:  Modality,
    pub kind:      String,
    pub start_ms:  f64,
    pub end_ms:    f64,
    pub score:     f64,
}

impl PatternLogRecord {
    pub fn new(user_id: &str, modality: Modality, pattern: &Pattern, score: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id:   user_id.to_string(),
            modality,
            kind:      pattern.kind().to_string(),
            start_ms:  pattern.start_ms(),
            end_ms:    pattern.end_ms(),
            score,
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_template(&self, user_id: &str, modality: Modality) -> AuthResult<Option<Vec<f64>>>;

    async fn save_template(&self, user_id: &str, modality: Modality, vector: &[f64]) -> AuthResult<()>;

    /// Fire-and-forget from the pipeline's point of view; failures are logged.
    async fn append_pattern_log(
        &self,
        user_id:  &str,
        modality: Modality,
        pattern:  &Pattern,
        score:    f64,
    ) -> AuthResult<()>;

    async fn load_context_profile(&self, user_id: &str) -> AuthResult<Option<UserContextProfile>>;

    async fn save_context_profile(&self, profile: &UserContextProfile) -> AuthResult<()>;
}

pub trait CapabilityProbe: Send + Sync {
    fn capabilities(&self) -> Capabilities;
}

/// Probe with a fixed answer, for hosts that know their hardware up front.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub Capabilities);

impl CapabilityProbe for StaticProbe {
    fn capabilities(&self) -> Capabilities {
        self.0
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self(Capabilities::all())
    }
}
