// tactus/src/store/memory.rs
//
// In-process ProfileStore.
//
// Templates and context profiles live in DashMaps. The most recent pattern
// log records are kept in a bounded ring; when an audit path is configured
// every record is also appended to it as JSONL.

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::capture::Pattern;
use crate::error::{AuthError, AuthResult};
use crate::events::Modality;
use crate::sampling::UserContextProfile;
use crate::store::{PatternLogRecord, ProfileStore};

/// Pattern log records retained in memory.
pub const PATTERN_LOG_CAPACITY: usize = 4_096;

pub struct MemoryProfileStore {
    templates:    DashMap<(String, Modality), Vec<f64>>,
    profiles:     DashMap<String, UserContextProfile>,
    log:          Mutex<VecDeque<PatternLogRecord>>,
    log_capacity: usize,
    audit_path:   Option<PathBuf>,
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self {
            templates:    DashMap::new(),
            profiles:     DashMap::new(),
            log:          Mutex::new(VecDeque::new()),
            log_capacity: PATTERN_LOG_CAPACITY,
            audit_path:   None,
        }
    }
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every pattern log record to `path`.
    pub fn with_audit_log(path: impl Into<PathBuf>) -> Self {
        Self { audit_path: Some(path.into()), ..Self::default() }
    }

    /// Keep at most `capacity` pattern log records in memory.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Most recent pattern log records, oldest first.
    pub fn pattern_log(&self) -> Vec<PatternLogRecord> {
        self.log.lock().iter().cloned().collect()
    }

    pub fn n_templates(&self) -> usize {
        self.templates.len()
    }

    async fn write(&self, content: &str) -> AuthResult<()> {
        let Some(path) = &self.audit_path else { return Ok(()) };
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| AuthError::Store(format!("{}: {}", path.display(), e)))?;
        f.write_all(content.as_bytes())
            .await
            .map_err(|e| AuthError::Store(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load_template(&self, user_id: &str, modality: Modality) -> AuthResult<Option<Vec<f64>>> {
        Ok(self.templates.get(&(user_id.to_string(), modality)).map(|v| v.clone()))
    }

    async fn save_template(&self, user_id: &str, modality: Modality, vector: &[f64]) -> AuthResult<()> {
        self.templates.insert((user_id.to_string(), modality), vector.to_vec());
        Ok(())
    }

    async fn append_pattern_log(
        &self,
        user_id:  &str,
        modality: Modality,
        pattern:  &Pattern,
        score:    f64,
    ) -> AuthResult<()> {
        let record = PatternLogRecord::new(user_id, modality, pattern, score);
        let line = record.to_jsonl() + "\n";
        {
            let mut log = self.log.lock();
            log.push_back(record);
            while log.len() > self.log_capacity {
                log.pop_front();
            }
        }
        self.write(&line).await
    }

    async fn load_context_profile(&self, user_id: &str) -> AuthResult<Option<UserContextProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn save_context_profile(&self, profile: &UserContextProfile) -> AuthResult<()> {
        self.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}
