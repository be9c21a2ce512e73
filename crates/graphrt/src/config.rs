//! Session and run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::env;

/// Options fixed when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Tag attached to every log event the session emits.
    pub session_log_id: String,
    /// 0 is quiet; 2 and above trace every node.
    pub log_verbosity: u8,
    /// Release intermediate values after their last consumer.
    pub enable_memory_reuse: bool,
    pub enable_profiling: bool,
    /// When set, `end_profiling` writes `<prefix>_<timestamp>.json`.
    pub profile_file_prefix: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            session_log_id: "graphrt".to_string(),
            log_verbosity: 1,
            enable_memory_reuse: true,
            enable_profiling: false,
            profile_file_prefix: None,
        }
    }
}

impl SessionOptions {
    pub fn with_log_id(mut self, log_id: impl Into<String>) -> Self {
        self.session_log_id = log_id.into();
        self
    }

    pub fn with_profiling(mut self, prefix: Option<PathBuf>) -> Self {
        self.enable_profiling = true;
        self.profile_file_prefix = prefix;
        self
    }

    /// Reads options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read session options {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid session options in {}", path.display()))
    }

    /// Applies `GRAPHRT_LOG_VERBOSITY`, `GRAPHRT_PROFILE` and `GRAPHRT_DISABLE_MEMORY_REUSE`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(verbosity) = env::log_verbosity() {
            self.log_verbosity = verbosity;
        }
        if let Some(profile) = env::profiling() {
            self.enable_profiling = profile;
        }
        if env::memory_reuse_disabled() {
            self.enable_memory_reuse = false;
        }
        self
    }
}

/// Options for a single `run` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub run_tag: String,
    pub run_log_verbosity: u8,
}

impl RunOptions {
    pub fn tagged(tag: impl Into<String>) -> Self {
        RunOptions {
            run_tag: tag.into(),
            run_log_verbosity: 0,
        }
    }
}
