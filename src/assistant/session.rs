//! Remote resource ids reused across runs.
//!
//! A [`Session`] is loaded from a small TOML state file, overridden by
//! environment variables, and passed explicitly through every assistant
//! operation. [`SessionStore`] keeps the stored ids apart from the
//! overridden view so only ids created by this process are written back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_ASSISTANT_ID: &str = "MDA_ASSISTANT_ID";
pub const ENV_THREAD_ID: &str = "MDA_THREAD_ID";
pub const ENV_FILE_ID: &str = "MDA_FILE_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl Session {
    /// Load the state file. A missing file is an empty session.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(id) = get(ENV_ASSISTANT_ID) {
            self.assistant_id = Some(id);
        }
        if let Some(id) = get(ENV_THREAD_ID) {
            self.thread_id = Some(id);
        }
        if let Some(id) = get(ENV_FILE_ID) {
            self.file_id = Some(id);
        }
        self
    }

    /// Ids set in `other` replace ours.
    pub fn overlay(mut self, other: &Session) -> Self {
        if other.assistant_id.is_some() {
            self.assistant_id = other.assistant_id.clone();
        }
        if other.thread_id.is_some() {
            self.thread_id = other.thread_id.clone();
        }
        if other.file_id.is_some() {
            self.file_id = other.file_id.clone();
        }
        self
    }
}

/// A session bound to its state file.
///
/// Operations work on [`active`](Self::active), the stored ids with
/// overrides applied. [`persist`](Self::persist) writes back only the ids
/// that were not overridden and have changed since the file was read.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    stored: Session,
    overrides: Session,
    active: Session,
}

impl SessionStore {
    /// Load `path` and apply `MDA_*_ID` environment overrides.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, |key| std::env::var(key).ok())
    }

    pub fn open_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stored = Session::load(path)?;
        let overrides = Session::default().with_overrides(lookup);
        let active = stored.clone().overlay(&overrides);
        Ok(Self {
            path: path.to_path_buf(),
            stored,
            overrides,
            active,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn active(&self) -> &Session {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut Session {
        &mut self.active
    }

    /// Ids as they are (or will be) on disk.
    pub fn stored(&self) -> &Session {
        &self.stored
    }

    /// Write newly obtained ids to the state file. Returns whether the file
    /// was written.
    pub fn persist(&mut self) -> Result<bool> {
        let mut changed = adopt(
            &mut self.stored.assistant_id,
            &self.active.assistant_id,
            &self.overrides.assistant_id,
        );
        changed |= adopt(
            &mut self.stored.thread_id,
            &self.active.thread_id,
            &self.overrides.thread_id,
        );
        changed |= adopt(
            &mut self.stored.file_id,
            &self.active.file_id,
            &self.overrides.file_id,
        );
        if changed {
            self.stored.save(&self.path)?;
            tracing::debug!(path = %self.path.display(), "saved session");
        }
        Ok(changed)
    }
}

fn adopt(stored: &mut Option<String>, active: &Option<String>, overridden: &Option<String>) -> bool {
    if overridden.is_some() || active.is_none() || stored == active {
        return false;
    }
    *stored = active.clone();
    true
}
