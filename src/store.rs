//! Profile persistence.
//!
//! Training always replaces the whole record. The file store writes to a
//! sibling temporary file and renames it over the target, so readers see
//! either the previous profile or the new one.

use crate::core::profile::{Profile, ProfileRecord};
use crate::error::{GuardError, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Durable storage for the single enrolled profile.
pub trait ProfileStore {
    /// Overwrite any existing profile.
    fn save(&self, profile: &Profile) -> Result<()>;

    fn load(&self) -> Result<Profile>;
}

impl<S: ProfileStore + ?Sized> ProfileStore for &S {
    fn save(&self, profile: &Profile) -> Result<()> {
        (**self).save(profile)
    }

    fn load(&self) -> Result<Profile> {
        (**self).load()
    }
}

/// JSON file holding one profile record.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProfileStore for JsonProfileStore {
    fn save(&self, profile: &Profile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| GuardError::Persistence(format!("{}: {e}", parent.display())))?;
        }

        let json = serde_json::to_string_pretty(&ProfileRecord::from(profile))
            .map_err(|e| GuardError::Persistence(e.to_string()))?;

        let temp = self.temp_path();
        std::fs::write(&temp, json)
            .map_err(|e| GuardError::Persistence(format!("{}: {e}", temp.display())))?;
        std::fs::rename(&temp, &self.path)
            .map_err(|e| GuardError::Persistence(format!("{}: {e}", self.path.display())))?;

        info!(path = %self.path.display(), kind = %profile.kind(), "profile saved");
        Ok(())
    }

    fn load(&self) -> Result<Profile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GuardError::ProfileNotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => {
                return Err(GuardError::Persistence(format!(
                    "{}: {e}",
                    self.path.display()
                )))
            }
        };

        let record: ProfileRecord = serde_json::from_str(&content)
            .map_err(|e| GuardError::CorruptProfile(e.to_string()))?;
        let profile = Profile::try_from(record)?;

        debug!(path = %self.path.display(), kind = %profile.kind(), "profile loaded");
        Ok(profile)
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profile: Mutex<Option<Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: Profile) -> Self {
        Self {
            profile: Mutex::new(Some(profile)),
        }
    }

    /// Current contents without the not-found error path.
    pub fn snapshot(&self) -> Option<Profile> {
        self.profile.lock().ok().and_then(|p| p.clone())
    }
}

impl ProfileStore for MemoryProfileStore {
    fn save(&self, profile: &Profile) -> Result<()> {
        let mut slot = self
            .profile
            .lock()
            .map_err(|_| GuardError::Persistence("profile lock poisoned".to_string()))?;
        *slot = Some(profile.clone());
        Ok(())
    }

    fn load(&self) -> Result<Profile> {
        self.snapshot().ok_or_else(|| GuardError::ProfileNotFound {
            path: PathBuf::from("<memory>"),
        })
    }
}
