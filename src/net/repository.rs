//! Save persistence
//!
//! Sessions are hydrated from a repository on first touch and written back
//! on unload or eviction. Nothing else reads or writes saves.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::game::state::SaveState;
use crate::net::session::SessionKey;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Invalid save key: {0}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt save {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Backing store for saves
pub trait SaveRepository: Send + Sync {
    /// `Ok(None)` when no save exists for the key
    fn load(&self, key: &SessionKey) -> Result<Option<SaveState>, RepositoryError>;
    fn store(&self, key: &SessionKey, state: &SaveState) -> Result<(), RepositoryError>;
}

/// Process-local repository, used by tests and the bench
#[derive(Default)]
pub struct MemoryRepository {
    saves: RwLock<HashMap<SessionKey, SaveState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_save(self, key: SessionKey, state: SaveState) -> Self {
        self.saves.write().insert(key, state);
        self
    }

    pub fn get(&self, key: &SessionKey) -> Option<SaveState> {
        self.saves.read().get(key).cloned()
    }
}

impl SaveRepository for MemoryRepository {
    fn load(&self, key: &SessionKey) -> Result<Option<SaveState>, RepositoryError> {
        Ok(self.saves.read().get(key).cloned())
    }

    fn store(&self, key: &SessionKey, state: &SaveState) -> Result<(), RepositoryError> {
        self.saves.write().insert(key.clone(), state.clone());
        Ok(())
    }
}

#[cfg(feature = "json_saves")]
pub use json::JsonFileRepository;

#[cfg(feature = "json_saves")]
mod json {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tracing::debug;

    use super::*;

    /// One JSON file per save under `<root>/<player>/<save>.json`
    pub struct JsonFileRepository {
        root: PathBuf,
    }

    fn check_component(part: &str) -> Result<&str, RepositoryError> {
        let valid = !part.is_empty()
            && part.len() <= 64
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(part)
        } else {
            Err(RepositoryError::InvalidKey(part.to_string()))
        }
    }

    impl JsonFileRepository {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn path_for(&self, key: &SessionKey) -> Result<PathBuf, RepositoryError> {
            let player = check_component(&key.player)?;
            let save = check_component(&key.save)?;
            Ok(self.root.join(player).join(format!("{}.json", save)))
        }
    }

    impl SaveRepository for JsonFileRepository {
        fn load(&self, key: &SessionKey) -> Result<Option<SaveState>, RepositoryError> {
            let path = self.path_for(key)?;
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut state: SaveState =
                serde_json::from_str(&raw).map_err(|e| RepositoryError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            state.normalize();
            debug!("Loaded save {} from {}", key, path.display());
            Ok(Some(state))
        }

        fn store(&self, key: &SessionKey, state: &SaveState) -> Result<(), RepositoryError> {
            let path = self.path_for(key)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(state).map_err(|e| RepositoryError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            // Write-then-rename so a crash never leaves a half-written save
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, raw)?;
            fs::rename(&tmp, &path)?;
            debug!("Stored save {} to {}", key, path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Location;

    fn key(player: &str, save: &str) -> SessionKey {
        SessionKey::new(player, save)
    }

    #[test]
    fn test_memory_missing_save_is_none() {
        let repo = MemoryRepository::new();
        assert!(repo.load(&key("p1", "a")).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_then_load() {
        let repo = MemoryRepository::new();
        let mut state = SaveState::new("Tamsin", Location::new("millhaven", "market"));
        state.gold = 12;
        repo.store(&key("p1", "a"), &state).unwrap();

        let loaded = repo.load(&key("p1", "a")).unwrap().unwrap();
        assert_eq!(loaded.gold, 12);
        assert!(repo.load(&key("p1", "b")).unwrap().is_none());
    }

    #[cfg(feature = "json_saves")]
    mod json_files {
        use super::*;

        fn scratch_dir(name: &str) -> std::path::PathBuf {
            let dir = std::env::temp_dir().join(format!(
                "waystone-repo-{}-{}",
                std::process::id(),
                name
            ));
            let _ = std::fs::remove_dir_all(&dir);
            dir
        }

        #[test]
        fn test_json_round_trip() {
            let dir = scratch_dir("round-trip");
            let repo = JsonFileRepository::new(&dir);
            let mut state = SaveState::new("Tamsin", Location::new("millhaven", "market"));
            state.hunger = 1;
            state.time_of_day = 1430;

            repo.store(&key("p1", "slot-a"), &state).unwrap();
            let loaded = repo.load(&key("p1", "slot-a")).unwrap().unwrap();

            assert_eq!(loaded, state);
            assert!(dir.join("p1").join("slot-a.json").exists());
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn test_json_missing_file_is_none() {
            let repo = JsonFileRepository::new(scratch_dir("missing"));
            assert!(repo.load(&key("p1", "nothing")).unwrap().is_none());
        }

        #[test]
        fn test_json_rejects_path_traversal() {
            let repo = JsonFileRepository::new(scratch_dir("traversal"));
            let result = repo.load(&key("..", "passwd"));
            assert!(matches!(result, Err(RepositoryError::InvalidKey(_))));
            let result = repo.load(&key("p1", "a/b"));
            assert!(matches!(result, Err(RepositoryError::InvalidKey(_))));
        }

        #[test]
        fn test_json_corrupt_file() {
            let dir = scratch_dir("corrupt");
            std::fs::create_dir_all(dir.join("p1")).unwrap();
            std::fs::write(dir.join("p1").join("bad.json"), "{ not json").unwrap();

            let repo = JsonFileRepository::new(&dir);
            let result = repo.load(&key("p1", "bad"));
            assert!(matches!(result, Err(RepositoryError::Corrupt { .. })));
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}
