use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{OwnerSlot, SessionRecord, UserId},
    Result,
};

const STATE_VERSION: u32 = 1;

/// Everything that survives a restart, written as one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub owner: Option<OwnerSlot>,
    pub sessions: Vec<(UserId, SessionRecord)>,
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    saved_at: DateTime<Utc>,
    owner: Option<OwnerSlot>,
    #[serde(default)]
    sessions: Vec<SessionEntry>,
}

#[derive(Serialize, Deserialize)]
struct SessionEntry {
    visitor: UserId,
    #[serde(flatten)]
    record: SessionRecord,
}

/// JSON snapshot file holding the owner slot and the session table.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, falling back to empty state on any failure.
    ///
    /// A missing file is a normal first start; an unreadable or corrupt one is
    /// logged and ignored rather than keeping the bot down.
    pub fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => PersistedState::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file unreadable, starting with empty state"
                );
                PersistedState::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        let file: StateFile = serde_json::from_str(&txt)?;
        if file.version != STATE_VERSION {
            tracing::warn!(
                version = file.version,
                expected = STATE_VERSION,
                "state file version mismatch, loading anyway"
            );
        }
        Ok(Some(PersistedState {
            owner: file.owner,
            sessions: file
                .sessions
                .into_iter()
                .map(|e| (e.visitor, e.record))
                .collect(),
        }))
    }

    /// Write a full snapshot: temp file first, then rename over the target.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        let file = StateFile {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            owner: state.owner.clone(),
            sessions: state
                .sessions
                .iter()
                .map(|(visitor, record)| SessionEntry {
                    visitor: *visitor,
                    record: record.clone(),
                })
                .collect(),
        };
        let txt = serde_json::to_string_pretty(&file)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, MessageRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn tmp_path(prefix: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        PathBuf::from(format!("/tmp/{prefix}-{}-{n}.json", std::process::id()))
    }

    fn sample() -> PersistedState {
        PersistedState {
            owner: Some(OwnerSlot {
                id: UserId(1),
                chat_id: ChatId(1),
                display_name: "Owner".to_string(),
                claimed_at: Utc::now(),
            }),
            sessions: vec![(
                UserId(42),
                SessionRecord {
                    last_visitor_message: MessageRef {
                        chat_id: ChatId(42),
                        message_id: MessageId(7),
                    },
                    last_relay_message: MessageRef {
                        chat_id: ChatId(1),
                        message_id: MessageId(300),
                    },
                    display_name: "Visitor".to_string(),
                    handle: None,
                    updated_at: Utc::now(),
                },
            )],
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = StateStore::new(tmp_path("orb-store-missing"));
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn save_then_load_restores_snapshot() {
        let path = tmp_path("orb-store-roundtrip");
        let store = StateStore::new(&path);
        let state = sample();
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
        assert!(!store.tmp_path().exists(), "temp file must be renamed away");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["owner"]["id"], 1);
        assert_eq!(raw["sessions"][0]["visitor"], 42);
        assert_eq!(raw["sessions"][0]["last_relay_message"]["message_id"], 300);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn corrupt_or_truncated_file_loads_empty() {
        let path = tmp_path("orb-store-corrupt");
        fs::write(&path, "{\"version\":1,\"owner\":{\"id\":").unwrap();
        assert_eq!(StateStore::new(&path).load(), PersistedState::default());

        fs::write(&path, "   \n").unwrap();
        assert_eq!(StateStore::new(&path).load(), PersistedState::default());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn save_into_missing_directory_creates_it() {
        let dir = tmp_path("orb-store-dir");
        let path = dir.join("nested").join("state.json");
        let store = StateStore::new(&path);
        store.save(&PersistedState::default()).unwrap();
        assert_eq!(store.load(), PersistedState::default());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_to_unwritable_location_errors() {
        let blocker = tmp_path("orb-store-blocker");
        fs::write(&blocker, "not a dir").unwrap();
        let store = StateStore::new(blocker.join("state.json"));
        assert!(store.save(&sample()).is_err());
        let _ = fs::remove_file(blocker);
    }
}
