//! Durable per-instance state records (`<state_dir>/<instance>.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::InstanceState;

/// Load/save of one instance's record. The owning instance loop is the only writer.
pub trait StateStore {
    /// `Ok(None)` when the instance has never been saved.
    fn load(&self, id: &str) -> Result<Option<InstanceState>>;
    fn save(&self, id: &str, state: &InstanceState) -> Result<()>;
}

/// One pretty-printed JSON document per instance, replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Every record in the directory, sorted by instance id.
    pub fn load_all(&self) -> Result<Vec<InstanceState>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut states = Vec::new();
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?
        {
            let path = entry.context("read directory entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            states.push(read_state(&path)?);
        }
        states.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(states)
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, id: &str) -> Result<Option<InstanceState>> {
        let path = self.path_for(id);
        if !path.exists() {
            debug!(path = %path.display(), "no saved state");
            return Ok(None);
        }
        read_state(&path).map(Some)
    }

    fn save(&self, id: &str, state: &InstanceState) -> Result<()> {
        let path = self.path_for(id);
        debug!(
            path = %path.display(),
            pending = state.build_order.pending_count(),
            "writing instance state"
        );
        let mut buf = serde_json::to_string_pretty(state).context("serialize instance state")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }
}

fn read_state(path: &Path) -> Result<InstanceState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: InstanceState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(id = %state.id, "state loaded");
    Ok(state)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

/// Load an instance record for a new process run, or create a zero-value one.
///
/// Incomplete build tasks lose their retry cooldown so the first pending task
/// is eligible right away, and the device binding follows configuration.
pub fn load_or_create(store: &dyn StateStore, id: &str, device_id: &str) -> Result<InstanceState> {
    match store.load(id)? {
        Some(mut state) => {
            state.id = id.to_string();
            state.device_id = device_id.to_string();
            state.build_order.reset_cooldowns();
            Ok(state)
        }
        None => Ok(InstanceState::new(id, device_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_order::default_build_order;
    use chrono::Utc;

    /// Verifies save → load preserves every field.
    #[test]
    fn state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::new(temp.path().join("state"));

        let mut state = InstanceState::new("main", "emulator-5554");
        state.bootstrap.record_step_a();
        state.build_order.upcoming_tasks = default_build_order();
        state.build_order.record_attempt(0, false, Utc::now());

        store.save("main", &state).expect("save");
        let loaded = store.load("main").expect("load").expect("present");
        assert_eq!(loaded, state);
        assert!(!store.path_for("main").with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_record_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::new(temp.path());
        assert!(store.load("ghost").expect("load").is_none());
        assert!(store.load_all().expect("load all").is_empty());
    }

    #[test]
    fn load_or_create_clears_pending_cooldowns() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::new(temp.path());
        let now = Utc::now();

        let mut state = InstanceState::new("main", "old-serial");
        state.build_order.upcoming_tasks = default_build_order();
        state.build_order.record_attempt(0, true, now);
        state.build_order.record_attempt(1, false, now);
        store.save("main", &state).expect("save");

        let loaded = load_or_create(&store, "main", "new-serial").expect("load");
        assert_eq!(loaded.device_id, "new-serial");
        assert_eq!(loaded.build_order.upcoming_tasks[0].last_attempt, Some(now));
        assert_eq!(loaded.build_order.upcoming_tasks[1].last_attempt, None);
        assert_eq!(loaded.build_order.upcoming_tasks[1].attempts, 1);
    }

    #[test]
    fn load_or_create_starts_fresh() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::new(temp.path());
        let state = load_or_create(&store, "alt", "emulator-5556").expect("create");
        assert_eq!(state, InstanceState::new("alt", "emulator-5556"));
    }

    #[test]
    fn load_all_sorts_by_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::new(temp.path());
        store.save("b", &InstanceState::new("b", "d2")).expect("save b");
        store.save("a", &InstanceState::new("a", "d1")).expect("save a");
        let ids: Vec<_> = store.load_all().expect("load").into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
