//! Single-writer config store with atomic rename-on-write persistence.
//!
//! Grounded on `replication/wal.rs`'s durability discipline (write to a
//! temp file in the same directory, fsync, rename over the canonical
//! path) generalized from WAL segments to a whole `ConfigData` snapshot,
//! per SPEC_FULL.md §4.1.

use crate::config::entities::ConfigData;
use crate::error::{DbError, Result};
use parking_lot::RwLock;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ConfigStore {
    data_dir: PathBuf,
    inner: RwLock<ConfigData>,
}

impl ConfigStore {
    /// Load `config.data` from `data_dir`, or start from an empty
    /// `ConfigData` if it doesn't exist yet (pre-bootstrap state).
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(DbError::Io)?;
        fs::create_dir_all(data_dir.join("ssconf")).map_err(DbError::Io)?;

        let config_path = data_dir.join("config.data");
        let data = if config_path.exists() {
            let bytes = fs::read(&config_path).map_err(DbError::Io)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| DbError::Configuration(format!("corrupt config.data: {e}")))?
        } else {
            ConfigData::default()
        };

        info!(path = %config_path.display(), "config store opened");
        Ok(Arc::new(Self { data_dir, inner: RwLock::new(data) }))
    }

    /// Take a copy-on-read snapshot of the full config. Callers never see
    /// a partially-written state (SPEC_FULL.md §8 invariant 1): the read
    /// lock can only be held between complete writes.
    pub fn snapshot(&self) -> ConfigData {
        self.inner.read().clone()
    }

    /// Apply `mutator` to an in-memory copy, bump serial_no/mtime, and
    /// persist atomically. Returns the new serial_no.
    ///
    /// The write lock is held for the whole call, matching SPEC_FULL.md
    /// §5: "the config is exclusively written under its internal write
    /// lock held for the duration of an Update call".
    pub fn commit<F>(&self, mutator: F) -> Result<u64>
    where
        F: FnOnce(&mut ConfigData) -> Result<()>,
    {
        let mut guard = self.inner.write();
        let before_serial = guard.serial_no;
        let mut staged = guard.clone();

        mutator(&mut staged)?;

        staged.serial_no = before_serial + 1;
        staged.mtime = now_secs();
        if staged.ctime == 0.0 {
            staged.ctime = staged.mtime;
        }

        self.persist(&staged)?;
        self.write_ssconf(&staged)?;

        *guard = staged;
        debug!(serial = guard.serial_no, "config committed");
        Ok(guard.serial_no)
    }

    fn persist(&self, data: &ConfigData) -> Result<()> {
        let final_path = self.data_dir.join("config.data");
        let tmp_path = self.data_dir.join(format!("config.data.new.{}", std::process::id()));

        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| DbError::Configuration(format!("encode failed: {e}")))?;

        {
            let mut f = File::create(&tmp_path).map_err(DbError::Io)?;
            f.write_all(&bytes).map_err(DbError::Io)?;
            f.sync_all().map_err(DbError::Io)?;
        }

        // Atomic rename: on any failure here the previous config.data is
        // left untouched (SPEC_FULL.md §4.1 failure mode).
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(DbError::Configuration(format!("atomic rename failed: {e}")));
        }

        if let Some(dir) = final_path.parent() {
            if let Ok(dir_f) = File::open(dir) {
                let _ = dir_f.sync_all();
            }
        }

        Ok(())
    }

    /// Ssconf: a flat per-key cache for scripts that can't parse the
    /// full config.data (SPEC_FULL.md §6, GLOSSARY).
    fn write_ssconf(&self, data: &ConfigData) -> Result<()> {
        let ssdir = self.data_dir.join("ssconf");
        let mut entries: Vec<(&str, String)> = Vec::new();

        if let Some(cluster) = &data.cluster {
            entries.push(("cluster_name", cluster.cluster_name.clone()));
            entries.push(("master_node", cluster.master_node.to_string()));
        }
        entries.push(("node_list", data.nodes.keys().map(|u| u.to_string()).collect::<Vec<_>>().join("\n")));
        entries.push(("instance_list", data.instances.keys().cloned().collect::<Vec<_>>().join("\n")));

        for (key, value) in entries {
            let path = ssdir.join(format!("ssconf_{key}"));
            let tmp = ssdir.join(format!("ssconf_{key}.new.{}", std::process::id()));
            fs::write(&tmp, value).map_err(DbError::Io)?;
            if let Err(e) = fs::rename(&tmp, &path) {
                warn!(key, error = %e, "ssconf write failed");
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entities::*;

    #[test]
    fn commit_bumps_serial_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(store.snapshot().serial_no, 0);

        let before_mtime = store.snapshot().mtime;
        store
            .commit(|cfg| {
                cfg.nodes.insert(
                    Uuid::nil(),
                    Node {
                        uuid: Uuid::nil(),
                        name: "n1".into(),
                        primary_ip: "10.0.0.1".into(),
                        secondary_ip: "10.0.0.1".into(),
                        master_candidate: true,
                        offline: false,
                        drained: false,
                        master_capable: true,
                        vm_capable: true,
                        group: Uuid::nil(),
                        ndparams: Default::default(),
                        tags: Default::default(),
                        serial_no: 0,
                    },
                );
                Ok(())
            })
            .unwrap();

        let after = store.snapshot();
        assert_eq!(after.serial_no, 1);
        assert!(after.mtime >= before_mtime);
        assert_eq!(after.nodes.len(), 1);
    }

    #[test]
    fn reopen_recovers_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfigStore::open(dir.path()).unwrap();
            store.commit(|cfg| { cfg.version = 42; Ok(()) }).unwrap();
        }
        let reopened = ConfigStore::open(dir.path()).unwrap();
        let snap = reopened.snapshot();
        assert_eq!(snap.version, 42);
        assert_eq!(snap.serial_no, 1);
    }

    #[test]
    fn failed_mutation_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        let before = store.snapshot().serial_no;
        let err = store.commit(|_| Err(DbError::Validation("nope".into())));
        assert!(err.is_err());
        assert_eq!(store.snapshot().serial_no, before);
    }
}
