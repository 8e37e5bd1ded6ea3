//! `GanetiLockManager` equivalent: a process-wide service owning one
//! `LockSet` per level (SPEC_FULL.md §4.2), passed explicitly to the
//! opcode processor rather than reached through a global singleton
//! (SPEC_FULL.md §9 redesign flag).

use crate::error::{DbError, Result};
use crate::locking::levels::{LockLevel, LockTarget};
use crate::locking::shared_lock::{AcquireResult, OwnerId, SharedLock};
use crate::locking::timeout::calculate_attempt_timeouts;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A single level's named lock collection plus its set-level lock
/// (guarding `add`/`remove` of element locks).
struct LockSet {
    locks: DashMap<String, Arc<SharedLock>>,
    set_lock: SharedLock,
}

impl LockSet {
    fn new(level: LockLevel) -> Self {
        Self {
            locks: DashMap::new(),
            set_lock: SharedLock::new(format!("{}-set", level.name())),
        }
    }

    fn get_or_create(&self, name: &str) -> Arc<SharedLock> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SharedLock::new(name.to_string())))
            .clone()
    }
}

/// Tracks what one owner currently holds, to enforce the ascending
/// level-order invariant and the BGL-held-while-touching-lower-levels
/// invariant (SPEC_FULL.md §4.2 invariants; §8 invariant 2).
#[derive(Default)]
struct OwnerState {
    held_levels: BTreeSet<LockLevel>,
    held_names: std::collections::HashMap<LockLevel, Vec<String>>,
    held_all: std::collections::HashSet<LockLevel>,
}

pub struct LockManager {
    levels: [LockSet; 5],
    owners: DashMap<OwnerId, Mutex<OwnerState>>,
    next_owner: AtomicU64,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            levels: LockLevel::ALL.map(LockSet::new),
            owners: DashMap::new(),
            next_owner: AtomicU64::new(1),
        })
    }

    pub fn new_owner(&self) -> OwnerId {
        let id = self.next_owner.fetch_add(1, Ordering::Relaxed);
        self.owners.insert(id, Mutex::new(OwnerState::default()));
        id
    }

    fn level_set(&self, level: LockLevel) -> &LockSet {
        &self.levels[level as usize]
    }

    /// Acquire `target` at `level` for `owner`. Enforces: ascending
    /// level order (programmer error, not a runtime failure, if
    /// violated) and BGL-held-when-touching-lower-levels.
    pub fn acquire(
        &self,
        owner: OwnerId,
        level: LockLevel,
        target: &LockTarget,
        shared: bool,
        priority: i64,
        deadline_remaining: Option<f64>,
    ) -> Result<()> {
        {
            let owners_entry = self.owners.get(&owner).ok_or_else(|| {
                DbError::ProgrammerError(format!("unknown lock owner {owner}"))
            })?;
            let state = owners_entry.lock();
            if let Some(&max_held) = state.held_levels.iter().next_back() {
                if level < max_held {
                    return Err(DbError::ProgrammerError(format!(
                        "lock order violation: owner {owner} tried to acquire {:?} after {:?}",
                        level, max_held
                    )));
                }
            }
            if level != LockLevel::Cluster && !state.held_levels.contains(&LockLevel::Cluster) {
                return Err(DbError::ProgrammerError(format!(
                    "owner {owner} touched {:?} without holding the cluster (BGL) lock",
                    level
                )));
            }
        }

        let set = self.level_set(level);
        let schedule = calculate_attempt_timeouts();

        // A caller-supplied deadline bounds the *total* time this call
        // may block, not each individual attempt: fix against one
        // absolute instant and shrink what's left on every retry
        // (SPEC_FULL.md §8 invariant 4, "acquire returns within T + ε
        // regardless of contention").
        let absolute_deadline = deadline_remaining.map(|d| Instant::now() + Duration::from_secs_f64(d.max(0.0)));
        let remaining_secs = |deadline: Option<Instant>| -> Option<Option<f64>> {
            match deadline {
                None => Some(None),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        None
                    } else {
                        Some(Some((d - now).as_secs_f64()))
                    }
                }
            }
        };

        match target {
            LockTarget::All => {
                let mut acquired = false;
                for timeout in &schedule {
                    let Some(remaining) = remaining_secs(absolute_deadline) else {
                        break;
                    };
                    match set.set_lock.acquire(owner, shared, priority, *timeout, remaining) {
                        AcquireResult::Acquired => {
                            acquired = true;
                            break;
                        }
                        AcquireResult::Timeout => continue,
                        AcquireResult::Removed => {
                            return Err(DbError::GanetiLockError(format!(
                                "{:?} set lock was removed",
                                level
                            )))
                        }
                    }
                }
                if !acquired {
                    return Err(DbError::LockTimeout);
                }
                self.record_held(owner, level, None, true);
            }
            LockTarget::Names(names) => {
                let mut held_so_far = Vec::new();
                for name in names {
                    let lock = set.get_or_create(name);
                    let mut acquired = false;
                    for timeout in &schedule {
                        let Some(remaining) = remaining_secs(absolute_deadline) else {
                            break;
                        };
                        match lock.acquire(owner, shared, priority, *timeout, remaining) {
                            AcquireResult::Acquired => {
                                acquired = true;
                                break;
                            }
                            AcquireResult::Timeout => continue,
                            AcquireResult::Removed => {
                                return Err(DbError::GanetiLockError(format!(
                                    "{} ({:?}) was removed",
                                    name, level
                                )))
                            }
                        }
                    }
                    if !acquired {
                        // Roll back everything this call acquired so far.
                        for held in &held_so_far {
                            set.get_or_create(held).release(owner);
                        }
                        warn!(owner, ?level, name, "lock acquisition timed out");
                        return Err(DbError::LockTimeout);
                    }
                    held_so_far.push(name.clone());
                }
                self.record_held(owner, level, Some(held_so_far), false);
            }
        }
        debug!(owner, ?level, shared, "lock(s) acquired");
        Ok(())
    }

    fn record_held(&self, owner: OwnerId, level: LockLevel, names: Option<Vec<String>>, all: bool) {
        if let Some(entry) = self.owners.get(&owner) {
            let mut state = entry.lock();
            state.held_levels.insert(level);
            if all {
                state.held_all.insert(level);
            }
            if let Some(names) = names {
                state.held_names.entry(level).or_default().extend(names);
            }
        }
    }

    /// Release everything the owner holds at `level`, or all levels if
    /// `level` is `None`, in reverse level order as required by
    /// SPEC_FULL.md §4.8 step 9.
    pub fn release(&self, owner: OwnerId, level: Option<LockLevel>) {
        let levels: Vec<LockLevel> = match level {
            Some(l) => vec![l],
            None => LockLevel::ALL.into_iter().rev().collect(),
        };

        for lvl in levels {
            let (names, was_all) = {
                let Some(entry) = self.owners.get(&owner) else { continue };
                let mut state = entry.lock();
                let names = state.held_names.remove(&lvl).unwrap_or_default();
                let was_all = state.held_all.remove(&lvl);
                state.held_levels.remove(&lvl);
                (names, was_all)
            };
            let set = self.level_set(lvl);
            for name in names {
                if let Some(lock) = set.locks.get(&name) {
                    lock.release(owner);
                }
            }
            if was_all {
                set.set_lock.release(owner);
            }
        }
    }

    pub fn owned(&self, owner: OwnerId, level: LockLevel) -> Vec<String> {
        self.owners
            .get(&owner)
            .map(|e| e.lock().held_names.get(&level).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn is_owned(&self, owner: OwnerId, level: LockLevel) -> bool {
        self.owners
            .get(&owner)
            .map(|e| e.lock().held_levels.contains(&level))
            .unwrap_or(false)
    }

    /// `add(level, names, ...)`: allowed only under the set-level lock
    /// held exclusively by `owner` (SPEC_FULL.md §4.2).
    pub fn add(&self, owner: OwnerId, level: LockLevel, names: &[String]) -> Result<()> {
        let set = self.level_set(level);
        if !set.set_lock.is_owned_by(owner) {
            return Err(DbError::ProgrammerError(format!(
                "add({:?}) requires the set-level lock held exclusively",
                level
            )));
        }
        for name in names {
            set.get_or_create(name);
        }
        Ok(())
    }

    /// `remove(level, names)`: requires exclusive ownership of each
    /// name; wakes pending acquirers with a "removed" error.
    pub fn remove(&self, owner: OwnerId, level: LockLevel, names: &[String]) -> Result<()> {
        let set = self.level_set(level);
        for name in names {
            let lock = set.get_or_create(name);
            if !lock.is_owned_by(owner) {
                return Err(DbError::GanetiLockError(format!(
                    "remove({name}) requires exclusive ownership"
                )));
            }
            lock.release(owner);
            lock.mark_removed()?;
            set.locks.remove(name);
        }
        Ok(())
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self {
            levels: LockLevel::ALL.map(LockSet::new),
            owners: DashMap::new(),
            next_owner: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_order_enforced() {
        let mgr = LockManager::new();
        let owner = mgr.new_owner();
        mgr.acquire(owner, LockLevel::Cluster, &LockTarget::All, true, 0, None).unwrap();
        mgr.acquire(
            owner,
            LockLevel::Node,
            &LockTarget::Names(vec!["n1".into()]),
            false,
            0,
            None,
        )
        .unwrap();

        let err = mgr.acquire(
            owner,
            LockLevel::Instance,
            &LockTarget::Names(vec!["i1".into()]),
            false,
            0,
            None,
        );
        assert!(matches!(err, Err(DbError::ProgrammerError(_))));
    }

    #[test]
    fn bgl_required_for_lower_levels() {
        let mgr = LockManager::new();
        let owner = mgr.new_owner();
        let err = mgr.acquire(
            owner,
            LockLevel::Node,
            &LockTarget::Names(vec!["n1".into()]),
            false,
            0,
            None,
        );
        assert!(matches!(err, Err(DbError::ProgrammerError(_))));
    }

    #[test]
    fn release_restores_exact_set() {
        let mgr = LockManager::new();
        let owner = mgr.new_owner();
        mgr.acquire(owner, LockLevel::Cluster, &LockTarget::All, true, 0, None).unwrap();
        mgr.acquire(
            owner,
            LockLevel::Node,
            &LockTarget::Names(vec!["n1".into(), "n2".into()]),
            false,
            0,
            None,
        )
        .unwrap();
        assert_eq!(mgr.owned(owner, LockLevel::Node).len(), 2);
        mgr.release(owner, Some(LockLevel::Node));
        assert!(mgr.owned(owner, LockLevel::Node).is_empty());
        assert!(mgr.is_owned(owner, LockLevel::Cluster));
    }

    #[test]
    fn disjoint_owners_concurrent_acquire_succeeds() {
        let mgr = LockManager::new();
        let a = mgr.new_owner();
        let b = mgr.new_owner();
        mgr.acquire(a, LockLevel::Cluster, &LockTarget::All, true, 0, None).unwrap();
        mgr.acquire(b, LockLevel::Cluster, &LockTarget::All, true, 0, None).unwrap();
        mgr.acquire(a, LockLevel::Instance, &LockTarget::Names(vec!["i1".into()]), false, 0, None).unwrap();
        mgr.acquire(b, LockLevel::Instance, &LockTarget::Names(vec!["i2".into()]), false, 0, None).unwrap();
    }
}
