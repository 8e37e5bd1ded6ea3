//! LU dispatch table: opcode kind -> function-pointer vtable
//! (SPEC_FULL.md §9 redesign flag, replacing the class-per-opcode LU
//! hierarchy with metaclass-built slots).

use crate::config::ConfigData;
use crate::error::Result;
use crate::locking::{LockLevel, LockTarget};
use std::collections::BTreeMap;

/// What an LU wants at one lock level: either a concrete/ALL target to
/// acquire (`needed_locks`), or a request to create new names under the
/// set-level lock (`add_locks`) — mutually exclusive per level
/// (SPEC_FULL.md §4.8 step 1).
#[derive(Debug, Clone)]
pub enum LockIntent {
    Needed(LockTarget),
    Add(Vec<String>),
}

#[derive(Default)]
pub struct LockPlan {
    pub by_level: BTreeMap<LockLevel, LockIntent>,
    pub req_bgl: bool,
}

impl LockPlan {
    pub fn needs(&mut self, level: LockLevel, target: LockTarget) {
        self.by_level.insert(level, LockIntent::Needed(target));
    }

    pub fn adds(&mut self, level: LockLevel, names: Vec<String>) {
        self.by_level.insert(level, LockIntent::Add(names));
    }
}

/// Opaque per-LU scratch space threaded through the phases; concrete LUs
/// stash whatever they computed in ExpandNames/DeclareLocks for later
/// phases to read back, in lieu of `self.*` fields on a class instance.
pub type LuState = serde_json::Value;

pub struct LuVtable {
    pub expand_names: fn(&serde_json::Value, &ConfigData) -> Result<(LockPlan, LuState)>,
    pub declare_locks: fn(LockLevel, &LuState, &ConfigData) -> Result<Option<LockTarget>>,
    pub check_prereq: fn(&LuState, &ConfigData) -> Result<LuState>,
    pub exec: fn(&LuState, &mut ConfigData) -> Result<serde_json::Value>,
    pub hook_path: Option<&'static str>,
    pub htype: Option<crate::hooks::HType>,
    pub build_hooks_env: fn(&LuState) -> std::collections::BTreeMap<String, String>,
}

pub struct LuRegistry {
    table: BTreeMap<&'static str, LuVtable>,
}

impl LuRegistry {
    pub fn new() -> Self {
        Self { table: BTreeMap::new() }
    }

    pub fn register(&mut self, kind: &'static str, vtable: LuVtable) {
        self.table.insert(kind, vtable);
    }

    pub fn get(&self, kind: &str) -> Result<&LuVtable> {
        self.table
            .get(kind)
            .ok_or_else(|| crate::error::DbError::OpCodeUnknown(kind.to_string()))
    }
}

impl Default for LuRegistry {
    fn default() -> Self {
        Self::new()
    }
}
