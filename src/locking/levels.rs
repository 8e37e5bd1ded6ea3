use serde::{Deserialize, Serialize};

/// Fixed total lock order (SPEC_FULL.md §4.2): cluster < instance <
/// nodegroup < node < node-alloc. Declared as an enum with explicit
/// discriminants so ordering is `derive(PartialOrd)`-free and checked
/// by raw integer comparison, matching the "strictly increasing level
/// order" invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LockLevel {
    Cluster = 0,
    Instance = 1,
    NodeGroup = 2,
    Node = 3,
    NodeAlloc = 4,
}

impl LockLevel {
    pub const ALL: [LockLevel; 5] = [
        LockLevel::Cluster,
        LockLevel::Instance,
        LockLevel::NodeGroup,
        LockLevel::Node,
        LockLevel::NodeAlloc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LockLevel::Cluster => "cluster",
            LockLevel::Instance => "instance",
            LockLevel::NodeGroup => "nodegroup",
            LockLevel::Node => "node",
            LockLevel::NodeAlloc => "node-alloc",
        }
    }
}

/// Sentinel for "all names at this level", engaging the set-level lock
/// instead of per-element locks (SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub enum LockTarget {
    Names(Vec<String>),
    All,
}
