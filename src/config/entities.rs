//! Core persisted entities (see SPEC_FULL.md §3 DATA MODEL).
//!
//! Grounded on `lib/objects.py`'s `Cluster`/`Node`/`Instance`/`Disk`/`NIC`/
//! `NodeGroup`/`Network` classes; reflection-based `ToDict` serialization is
//! replaced with plain `serde_json` derives (SPEC_FULL.md §9 redesign flag).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub type NodeId = Uuid;
pub type GroupId = Uuid;

/// Typed hypervisor/backend/NIC parameter value, replacing Python's
/// dict-typed hvparams/beparams/nicparams (SPEC_FULL.md §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

pub type ParamSet = BTreeMap<String, ParamValue>;

/// Layered parameter resolution: cluster default <- group <- instance.
/// Unknown keys are rejected at the call site, not here; this just merges.
pub fn merge_params(cluster: &ParamSet, group: &ParamSet, instance: &ParamSet) -> ParamSet {
    let mut out = cluster.clone();
    for (k, v) in group {
        out.insert(k.clone(), v.clone());
    }
    for (k, v) in instance {
        out.insert(k.clone(), v.clone());
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_name: String,
    pub master_node: NodeId,
    pub candidate_pool_size: u32,
    pub enabled_hypervisors: BTreeSet<String>,
    pub hvparams: BTreeMap<String, ParamSet>,
    pub beparams: ParamSet,
    pub nicparams: ParamSet,
    pub uuid: Uuid,
    pub ctime: f64,
    pub mtime: f64,
    pub serial_no: u64,
    pub tcp_udp_port_pool: BTreeSet<u16>,
    pub mac_prefix: String,
    /// PEM-encoded RSA host key pair (SPEC_FULL.md §10.5, bootstrap).
    pub rsa_host_pubkey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: NodeId,
    pub name: String,
    pub primary_ip: String,
    pub secondary_ip: String,
    pub master_candidate: bool,
    pub offline: bool,
    pub drained: bool,
    pub master_capable: bool,
    pub vm_capable: bool,
    pub group: GroupId,
    pub ndparams: ParamSet,
    pub tags: BTreeSet<String>,
    pub serial_no: u64,
}

impl Node {
    /// Invariant from SPEC_FULL.md §3: offline implies not a master
    /// candidate in effect, even if the stored flag lags.
    pub fn is_effective_master_candidate(&self) -> bool {
        self.master_candidate && !self.offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskTemplate {
    Diskless,
    Plain,
    Drbd,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NicMode {
    Bridged,
    Routed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nic {
    pub mac: String,
    pub ip: Option<String>,
    pub link: String,
    pub mode: NicMode,
}

pub type DiskIdx = usize;

/// Recursive disk tree, arena-indexed rather than pointer/children-list
/// based (SPEC_FULL.md §9 redesign flag: "arena-allocated tree with
/// parent indices ... Cycles are impossible by construction").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Disk {
    Lvm {
        logical_id: (String, String),
        size_mb: u64,
    },
    File {
        path: String,
        size_mb: u64,
    },
    Drbd8 {
        primary_node: NodeId,
        secondary_node: NodeId,
        port: u16,
        pminor: u32,
        sminor: u32,
        secret: String,
        /// exactly two children: (data, metadata)
        children: [DiskIdx; 2],
        size_mb: u64,
    },
}

impl Disk {
    pub fn size_mb(&self) -> u64 {
        match self {
            Disk::Lvm { size_mb, .. } | Disk::File { size_mb, .. } | Disk::Drbd8 { size_mb, .. } => *size_mb,
        }
    }

    pub fn record_grow(&mut self, extra_mb: u64) {
        match self {
            Disk::Lvm { size_mb, .. } | Disk::File { size_mb, .. } | Disk::Drbd8 { size_mb, .. } => {
                *size_mb += extra_mb;
            }
        }
    }
}

/// An instance's disk tree, arena-backed: index 0 is always the root
/// disk the instance references directly (depth <= 2 enforced by callers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskArena {
    pub nodes: Vec<Disk>,
}

impl DiskArena {
    pub fn push(&mut self, disk: Disk) -> DiskIdx {
        self.nodes.push(disk);
        self.nodes.len() - 1
    }

    pub fn depth(&self, idx: DiskIdx) -> usize {
        match &self.nodes[idx] {
            Disk::Drbd8 { children, .. } => {
                1 + children.iter().map(|c| self.depth(*c)).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    Up,
    Down,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub primary_node: NodeId,
    pub disk_template: DiskTemplate,
    pub disks: DiskArena,
    /// root disk indices, ordered
    pub disk_roots: Vec<DiskIdx>,
    pub nics: Vec<Nic>,
    pub hvparams: ParamSet,
    pub beparams: ParamSet,
    pub admin_state: AdminState,
    pub network_port: Option<u16>,
    pub serial_no: u64,
}

impl Instance {
    /// secondary_nodes is derived from the DRBD disks, never stored
    /// directly (SPEC_FULL.md §3).
    pub fn secondary_nodes(&self) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        for &root in &self.disk_roots {
            collect_secondaries(&self.disks, root, &mut out);
        }
        out
    }
}

fn collect_secondaries(arena: &DiskArena, idx: DiskIdx, out: &mut BTreeSet<NodeId>) {
    if let Disk::Drbd8 { secondary_node, children, .. } = &arena.nodes[idx] {
        out.insert(*secondary_node);
        for c in children {
            collect_secondaries(arena, *c, out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocPolicy {
    Preferred,
    LastResort,
    Unallocable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IPolicy {
    pub vcpu_ratio: f64,
    pub spindle_ratio: f64,
    pub disk_templates: BTreeSet<DiskTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroup {
    pub uuid: GroupId,
    pub name: String,
    pub members: BTreeSet<NodeId>,
    pub diskparams: ParamSet,
    pub ipolicy: IPolicy,
    pub alloc_policy: AllocPolicy,
    pub serial_no: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub uuid: Uuid,
    pub name: String,
    pub network: String,
    pub gateway: Option<String>,
    pub network6: Option<String>,
    pub gateway6: Option<String>,
    /// `"0"`/`"1"` bitstring matching the original's `bitarray.to01()`
    /// on-disk representation, so config.data stays byte-compatible
    /// with the thing it's modeling.
    pub reservations: String,
    pub ext_reservations: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigData {
    pub version: u32,
    pub cluster: Option<Cluster>,
    pub nodes: BTreeMap<NodeId, Node>,
    pub instances: BTreeMap<String, Instance>,
    pub node_groups: BTreeMap<GroupId, NodeGroup>,
    pub networks: BTreeMap<Uuid, Network>,
    pub serial_no: u64,
    pub ctime: f64,
    pub mtime: f64,
}
