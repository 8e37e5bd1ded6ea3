//! Logical Units for node-group operations (component K, SPEC_FULL.md
//! §4.10/K), grounded on `lib/cmdlib/group.py`. Covers end-to-end
//! scenarios S1 (group add), S2 (concurrent node assign) and S6
//! (dry-run modify).

use crate::config::entities::{AllocPolicy, ConfigData, IPolicy, NodeGroup};
use crate::error::{DbError, PrereqCode, Result};
use crate::locking::{LockLevel, LockTarget};
use crate::mcpu::registry::{LockPlan, LuRegistry, LuVtable};
use uuid::Uuid;

pub fn register(registry: &mut LuRegistry) {
    registry.register("OP_GROUP_ADD", LuVtable {
        expand_names: group_add_expand_names,
        declare_locks: |_level, _state, _cfg| Ok(None),
        check_prereq: group_add_check_prereq,
        exec: group_add_exec,
        hook_path: Some("group-add"),
        htype: Some(crate::hooks::HType::Group),
        build_hooks_env: group_env,
    });

    registry.register("OP_GROUP_ASSIGN_NODES", LuVtable {
        expand_names: assign_nodes_expand_names,
        declare_locks: |_level, _state, _cfg| Ok(None),
        check_prereq: assign_nodes_check_prereq,
        exec: assign_nodes_exec,
        hook_path: Some("group-assign-nodes"),
        htype: Some(crate::hooks::HType::Group),
        build_hooks_env: group_env,
    });

    registry.register("OP_GROUP_SET_PARAMS", LuVtable {
        expand_names: set_params_expand_names,
        declare_locks: |_level, _state, _cfg| Ok(None),
        check_prereq: set_params_check_prereq,
        exec: set_params_exec,
        hook_path: Some("group-modify"),
        htype: Some(crate::hooks::HType::Group),
        build_hooks_env: group_env,
    });
}

fn group_env(state: &serde_json::Value) -> std::collections::BTreeMap<String, String> {
    let mut env = std::collections::BTreeMap::new();
    if let Some(name) = state.get("group_name").and_then(|v| v.as_str()) {
        env.insert("GROUP_NAME".into(), name.to_string());
    }
    env
}

// --- OP_GROUP_ADD -----------------------------------------------------

fn group_add_expand_names(
    params: &serde_json::Value,
    _cfg: &ConfigData,
) -> Result<(LockPlan, serde_json::Value)> {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DbError::prereq(PrereqCode::Inval, "group name is required"))?;

    let mut plan = LockPlan::default();
    // Creating a new group requires the set-level NodeGroup lock.
    plan.adds(LockLevel::NodeGroup, vec![name.to_string()]);

    Ok((plan, serde_json::json!({ "group_name": name, "alloc_policy": params.get("alloc_policy") })))
}

fn group_add_check_prereq(state: &serde_json::Value, cfg: &ConfigData) -> Result<serde_json::Value> {
    let name = state["group_name"].as_str().unwrap();
    if cfg.node_groups.values().any(|g| g.name == name) {
        return Err(DbError::prereq(PrereqCode::Exists, format!("group {name} already exists")));
    }
    Ok(state.clone())
}

fn group_add_exec(state: &serde_json::Value, cfg: &mut ConfigData) -> Result<serde_json::Value> {
    let name = state["group_name"].as_str().unwrap().to_string();
    let alloc_policy = match state.get("alloc_policy").and_then(|v| v.as_str()) {
        Some("last_resort") => AllocPolicy::LastResort,
        Some("unallocable") => AllocPolicy::Unallocable,
        _ => AllocPolicy::Preferred,
    };

    let uuid = Uuid::new_v4();
    cfg.node_groups.insert(
        uuid,
        NodeGroup {
            uuid,
            name: name.clone(),
            members: Default::default(),
            diskparams: Default::default(),
            ipolicy: IPolicy { vcpu_ratio: 4.0, spindle_ratio: 2.0, disk_templates: Default::default() },
            alloc_policy,
            serial_no: 0,
        },
    );
    cfg.serial_no += 1; // signal to the processor that Exec mutated the config

    Ok(serde_json::json!({ "uuid": uuid, "name": name, "members": Vec::<String>::new() }))
}

// --- OP_GROUP_ASSIGN_NODES --------------------------------------------

fn assign_nodes_expand_names(
    params: &serde_json::Value,
    _cfg: &ConfigData,
) -> Result<(LockPlan, serde_json::Value)> {
    let group = params
        .get("group_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DbError::prereq(PrereqCode::Inval, "group_name is required"))?
        .to_string();
    let nodes: Vec<String> = params
        .get("nodes")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let mut plan = LockPlan::default();
    plan.needs(LockLevel::NodeGroup, LockTarget::Names(vec![group.clone()]));
    plan.needs(LockLevel::Node, LockTarget::Names(nodes.clone()));

    Ok((plan, serde_json::json!({ "group_name": group, "nodes": nodes })))
}

fn assign_nodes_check_prereq(state: &serde_json::Value, cfg: &ConfigData) -> Result<serde_json::Value> {
    let group_name = state["group_name"].as_str().unwrap();
    if !cfg.node_groups.values().any(|g| g.name == group_name) {
        return Err(DbError::prereq(PrereqCode::NoEnt, format!("unknown group {group_name}")));
    }
    Ok(state.clone())
}

fn assign_nodes_exec(state: &serde_json::Value, cfg: &mut ConfigData) -> Result<serde_json::Value> {
    let group_name = state["group_name"].as_str().unwrap();
    let group_uuid = cfg
        .node_groups
        .values()
        .find(|g| g.name == group_name)
        .map(|g| g.uuid)
        .expect("checked in CheckPrereq");

    let node_names: Vec<String> =
        state["nodes"].as_array().unwrap().iter().filter_map(|v| v.as_str().map(String::from)).collect();

    for node in cfg.nodes.values_mut() {
        if node_names.contains(&node.name) {
            node.group = group_uuid;
        }
    }
    if let Some(group) = cfg.node_groups.get_mut(&group_uuid) {
        for node in cfg.nodes.values() {
            if node.group == group_uuid {
                group.members.insert(node.uuid);
            }
        }
    }
    cfg.serial_no += 1;

    Ok(serde_json::json!({ "group": group_name, "assigned": node_names }))
}

// --- OP_GROUP_SET_PARAMS (dry-run aware, scenario S6) -----------------

fn set_params_expand_names(
    params: &serde_json::Value,
    _cfg: &ConfigData,
) -> Result<(LockPlan, serde_json::Value)> {
    let group = params
        .get("group_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DbError::prereq(PrereqCode::Inval, "group_name is required"))?
        .to_string();
    let mut plan = LockPlan::default();
    plan.needs(LockLevel::NodeGroup, LockTarget::Names(vec![group.clone()]));
    Ok((plan, serde_json::json!({ "group_name": group, "alloc_policy": params.get("alloc_policy") })))
}

fn set_params_check_prereq(state: &serde_json::Value, cfg: &ConfigData) -> Result<serde_json::Value> {
    let group_name = state["group_name"].as_str().unwrap();
    let existing = cfg
        .node_groups
        .values()
        .find(|g| g.name == group_name)
        .ok_or_else(|| DbError::prereq(PrereqCode::NoEnt, format!("unknown group {group_name}")))?;

    // The LU's dry-run projection: what the post-Exec state would look
    // like, computed here so the processor can return it verbatim when
    // `dry_run` skips Exec (SPEC_FULL.md §4.8 step 6).
    let projected_policy = state.get("alloc_policy").and_then(|v| v.as_str()).unwrap_or(match existing.alloc_policy {
        AllocPolicy::Preferred => "preferred",
        AllocPolicy::LastResort => "last_resort",
        AllocPolicy::Unallocable => "unallocable",
    });

    let mut out = state.clone();
    out["dry_run_result"] = serde_json::json!({
        "group": group_name,
        "alloc_policy": projected_policy,
    });
    Ok(out)
}

fn set_params_exec(state: &serde_json::Value, cfg: &mut ConfigData) -> Result<serde_json::Value> {
    let group_name = state["group_name"].as_str().unwrap();
    let policy_str = state.get("alloc_policy").and_then(|v| v.as_str());

    let group = cfg
        .node_groups
        .values_mut()
        .find(|g| g.name == group_name)
        .expect("checked in CheckPrereq");

    if let Some(p) = policy_str {
        group.alloc_policy = match p {
            "last_resort" => AllocPolicy::LastResort,
            "unallocable" => AllocPolicy::Unallocable,
            _ => AllocPolicy::Preferred,
        };
        group.serial_no += 1;
    }
    cfg.serial_no += 1;

    Ok(serde_json::json!({ "group": group_name, "alloc_policy": policy_str }))
}
