//! Component D: hook master (SPEC_FULL.md §4.4), a direct generalization
//! of `lib/hooksmaster.py`'s `HooksMaster`, dispatching hook execution
//! through the RPC runner since hooks run on remote nodes.

use crate::error::{DbError, HookFailure, Result};
use crate::rpc::{NodeTarget, RpcRunner};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HType {
    Cluster,
    Node,
    Instance,
    Group,
}

impl HType {
    fn as_str(self) -> &'static str {
        match self {
            HType::Cluster => "cluster",
            HType::Node => "node",
            HType::Instance => "instance",
            HType::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptResult {
    Skip,
    Fail,
    Success,
}

pub struct HooksRunner<'a> {
    pub opcode: &'a str,
    /// Hook-path suffix, e.g. "group-add".
    pub hook_path: &'a str,
    pub htype: HType,
    pub cluster_name: &'a str,
    pub master_name: &'a str,
    pub data_dir: &'a str,
}

impl<'a> HooksRunner<'a> {
    /// Builds the environment for one phase per SPEC_FULL.md §4.4 step 1:
    /// fixed base + per-LU env, each key prefixed `GANETI_` (pre) or
    /// `GANETI_POST_` (post; post additionally merges the pre env
    /// unprefixed for cross-referencing).
    pub fn build_env(
        &self,
        phase: HookPhase,
        lu_env: &BTreeMap<String, String>,
        pre_env: Option<&BTreeMap<String, String>>,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PATH".into(), "/sbin:/usr/sbin:/bin:/usr/bin".into());
        env.insert("GANETI_HOOKS_VERSION".into(), "2".into());
        env.insert("GANETI_OP_CODE".into(), self.opcode.into());
        env.insert("GANETI_DATA_DIR".into(), self.data_dir.into());
        env.insert(
            "GANETI_HOOKS_PHASE".into(),
            match phase {
                HookPhase::Pre => "pre".into(),
                HookPhase::Post => "post".into(),
            },
        );
        env.insert("GANETI_HOOKS_PATH".into(), self.hook_path.into());
        env.insert("GANETI_OBJECT_TYPE".into(), self.htype.as_str().into());
        env.insert("GANETI_CLUSTER".into(), self.cluster_name.into());
        env.insert("GANETI_MASTER".into(), self.master_name.into());

        let prefix = match phase {
            HookPhase::Pre => "GANETI_",
            HookPhase::Post => "GANETI_POST_",
        };
        for (k, v) in lu_env {
            env.insert(format!("{prefix}{k}"), v.clone());
        }

        if phase == HookPhase::Post {
            if let Some(pre) = pre_env {
                for (k, v) in pre {
                    // unprefixed GANETI_ keys inherited from pre, not
                    // re-prefixed (SPEC_FULL.md §8 invariant 8).
                    env.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        env
    }

    /// Runs one phase against `nodes`, fanning out through the RPC
    /// runner. Pre-phase: any FAIL -> `HooksAbort`; empty result set is
    /// a fatal `HooksFailure`. Post-phase: FAILs logged, not fatal;
    /// empty result set logged only.
    pub async fn run_phase(
        &self,
        phase: HookPhase,
        rpc: &RpcRunner,
        nodes: &[NodeTarget],
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let args = serde_json::json!({ "hook_path": self.hook_path, "env": env });
        let results = rpc.call(nodes, "run_hooks", &args).await;

        if results.values().all(|r| r.fail_msg.is_some() && !r.is_success()) && !nodes.is_empty() {
            let msg = format!("no usable response running hooks for {}", self.hook_path);
            return match phase {
                HookPhase::Pre => Err(DbError::HooksFailure(msg)),
                HookPhase::Post => {
                    warn!(hook_path = self.hook_path, "post-hook communication failure");
                    Ok(())
                }
            };
        }

        let mut failures = Vec::new();
        for (node, result) in &results {
            let outcome = interpret_script_result(result);
            if outcome == ScriptResult::Fail {
                failures.push(HookFailure {
                    node: node.clone(),
                    script: self.hook_path.to_string(),
                    output: result
                        .payload
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| result.fail_msg.clone().unwrap_or_default()),
                });
            }
        }

        if !failures.is_empty() {
            return match phase {
                HookPhase::Pre => Err(DbError::HooksAbort(failures)),
                HookPhase::Post => {
                    for f in &failures {
                        warn!(node = %f.node, script = %f.script, "post-hook failed");
                    }
                    Ok(())
                }
            };
        }
        Ok(())
    }

    /// `RunConfigUpdate`: a single post-phase hook on the master, fired
    /// when the LU's Exec modified the config (SPEC_FULL.md §4.4 step 4).
    pub async fn run_config_update(&self, rpc: &RpcRunner, master: &NodeTarget) -> Result<()> {
        self.run_phase(HookPhase::Post, rpc, std::slice::from_ref(master), &BTreeMap::new()).await
    }
}

fn interpret_script_result(result: &crate::rpc::RpcResult) -> ScriptResult {
    if result.offline || result.fail_msg.is_some() {
        return ScriptResult::Fail;
    }
    match result.payload.as_ref().and_then(|p| p.get("code")).and_then(|c| c.as_str()) {
        Some("SKIP") => ScriptResult::Skip,
        Some("FAIL") => ScriptResult::Fail,
        _ => ScriptResult::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_phase_env_keys_all_prefixed_ganeti() {
        let runner = HooksRunner {
            opcode: "OP_GROUP_ADD",
            hook_path: "group-add",
            htype: HType::Group,
            cluster_name: "c1",
            master_name: "m1",
            data_dir: "/var/lib/ganeti",
        };
        let mut lu_env = BTreeMap::new();
        lu_env.insert("GROUP_NAME".into(), "g1".into());

        let env = runner.build_env(HookPhase::Pre, &lu_env, None);
        for key in env.keys() {
            assert!(key.starts_with("GANETI_"));
            assert!(!key.starts_with("GANETI_POST_"));
        }
        assert_eq!(env.get("GANETI_GROUP_NAME"), Some(&"g1".to_string()));
    }

    #[test]
    fn post_phase_merges_pre_env_unprefixed() {
        let runner = HooksRunner {
            opcode: "OP_GROUP_ADD",
            hook_path: "group-add",
            htype: HType::Group,
            cluster_name: "c1",
            master_name: "m1",
            data_dir: "/var/lib/ganeti",
        };
        let mut lu_env = BTreeMap::new();
        lu_env.insert("GROUP_NAME".into(), "g1".into());
        let pre_env = runner.build_env(HookPhase::Pre, &lu_env, None);

        let mut post_lu_env = BTreeMap::new();
        post_lu_env.insert("RESULT".into(), "ok".into());
        let post_env = runner.build_env(HookPhase::Post, &post_lu_env, Some(&pre_env));

        assert_eq!(post_env.get("GANETI_POST_RESULT"), Some(&"ok".to_string()));
        assert_eq!(post_env.get("GANETI_GROUP_NAME"), Some(&"g1".to_string()));
    }
}
