//! The opcode processor (component H, SPEC_FULL.md §4.8), generalizing
//! `lib/mcpu.py`'s `Processor`. Exception-driven control flow becomes
//! explicit `Result`s at each phase (SPEC_FULL.md §9 redesign flag).

use crate::config::ConfigStore;
use crate::error::{DbError, Result};
use crate::hooks::{HType, HookPhase, HooksRunner};
use crate::jqueue::{JobQueue, OpStatus};
use crate::locking::{LockLevel, LockManager, LockTarget, OwnerId};
use crate::mcpu::registry::{LockIntent, LuRegistry};
use crate::rpc::{NodeTarget, RpcRunner};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Processor {
    pub config: Arc<ConfigStore>,
    pub locks: Arc<LockManager>,
    pub registry: Arc<LuRegistry>,
    pub rpc: Arc<RpcRunner>,
    pub queue: Arc<JobQueue>,
    pub data_dir: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OpCode {
    pub kind: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub dry_run: bool,
    /// Hard wall-clock budget for every lock this opcode acquires
    /// (SPEC_FULL.md §4.8): on expiry, `LockManager::acquire` returns
    /// `LockTimeout` rather than running the full retry schedule.
    #[serde(default)]
    pub deadline_secs: Option<f64>,
}

impl Processor {
    pub fn new(
        config: Arc<ConfigStore>,
        locks: Arc<LockManager>,
        registry: Arc<LuRegistry>,
        rpc: Arc<RpcRunner>,
        queue: Arc<JobQueue>,
        data_dir: String,
    ) -> Self {
        Self { config, locks, registry, rpc, queue, data_dir }
    }

    /// Drives a whole job: opcodes run sequentially, each observing the
    /// config effects of its predecessors in the same job (SPEC_FULL.md §5).
    pub async fn run_job(&self, job_id: u64, opcodes: Vec<OpCode>) -> Result<()> {
        self.queue.update(job_id, |j| j.start_ts = Some(now_secs()))?;

        for (idx, opcode) in opcodes.into_iter().enumerate() {
            self.queue.update(job_id, |j| j.ops[idx].status = OpStatus::Running)?;

            if self.is_canceling(job_id) {
                self.queue.update(job_id, |j| j.ops[idx].status = OpStatus::Canceled)?;
                continue;
            }

            match self.exec_opcode(&opcode).await {
                Ok(result) => {
                    self.queue.update(job_id, |j| {
                        j.ops[idx].status = OpStatus::Success;
                        j.ops[idx].result = Some(result);
                    })?;
                }
                Err(e) => {
                    // A caller-supplied deadline turns lock contention into a
                    // reported failure instead of an indefinite block: surface
                    // it as an OpPrereqError the client can distinguish from a
                    // config/precondition problem (SPEC_FULL.md §4.8).
                    let e = match e {
                        DbError::LockTimeout => DbError::prereq(
                            crate::error::PrereqCode::NoRes,
                            format!("timed out waiting for locks within the {}s deadline", opcode.deadline_secs.unwrap_or_default()),
                        ),
                        other => other,
                    };
                    warn!(job_id, opcode = %opcode.kind, error = %e, "opcode failed");
                    self.queue.update(job_id, |j| {
                        j.ops[idx].status = OpStatus::Error;
                        j.ops[idx].result = Some(serde_json::to_value(e.encode()).unwrap_or_default());
                    })?;
                }
            }
        }

        self.queue.update(job_id, |j| j.end_ts = Some(now_secs()))?;
        Ok(())
    }

    fn is_canceling(&self, job_id: u64) -> bool {
        self.queue
            .get(job_id)
            .map(|j| j.ops.iter().any(|o| o.status == OpStatus::Canceling))
            .unwrap_or(false)
    }

    /// Executes one opcode through the full ExpandNames -> DeclareLocks
    /// -> CheckPrereq -> pre-hooks -> Exec -> post-hooks -> RunConfigUpdate
    /// pipeline (SPEC_FULL.md §4.8).
    async fn exec_opcode(&self, opcode: &OpCode) -> Result<serde_json::Value> {
        let vtable = self.registry.get(&opcode.kind)?;
        let owner = self.locks.new_owner();

        let snapshot = self.config.snapshot();
        let (plan, mut lu_state) = (vtable.expand_names)(&opcode.params, &snapshot)?;

        // Step 2: cluster lock, shared unless REQ_BGL.
        self.locks.acquire(
            owner,
            LockLevel::Cluster,
            &LockTarget::Names(vec!["BGL".into()]),
            !plan.req_bgl,
            0,
            opcode.deadline_secs,
        )?;

        let mut acquired_levels = vec![LockLevel::Cluster];
        let result = self.acquire_and_run(&opcode, &vtable, &plan, owner, &mut lu_state, &mut acquired_levels).await;

        // Step 9: release in reverse order regardless of outcome.
        for level in acquired_levels.into_iter().rev() {
            self.locks.release(owner, Some(level));
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn acquire_and_run(
        &self,
        opcode: &OpCode,
        vtable: &crate::mcpu::registry::LuVtable,
        plan: &crate::mcpu::registry::LockPlan,
        owner: OwnerId,
        lu_state: &mut serde_json::Value,
        acquired_levels: &mut Vec<LockLevel>,
    ) -> Result<serde_json::Value> {
        for &level in LockLevel::ALL.iter().filter(|l| **l != LockLevel::Cluster) {
            let snapshot = self.config.snapshot();
            let refined = (vtable.declare_locks)(level, lu_state, &snapshot)?;

            let intent = refined
                .map(LockIntent::Needed)
                .or_else(|| plan.by_level.get(&level).cloned());

            let Some(intent) = intent else { continue };

            match intent {
                LockIntent::Needed(target) => {
                    self.locks.acquire(owner, level, &target, false, 0, opcode.deadline_secs)?;
                    acquired_levels.push(level);
                }
                LockIntent::Add(names) => {
                    self.locks.acquire(owner, level, &LockTarget::All, false, 0, opcode.deadline_secs)?;
                    acquired_levels.push(level);
                    self.locks.add(owner, level, &names)?;
                }
            }
        }

        // Step 4: CheckPrereq.
        let snapshot = self.config.snapshot();
        let checked_state = (vtable.check_prereq)(lu_state, &snapshot)?;
        *lu_state = checked_state;

        let hooks = vtable.hook_path.map(|hook_path| HooksRunner {
            opcode: &opcode.kind,
            hook_path,
            htype: vtable.htype.unwrap_or(HType::Cluster),
            cluster_name: snapshot.cluster.as_ref().map(|c| c.cluster_name.as_str()).unwrap_or("unknown"),
            master_name: "master",
            data_dir: &self.data_dir,
        });

        let lu_env = (vtable.build_hooks_env)(lu_state);
        let master_target = NodeTarget { name: "master".into(), address: "127.0.0.1".into(), offline: false };

        let pre_env = hooks.as_ref().map(|h| h.build_env(HookPhase::Pre, &lu_env, None));
        if let (Some(h), Some(pre_env)) = (&hooks, &pre_env) {
            h.run_phase(HookPhase::Pre, &self.rpc, std::slice::from_ref(&master_target), pre_env).await?;
        }

        // Step 6: Exec, skipped entirely on dry_run. CheckPrereq is
        // expected to have stashed its dry-run projection under
        // "dry_run_result" in lu_state (SPEC_FULL.md §4.8 step 6).
        let (exec_result, config_changed) = if opcode.dry_run {
            let projection = lu_state
                .get("dry_run_result")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({ "dry_run": true }));
            (projection, false)
        } else {
            let mut staged = self.config.snapshot();
            let before_serial = staged.serial_no;
            let result = (vtable.exec)(lu_state, &mut staged)?;
            // An LU signals "I mutated the config" by bumping write_count
            // (here: staged.serial_no) itself; the processor only detects
            // and persists the change, it doesn't infer it from the result.
            let changed = staged.serial_no != before_serial;
            if changed {
                self.config.commit(|cfg| {
                    *cfg = staged.clone();
                    Ok(())
                })?;
            }
            (result, changed)
        };

        if !opcode.dry_run {
            if let Some(h) = &hooks {
                let post_env = h.build_env(HookPhase::Post, &lu_env, pre_env.as_ref());
                h.run_phase(HookPhase::Post, &self.rpc, std::slice::from_ref(&master_target), &post_env).await?;

                if config_changed {
                    h.run_config_update(&self.rpc, &master_target).await?;
                }
            }
        }

        info!(opcode = %opcode.kind, dry_run = opcode.dry_run, "opcode executed");
        Ok(exec_result)
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
