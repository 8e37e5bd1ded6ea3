//! # masterd
//!
//! Master daemon entry point: brings up the config store, lock
//! manager, job queue, opcode processor, confd listener, LUXI socket
//! and RAPI server, the way the teacher's server binary wires up its
//! subsystems before accepting connections.

use clusterd::bootstrap;
use clusterd::config::ConfigStore;
use clusterd::confd::ConfdClient;
use clusterd::jqueue::JobQueue;
use clusterd::locking::LockManager;
use clusterd::lulib;
use clusterd::mcpu::{OpCode, Processor};
use clusterd::rapi::auth::UsersFile;
use clusterd::rapi::{self, RapiState};
use clusterd::rpc::RpcRunner;
use clusterd::{MasterConfig, Result, VERSION};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let config = MasterConfig::default();
    fs::create_dir_all(&config.data_dir).ok();
    if let Some(parent) = std::path::Path::new(&config.luxi_socket).parent() {
        fs::create_dir_all(parent).ok();
    }

    info!("Initializing clusterd v{}", VERSION);

    let config_store = ConfigStore::open(std::path::Path::new(&config.data_dir))?;
    if config_store.snapshot().cluster.is_none() {
        info!("No existing cluster config found, bootstrapping");
        let initial = bootstrap::init_cluster(bootstrap::InitClusterParams {
            cluster_name: "cluster.example".to_string(),
            mac_prefix: "aa:00:00".to_string(),
            master_name: "master.example".to_string(),
            master_ip: "127.0.0.1".to_string(),
            candidate_pool_size: 3,
        })?;
        config_store.commit(move |cfg| {
            *cfg = initial.clone();
            Ok(())
        })?;
    }

    let locks = LockManager::new();
    let registry = Arc::new(lulib::build_registry());
    let rpc = Arc::new(RpcRunner::new(config.rpc_port, Duration::from_secs(30)));
    let queue = JobQueue::open(std::path::Path::new(&config.data_dir).join("queue"))?;

    let processor = Arc::new(Processor::new(
        config_store.clone(),
        locks.clone(),
        registry.clone(),
        rpc.clone(),
        queue.clone(),
        config.data_dir.clone(),
    ));

    let hmac_key = load_or_generate_hmac_key(&config.confd_hmac_key_file)?;
    let confd_addr = format!("0.0.0.0:{}", config.confd_port).parse().expect("valid confd bind address");
    let (confd_client, mut confd_upcalls) = ConfdClient::bind(confd_addr, Vec::new(), hmac_key).await?;
    tokio::spawn(confd_client.clone().recv_loop());
    tokio::spawn(async move { while confd_upcalls.recv().await.is_some() {} });
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            confd_client.expire_requests().await;
        }
    });

    let luxi_listener = clusterd::luxi::bind(&config.luxi_socket).await?;
    let luxi_processor = processor.clone();
    tokio::spawn(async move {
        loop {
            match luxi_listener.accept().await {
                Ok((stream, _)) => {
                    let processor = luxi_processor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_luxi_connection(stream, processor).await {
                            error!("luxi connection error: {}", e);
                        }
                    });
                }
                Err(e) => error!("luxi accept failed: {}", e),
            }
        }
    });

    let users = Arc::new(load_users_file(&config.rapi_users_file));
    let rapi_state = RapiState { queue: queue.clone(), users };
    let rapi_router = rapi::router(rapi_state);
    let rapi_addr = format!("0.0.0.0:{}", config.rapi_port);

    info!("Starting RAPI on {}", rapi_addr);
    println!();
    println!("clusterd is ready");
    println!("  LUXI socket : {}", config.luxi_socket);
    println!("  RAPI        : http://{}", rapi_addr);
    println!();

    let listener = tokio::net::TcpListener::bind(&rapi_addr).await.map_err(clusterd::DbError::Io)?;
    axum::serve(listener, rapi_router)
        .await
        .map_err(|e| clusterd::DbError::Network(e.to_string()))
}

async fn serve_luxi_connection(mut stream: tokio::net::UnixStream, processor: Arc<Processor>) -> Result<()> {
    let request: clusterd::luxi::LuxiRequest = clusterd::luxi::read_message(&mut stream).await?;
    let reply = match request.method.as_str() {
        "SubmitJob" => match serde_json::from_value::<Vec<OpCode>>(request.args) {
            Ok(opcodes) => {
                let raw: Vec<serde_json::Value> =
                    opcodes.iter().map(|o| serde_json::to_value(o).unwrap_or_default()).collect();
                match processor.queue.submit(raw) {
                    Ok(id) => clusterd::luxi::LuxiReply { success: true, result: serde_json::json!(id) },
                    Err(e) => clusterd::luxi::LuxiReply { success: false, result: serde_json::json!(e.encode()) },
                }
            }
            Err(e) => clusterd::luxi::LuxiReply { success: false, result: serde_json::json!(e.to_string()) },
        },
        other => clusterd::luxi::LuxiReply {
            success: false,
            result: serde_json::json!(format!("unknown method '{other}'")),
        },
    };
    clusterd::luxi::write_message(&mut stream, &reply).await
}

fn load_or_generate_hmac_key(path: &str) -> Result<Vec<u8>> {
    if let Ok(existing) = fs::read(path) {
        return Ok(existing);
    }
    let key = bootstrap::generate_hmac_key();
    if let Some(parent) = std::path::Path::new(path).parent() {
        fs::create_dir_all(parent).ok();
    }
    fs::write(path, &key).map_err(clusterd::DbError::Io)?;
    Ok(key)
}

fn load_users_file(path: &str) -> UsersFile {
    let contents = fs::read_to_string(path).unwrap_or_default();
    UsersFile::from_lines(&contents)
}

fn print_banner() {
    println!("================================================================");
    println!(" clusterd - cluster virtualization control plane  v{}", VERSION);
    println!("================================================================");
}
