//! conductor-ping: round-trip a ping through the configured conductor API.
//!
//! In remote mode a conductor backed by an in-memory manager is served on an
//! in-process bus first, so the call exercises the full RPC path.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use conductor_api::{
    build_conductor_api, serve_on_bus, telemetry, ConductorArgs, ConductorConfig, InMemoryBus,
    MemoryManager, RpcTransport,
};
use conductor_core::{ConductorManager, RequestContext, Value, OPERATIONS};
use tracing::info;

/// Ping a conductor and print the reply.
#[derive(Parser, Debug)]
#[command(name = "conductor-ping")]
#[command(about = "Round-trip a ping through the local or remote conductor API")]
struct Args {
    #[command(flatten)]
    conductor: ConductorArgs,

    /// Message sent as the ping argument
    #[arg(short, long, default_value = "hello")]
    message: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Print the operation catalog and exit
    #[arg(long)]
    list_operations: bool,
}

fn print_catalog() {
    for op in OPERATIONS {
        let params: Vec<String> = op
            .params
            .iter()
            .map(|p| match p.default {
                Some(default) => format!("{}: {} = {default}", p.name, p.ty),
                None => format!("{}: {}", p.name, p.ty),
            })
            .collect();
        println!(
            "{}({}) -> {}  [{}]",
            op.name,
            params.join(", "),
            op.returns,
            op.manager_method
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.json)?;

    if args.list_operations {
        print_catalog();
        return Ok(());
    }

    let config = ConductorConfig::from(args.conductor);
    let manager = Arc::new(MemoryManager::new());
    let bus = Arc::new(InMemoryBus::new());
    if !config.use_local {
        serve_on_bus(&bus, Arc::clone(&manager), &config);
        info!(topic = %config.topic, node_id = %config.node_id, "conductor endpoint serving");
    }

    let local_manager: Arc<dyn ConductorManager> = manager;
    let transport: Arc<dyn RpcTransport> = bus;
    let api = build_conductor_api(&config, move || local_manager, move || transport)
        .context("invalid conductor configuration")?;

    let reply = api
        .ping(&RequestContext::admin(), Value::from(args.message), None)
        .await
        .context("ping failed")?;
    println!("{}", serde_json::Value::from(reply));
    Ok(())
}
