use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;

use sdfs::client::protocol::*;
use sdfs::cluster::election::LowestIdElection;
use sdfs::cluster::membership::{HeartbeatMembership, Membership};
use sdfs::cluster::types::{Node, NodeId};
use sdfs::config::{Config, PeerConfig};
use sdfs::metadata::protocol::{FileNameRequest, SearchRequest};
use sdfs::metadata::types::ClusterView;
use sdfs::rpc::{Ack, RpcClient};
use sdfs::server::start_node;
use sdfs::transfer::types::ReceiverTag;

/// Client calls may wait on a full upload plus fan-out.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(900);

#[derive(Parser, Debug)]
#[command(name = "sdfs", about = "Replicated file store node and client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a storage node.
    Serve(ServeArgs),
    /// Store a local file under an SDFS name.
    Put {
        local_path: PathBuf,
        sdfs_name: String,
        #[command(flatten)]
        target: Target,
    },
    /// Fetch a file into the node's local directory.
    Get {
        sdfs_name: String,
        local_name: String,
        #[arg(long, value_enum, default_value_t = TagArg::Local)]
        tag: TagArg,
        #[command(flatten)]
        target: Target,
    },
    Delete {
        sdfs_name: String,
        #[command(flatten)]
        target: Target,
    },
    /// Show the replica set of a file.
    Ls {
        sdfs_name: String,
        #[command(flatten)]
        target: Target,
    },
    /// List file names matching a regular expression.
    Search {
        pattern: String,
        #[command(flatten)]
        target: Target,
    },
    /// Append every file starting with PREFIX into one local file.
    FetchPrefix {
        prefix: String,
        local_name: String,
        #[arg(long, value_enum, default_value_t = TagArg::Local)]
        tag: TagArg,
        #[command(flatten)]
        target: Target,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    node_id: Option<String>,
    #[arg(long)]
    rpc_addr: Option<SocketAddr>,
    #[arg(long)]
    transfer_addr: Option<SocketAddr>,
    /// Peer specs: "id=rpc_addr,transfer_addr", repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct Target {
    /// RPC address of the node that runs the operation.
    #[arg(long, default_value = "127.0.0.1:7000")]
    node: SocketAddr,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TagArg {
    Local,
    JobInput,
    JobOutput,
}

impl From<TagArg> for ReceiverTag {
    fn from(tag: TagArg) -> Self {
        match tag {
            TagArg::Local => ReceiverTag::ClientLocal,
            TagArg::JobInput => ReceiverTag::JobInput,
            TagArg::JobOutput => ReceiverTag::JobOutput,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        command => {
            init_tracing("warn", "pretty");
            run_client(command).await
        }
    }
}

fn init_tracing(level: &str, format: &str) {
    match format {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(level)
                .init();
        }
    }
}

fn parse_peer(spec: &str) -> anyhow::Result<PeerConfig> {
    let Some((id, addrs)) = spec.split_once('=') else {
        bail!("peer spec {spec:?} must look like id=rpc_addr,transfer_addr");
    };
    let Some((rpc, transfer)) = addrs.split_once(',') else {
        bail!("peer spec {spec:?} is missing the transfer address");
    };
    Ok(PeerConfig {
        id: id.to_string(),
        rpc_addr: rpc
            .parse()
            .with_context(|| format!("invalid rpc address in {spec:?}"))?,
        transfer_addr: transfer
            .parse()
            .with_context(|| format!("invalid transfer address in {spec:?}"))?,
    })
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(id) = args.node_id {
        config.node.id = id;
    }
    if let Some(addr) = args.rpc_addr {
        config.node.rpc_addr = addr;
    }
    if let Some(addr) = args.transfer_addr {
        config.node.transfer_addr = addr;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    for spec in &args.peers {
        config.cluster.peers.push(parse_peer(spec)?);
    }

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    let node_id = if config.node.id.is_empty() {
        NodeId::new()
    } else {
        NodeId(config.node.id.clone())
    };
    tracing::info!(
        node_id = %node_id,
        rpc_addr = %config.node.rpc_addr,
        transfer_addr = %config.node.transfer_addr,
        peers = config.cluster.peers.len(),
        "node starting"
    );

    let rpc_listener = TcpListener::bind(config.node.rpc_addr)
        .await
        .with_context(|| format!("cannot bind rpc address {}", config.node.rpc_addr))?;
    let transfer_listener = TcpListener::bind(config.node.transfer_addr)
        .await
        .with_context(|| {
            format!(
                "cannot bind transfer address {}",
                config.node.transfer_addr
            )
        })?;

    // 1. Membership and election:
    let local = Node::alive(
        node_id,
        rpc_listener.local_addr()?,
        transfer_listener.local_addr()?,
    );
    let membership = HeartbeatMembership::new(local, &config.cluster);
    let election = Arc::new(LowestIdElection::new(membership.clone()));

    // 2. Node services and HTTP router:
    let node = start_node(
        &config,
        membership.clone(),
        election,
        rpc_listener,
        transfer_listener,
    )
    .await
    .context("failed to start node")?;

    // 3. Background loops:
    membership.clone().start().await;
    node.metadata.clone().start().await;
    node.tracker
        .clone()
        .start_sweeper(
            Duration::from_secs(config.tracker.sweep_interval_secs),
            Duration::from_secs(config.tracker.retention_secs),
        )
        .await;

    tracing::info!(
        "Node {} ready (rpc {}, transfer {})",
        membership.local_id(),
        node.rpc_addr,
        node.transfer_addr
    );
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

async fn run_client(command: Command) -> anyhow::Result<()> {
    let rpc = RpcClient::new();
    match command {
        Command::Serve(_) => bail!("serve is not a client command"),
        Command::Put {
            local_path,
            sdfs_name,
            target,
        } => {
            let local_path = std::path::absolute(&local_path)
                .with_context(|| format!("cannot resolve {}", local_path.display()))?;
            let view: ClusterView = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_PUT,
                    &PutFileRequest {
                        local_path,
                        sdfs_name,
                    },
                    CLIENT_TIMEOUT,
                )
                .await?;
            print_view(&view);
        }
        Command::Get {
            sdfs_name,
            local_name,
            tag,
            target,
        } => {
            let _: Ack = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_GET,
                    &GetFileRequest {
                        sdfs_name,
                        local_name,
                        tag: Some(tag.into()),
                    },
                    CLIENT_TIMEOUT,
                )
                .await?;
            println!("ok");
        }
        Command::Delete { sdfs_name, target } => {
            let _: Ack = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_DELETE,
                    &FileNameRequest::new(&sdfs_name),
                    CLIENT_TIMEOUT,
                )
                .await?;
            println!("deleted {sdfs_name}");
        }
        Command::Ls { sdfs_name, target } => {
            let view: ClusterView = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_LS,
                    &FileNameRequest::new(&sdfs_name),
                    CLIENT_TIMEOUT,
                )
                .await?;
            print_view(&view);
        }
        Command::Search { pattern, target } => {
            let names: Vec<String> = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_SEARCH,
                    &SearchRequest { pattern },
                    CLIENT_TIMEOUT,
                )
                .await?;
            for name in names {
                println!("{name}");
            }
        }
        Command::FetchPrefix {
            prefix,
            local_name,
            tag,
            target,
        } => {
            let names: Vec<String> = rpc
                .post_json(
                    target.node,
                    ENDPOINT_SDFS_FETCH_PREFIX,
                    &FetchPrefixRequest {
                        prefix,
                        local_name,
                        tag: Some(tag.into()),
                    },
                    CLIENT_TIMEOUT,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
    }
    Ok(())
}

fn print_view(view: &ClusterView) {
    match &view.master {
        Some(master) => println!("{}: master {} ({:?})", view.file_name, master.node_id, master.status),
        None => println!("{}: no master", view.file_name),
    }
    for servant in &view.servants {
        println!("  servant {} ({:?})", servant.node_id, servant.status);
    }
}
