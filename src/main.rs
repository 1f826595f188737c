//! `ledger-node`: boots a single account-model node — loads genesis,
//! opens disk storage, starts the mining/peer-sync/tx-gossip worker, and
//! serves the private node-to-node HTTP surface.

mod rpc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use ledger_core::{
    ChannelEventSink, ConsensusMode, DiskStorage, EngineConfig, Genesis, HttpPeerTransport,
    PeerTransport, StateEngine,
};
use ledger_worker::{Worker, WorkerConfig};
use shared::Address;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "ledger-node")]
#[command(about = "Minimal account-model blockchain node")]
#[command(version)]
struct Cli {
    /// Directory blocks are persisted to, one JSON file per block.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Path to the genesis parameters file.
    #[arg(long, default_value = "./genesis.json")]
    genesis: PathBuf,

    /// Address this node's private HTTP surface binds to.
    #[arg(long, default_value = "127.0.0.1:7000")]
    bind: SocketAddr,

    /// This node's own address, credited as `miner` on blocks it produces.
    #[arg(long)]
    node_address: Address,

    /// Consensus mode this node runs under.
    #[arg(long, value_enum, default_value = "pow")]
    consensus: ConsensusArg,

    /// Required when `--consensus poa`: the authority address allowed to
    /// produce blocks.
    #[arg(long)]
    poa_authority: Option<Address>,

    /// Known peer hosts to seed the registry with, e.g. `http://10.0.0.2:7000`.
    #[arg(long)]
    peer: Vec<String>,

    /// Maximum transactions a mined block may include.
    #[arg(long, default_value = "100")]
    max_txs_per_block: usize,

    /// How often `peerOperations` polls known peers for their status.
    #[arg(long, default_value = "10")]
    peer_update_interval_secs: u64,

    /// How often a proof-of-authority round fires.
    #[arg(long, default_value = "5")]
    poa_block_interval_secs: u64,

    /// `trace`, `debug`, `info`, `warn`, or `error`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConsensusArg {
    Pow,
    Poa,
}

fn init_tracing(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> shared::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let genesis = Genesis::load_from_file(&cli.genesis)?;
    let storage = Arc::new(DiskStorage::open(&cli.data_dir)?);
    let events = Arc::new(ChannelEventSink::new(256));

    let consensus = match cli.consensus {
        ConsensusArg::Pow => ConsensusMode::ProofOfWork,
        ConsensusArg::Poa => {
            let authority = cli.poa_authority.ok_or_else(|| {
                shared::BlockchainError::ConfigError(
                    "--poa-authority is required when --consensus poa".to_string(),
                )
            })?;
            ConsensusMode::ProofOfAuthority { authority }
        }
    };

    let config = EngineConfig {
        node_address: cli.node_address,
        max_txs_per_block: cli.max_txs_per_block,
    };

    let engine = Arc::new(StateEngine::new(genesis, storage, events, consensus, config)?);
    info!(
        node_address = %cli.node_address,
        latest_block = engine.latest_block_number(),
        "state engine ready"
    );

    for peer in &cli.peer {
        engine.peers().add(peer.clone());
    }

    let transport: Arc<dyn PeerTransport> = Arc::new(HttpPeerTransport::new());
    let worker_config = WorkerConfig {
        peer_update_interval: std::time::Duration::from_secs(cli.peer_update_interval_secs),
        poa_block_interval: std::time::Duration::from_secs(cli.poa_block_interval_secs),
        max_tx_share_requests: 64,
    };
    let (handle, worker) = Worker::spawn(Arc::clone(&engine), transport, worker_config);
    engine.set_worker_handle(handle.clone());

    let rpc_state = Arc::new(rpc::RpcState {
        engine: Arc::clone(&engine),
    });

    tokio::select! {
        result = rpc::serve(cli.bind, rpc_state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    handle.shutdown();
    worker.join().await;
    Ok(())
}
