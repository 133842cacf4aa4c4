//! Ethereum IPC provider CLI
//!
//! Sends JSON-RPC calls to a local node over its IPC socket and prints
//! the results.

use clap::Parser;
use ipc_provider::common::logging;
use ipc_provider::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "ipc-provider", about = "JSON-RPC over a local node's IPC socket")]
#[command(version, long_about = None)]
struct Cli {
    /// IPC socket path (default: config file, then ~/.ethereum/geth.ipc)
    #[arg(long, short, global = true)]
    path: Option<String>,

    /// Response timeout in milliseconds (default: 20000)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();
    let connection = cli::Connection {
        path: cli.path,
        timeout_ms: cli.timeout_ms,
    };

    if let Err(e) = cli::dispatch(connection, cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
