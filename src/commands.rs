//! CLI command definitions
//!
//! Defines the clap commands for the provider CLI.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Call a single JSON-RPC method and print its result
    #[command(alias = "r")]
    Request {
        /// Method name, e.g. eth_chainId
        method: String,

        /// Parameters as a JSON array, e.g. '["latest", false]'
        params: Option<String>,
    },

    /// Send several calls as one batch and print the results in order
    Batch {
        /// JSON array of {"method", "params"} objects, or '-' to read stdin
        calls: String,
    },

    /// Print the resolved socket path
    Url,
}
