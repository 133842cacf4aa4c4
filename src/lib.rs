//! Ethereum IPC provider
//!
//! An EIP-1193 style provider that talks JSON-RPC to a local node over its
//! IPC socket (Unix domain socket or Windows named pipe).

pub mod cli;
pub mod commands;
pub mod common;
pub mod ipc;
pub mod provider;
pub mod rpc;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use provider::{ClientRegistry, Eip1193Provider, IpcProvider};
pub use rpc::{BatchRequest, RequestArguments};
