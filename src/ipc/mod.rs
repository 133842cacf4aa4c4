//! JSON-RPC client for a local node's IPC endpoint
//!
//! Uses Unix domain sockets on Unix/macOS and named pipes on Windows
//! via the interprocess crate.

pub mod client;
pub mod codec;
pub mod transport;

pub use client::{ClientOptions, IpcClient};
