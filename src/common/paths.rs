//! Cross-platform socket and configuration paths
//!
//! Unix/macOS: the node socket defaults to `~/.ethereum/geth.ipc`
//! Windows: the node pipe defaults to `\\.\pipe\geth.ipc`

use std::path::PathBuf;

/// Name used for the configuration directory
const APP_NAME: &str = "eth-ipc-provider";

/// File name of the node's IPC endpoint
const NODE_SOCKET_NAME: &str = "geth.ipc";

/// Get the default IPC path of a local node
#[cfg(unix)]
pub fn default_socket_path() -> String {
    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    home.join(".ethereum")
        .join(NODE_SOCKET_NAME)
        .to_string_lossy()
        .into_owned()
}

#[cfg(windows)]
pub fn default_socket_path() -> String {
    format!(r"\\.\pipe\{}", NODE_SOCKET_NAME)
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/eth-ipc-provider/`
/// - macOS: `~/Library/Application Support/eth-ipc-provider/`
/// - Windows: `%APPDATA%\eth-ipc-provider\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
