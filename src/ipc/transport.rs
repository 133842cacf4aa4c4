//! Cross-platform IPC transport layer
//!
//! Abstracts Unix domain sockets (Unix/macOS) and named pipes (Windows)
//! using the interprocess crate.

use std::io;

// Platform-specific imports and type aliases
#[cfg(unix)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericFilePath, ListenerOptions};
}

#[cfg(windows)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
}

use platform::*;

/// Re-export Stream for use in other modules
pub use platform::Stream;

/// Strip the `\\.\pipe\` prefix; interprocess adds it back
#[cfg(windows)]
fn pipe_name(path: &str) -> &str {
    path.strip_prefix(r"\\.\pipe\").unwrap_or(path)
}

/// Connect to the IPC socket at `path`
pub async fn connect(path: &str) -> io::Result<Stream> {
    #[cfg(unix)]
    let stream = {
        let name = path.to_fs_name::<GenericFilePath>()?;
        Stream::connect(name).await?
    };

    #[cfg(windows)]
    let stream = {
        let name = pipe_name(path).to_ns_name::<GenericNamespaced>()?;
        Stream::connect(name).await?
    };

    Ok(stream)
}

/// Create a listener on `path`, replacing a stale socket file
///
/// Used by local test nodes; the provider itself only connects.
pub fn bind(path: &str) -> io::Result<Listener> {
    #[cfg(unix)]
    let listener = {
        let socket = std::path::Path::new(path);
        if socket.exists() {
            std::fs::remove_file(socket)?;
        }

        let name = path.to_fs_name::<GenericFilePath>()?;
        ListenerOptions::new().name(name).create_tokio()?
    };

    #[cfg(windows)]
    let listener = {
        let name = pipe_name(path).to_ns_name::<GenericNamespaced>()?;
        ListenerOptions::new().name(name).create_tokio()?
    };

    // Owner-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(listener)
}
