//! Listener implementation for the MPI socket.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use osconfig_config::SocketEndpoint;
use tracing::{debug, error, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const SOCKET_MODE: u32 = 0o600;

/// Listener bound to the daemon socket.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: UnixListener,
    connection_timeout: Option<Duration>,
}

impl SocketListener {
    /// Binds `endpoint`, creating its directory and clearing a stale entry.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::UnixInUse`] when another process is serving
    /// the path, and other variants when the filesystem refuses the bind.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        endpoint.prepare_filesystem()?;
        let path = endpoint.path().as_std_path();
        remove_stale_entry(path)?;

        // The socket appears at its public path only once owner-only.
        let staging = staging_path(path);
        remove_stale_entry(&staging)?;
        let listener = UnixListener::bind(&staging).map_err(|source| ListenerError::BindUnix {
            path: staging.display().to_string(),
            source,
        })?;
        if let Err(source) = fs::set_permissions(&staging, fs::Permissions::from_mode(SOCKET_MODE)) {
            remove_socket_file(&staging);
            return Err(ListenerError::UnixPermissions {
                path: staging.display().to_string(),
                source,
            });
        }
        if let Err(source) = fs::rename(&staging, path) {
            remove_socket_file(&staging);
            return Err(ListenerError::UnixPublish {
                path: path.display().to_string(),
                source,
            });
        }

        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
            connection_timeout: None,
        })
    }

    /// Applies a read and write timeout to every accepted stream.
    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Endpoint the listener is bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Spawn`] when the thread cannot be created.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let path = self.endpoint.path().to_path_buf();
        let handle = thread::Builder::new()
            .name(String::from("mpi-server"))
            .spawn(move || run_accept_loop(&self, &shutdown_flag, handler.as_ref()))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            path,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    path: Utf8PathBuf,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop and wakes it.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        // A throwaway connection unblocks the pending accept.
        if let Err(error) = UnixStream::connect(self.path.as_std_path()) {
            debug!(
                target: LISTENER_TARGET,
                %error,
                "wake connection failed; listener may already be stopped"
            );
        }
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the listener thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &dyn ConnectionHandler,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match listener.listener.accept() {
            Ok((stream, _)) => {
                last_error = None;
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                serve(stream, listener.connection_timeout, handler);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    cleanup_unix_socket(&listener.endpoint);
    info!(target: LISTENER_TARGET, endpoint = %listener.endpoint, "socket listener stopped");
}

fn serve(stream: UnixStream, timeout: Option<Duration>, handler: &dyn ConnectionHandler) {
    let connection = ConnectionStream::new(stream);
    if let Err(error) = connection.set_timeout(timeout) {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            "failed to set connection timeout"
        );
    }
    if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(connection))).is_err() {
        error!(target: LISTENER_TARGET, "connection handler panicked");
    }
}

// Anything at the path that is not a live socket is removed.
fn remove_stale_entry(path: &Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: path.display().to_string(),
                source,
            });
        }
    };

    if metadata.file_type().is_socket() {
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ListenerError::UnixConnect {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
    }

    debug!(
        target: LISTENER_TARGET,
        path = %path.display(),
        "removing stale socket entry"
    );
    fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
        path: path.display().to_string(),
        source,
    })
}

fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    remove_socket_file(endpoint.path().as_std_path());
}

fn remove_socket_file(path: &Path) {
    if let Err(error) = fs::remove_file(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path.display(),
            "failed to remove unix socket file"
        );
    }
}

/// Private name next to `path` used while the socket is being restricted.
pub(super) fn staging_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}.bind", std::process::id()))
}
