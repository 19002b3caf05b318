//! Configuration loaders for bootstrap and daemon scenarios.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use osconfig_config::{Config, LogFormat, SocketEndpoint};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

/// Loader that places the socket under a private temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    socket_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self {
            socket_dir: Arc::new(dir),
        }
    }

    /// Socket path the loaded configuration points at.
    #[must_use]
    pub fn socket_path(&self) -> Utf8PathBuf {
        let path = self.socket_dir.path().join("run").join("mpid.sock");
        Utf8PathBuf::from_path_buf(path).expect("temporary socket path was not valid UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_path()),
            log_format: LogFormat::Compact,
            connection_timeout_secs: 2,
            max_request_bytes: 64 * 1024,
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unsupported socket scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("mpid"),
            OsString::from("--daemon-socket"),
            OsString::from("tcp://127.0.0.1:9000"),
        ];
        Config::load_from_iter(args)
    }
}
