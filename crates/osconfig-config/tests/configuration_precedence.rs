use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use ortho_config::OrthoConfig;

use osconfig_config::{
    Config, LogFormat, SocketEndpoint, default_log_filter, default_log_format,
    default_socket_endpoint,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let previous = std::env::var_os(key);
        // Environment mutation is serialised by the harness lock.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

// Field order matters: overrides are restored before the lock is released.
struct Harness {
    temp_dir: TempDir,
    args: Vec<OsString>,
    overrides: Vec<EnvOverride>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn write_config(&mut self, contents: &str) {
        let path = self.temp_dir.path().join("osconfig.toml");
        fs::write(&path, contents).expect("write configuration file");
        self.args.push(OsString::from("--config-path"));
        self.args.push(path.into_os_string());
    }

    fn set_env(&mut self, key: &'static str, value: &str) {
        self.overrides
            .push(EnvOverride::set_var(key, OsStr::new(value)));
    }

    fn push_args(&mut self, args: &[&str]) {
        self.args.extend(args.iter().map(OsString::from));
    }

    fn load(&self) -> Config {
        match Config::load_from_iter(self.args.clone()) {
            Ok(config) => config,
            Err(error) => panic!("configuration failed to load: {error}"),
        }
    }
}

#[fixture]
fn harness() -> Harness {
    let guard = ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Harness {
        temp_dir: TempDir::new().expect("create temp dir"),
        args: vec![OsString::from("mpid")],
        overrides: Vec::new(),
        _guard: guard,
    }
}

#[rstest]
fn loading_without_overrides_applies_defaults(harness: Harness) {
    let config = harness.load();

    assert_eq!(config.daemon_socket(), &default_socket_endpoint());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
}

#[rstest]
fn configuration_file_sets_socket(mut harness: Harness) {
    harness.write_config("daemon_socket = \"/tmp/osconfig-file/mpid.sock\"\n");

    let config = harness.load();

    assert_eq!(
        config.daemon_socket(),
        &SocketEndpoint::unix("/tmp/osconfig-file/mpid.sock")
    );
}

#[rstest]
fn environment_overrides_file(mut harness: Harness) {
    harness.write_config("log_filter = \"warn\"\n");
    harness.set_env("OSCONFIG_LOG_FILTER", "debug");

    let config = harness.load();

    assert_eq!(config.log_filter(), "debug");
}

#[rstest]
fn cli_overrides_environment(mut harness: Harness) {
    harness.set_env("OSCONFIG_DAEMON_SOCKET", "/tmp/osconfig-env/mpid.sock");
    harness.push_args(&[
        "--daemon-socket",
        "unix:///tmp/osconfig-cli/mpid.sock",
        "--log-format",
        "compact",
    ]);

    let config = harness.load();

    assert_eq!(
        config.daemon_socket(),
        &SocketEndpoint::unix("/tmp/osconfig-cli/mpid.sock")
    );
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn invalid_socket_scheme_fails_to_load(mut harness: Harness) {
    harness.push_args(&["--daemon-socket", "tcp://127.0.0.1:9000"]);

    let result = Config::load_from_iter(harness.args.clone());

    assert!(result.is_err(), "tcp endpoints are not supported");
}
