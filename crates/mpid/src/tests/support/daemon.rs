//! Runs the full daemon on a background thread for end-to-end scenarios.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::health::HealthReporter;
use crate::process::{LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, run_daemon_with};

use super::{HealthEvent, MpiClient, RecordingHealthReporter, TestConfigLoader};

const READY_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shutdown signal released explicitly by the test.
#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}

/// A daemon serving a temporary socket until [`RunningDaemon::stop`].
pub struct RunningDaemon {
    loader: TestConfigLoader,
    reporter: Arc<RecordingHealthReporter>,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
}

impl RunningDaemon {
    /// Launches the daemon and waits until its listener is ready.
    pub fn start() -> Self {
        let loader = TestConfigLoader::new();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let shutdown = TestShutdownSignal::new();
        let plan = LaunchPlan {
            loader: loader.clone(),
            reporter: Arc::clone(&reporter) as Arc<dyn HealthReporter>,
            shutdown: shutdown.clone(),
        };
        let handle = thread::spawn(move || run_daemon_with(plan));
        let daemon = Self {
            loader,
            reporter,
            shutdown,
            handle: Some(handle),
        };
        daemon.wait_until_ready();
        daemon
    }

    fn wait_until_ready(&self) {
        let deadline = Instant::now() + READY_TIMEOUT;
        while Instant::now() < deadline {
            let ready = self
                .reporter
                .events()
                .iter()
                .any(|event| matches!(event, HealthEvent::ListenerReady(_)));
            if ready {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
        panic!("daemon did not report a ready listener: {:?}", self.reporter.events());
    }

    #[must_use]
    pub fn client(&self) -> MpiClient {
        MpiClient::new(self.loader.socket_path())
    }

    #[must_use]
    pub fn loader(&self) -> &TestConfigLoader {
        &self.loader
    }

    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.reporter.events()
    }

    /// Releases the shutdown signal and waits for the run to finish.
    pub fn stop(&mut self) -> Result<(), LaunchError> {
        self.shutdown.trigger();
        match self.handle.take() {
            Some(handle) => handle.join().expect("daemon thread panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for RunningDaemon {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
