//! Entry point for the OSConfig management platform daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match mpid::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet, so stderr is the only sink.
            let _ = writeln!(io::stderr().lock(), "mpid: {error}");
            ExitCode::FAILURE
        }
    }
}
