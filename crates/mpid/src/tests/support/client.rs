//! Minimal MPI client used by socket scenarios.

use std::io::{BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::Value;

use crate::protocol::{MAX_RESPONSE_BYTES, Response, parse_response};

/// Issues one request per connection, as real MPI clients do.
#[derive(Debug, Clone)]
pub struct MpiClient {
    socket: Utf8PathBuf,
}

impl MpiClient {
    #[must_use]
    pub const fn new(socket: Utf8PathBuf) -> Self {
        Self { socket }
    }

    /// Sends `body` to the operation named by `uri` and reads the reply.
    pub fn call(&self, uri: &str, body: &Value) -> Response {
        self.call_raw(uri, &body.to_string())
    }

    /// Sends an already-encoded body.
    pub fn call_raw(&self, uri: &str, body: &str) -> Response {
        let mut stream = UnixStream::connect(self.socket.as_std_path()).expect("connect to MPI socket");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        let request = format!(
            "POST /{uri} HTTP/1.1\r\nHost: osconfig\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).expect("write request");
        stream.flush().expect("flush request");
        parse_response(&mut BufReader::new(stream), MAX_RESPONSE_BYTES).expect("decode response")
    }
}
