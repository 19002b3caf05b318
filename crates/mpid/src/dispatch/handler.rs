//! Connection handler that serves one MPI request per connection.
//!
//! `DispatchConnectionHandler` implements the transport's
//! `ConnectionHandler`: it decodes a request, routes it, writes exactly one
//! response and lets the connection close. Failures become a bodiless error
//! response where the stream still allows one.

use std::io::{BufReader, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::{Response, StatusCode, parse_request};
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::errors::DispatchError;
use super::router::{DISPATCH_TARGET, MpiHandler, MpiRouter};

/// Serves MPI requests over accepted connections.
#[derive(Debug, Clone)]
pub struct DispatchConnectionHandler {
    router: MpiRouter,
    max_request_bytes: usize,
    full_logging: bool,
}

impl DispatchConnectionHandler {
    /// Creates a handler routing to `handler`.
    pub fn new(handler: Arc<dyn MpiHandler>, max_request_bytes: usize) -> Self {
        Self {
            router: MpiRouter::new(handler),
            max_request_bytes,
            full_logging: false,
        }
    }

    /// Logs every request and response at info level.
    #[must_use]
    pub const fn with_full_logging(mut self, full_logging: bool) -> Self {
        self.full_logging = full_logging;
        self
    }

    fn respond(&self, stream: &mut ConnectionStream) -> Response {
        let mut reader = BufReader::new(stream);
        let request = match parse_request(&mut reader, self.max_request_bytes) {
            Ok(request) => request,
            Err(error) => return reject(&DispatchError::from(error)),
        };

        if self.full_logging {
            info!(
                target: DISPATCH_TARGET,
                method = request.method(),
                uri = request.uri(),
                body = %String::from_utf8_lossy(request.body()),
                "received request"
            );
        } else {
            debug!(
                target: DISPATCH_TARGET,
                uri = request.uri(),
                length = request.body().len(),
                "received request"
            );
        }

        match self.router.route(&request) {
            Ok(body) => Response::new(StatusCode::OK, body),
            Err(error) => reject(&error),
        }
    }
}

fn reject(error: &DispatchError) -> Response {
    let status = error.status();
    warn!(
        target: DISPATCH_TARGET,
        status = status.as_u16(),
        %error,
        "request failed"
    );
    Response::empty(status)
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let response = self.respond(&mut stream);
        if self.full_logging {
            info!(
                target: DISPATCH_TARGET,
                status = response.status().as_u16(),
                body = response.body(),
                "sending response"
            );
        }

        let framed = response.serialize();
        if let Err(error) = stream.write_all(&framed).and_then(|()| stream.flush()) {
            warn!(target: DISPATCH_TARGET, %error, "failed to write response");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread::{self, JoinHandle};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::modules::ModulesManager;
    use crate::protocol::{MAX_RESPONSE_BYTES, parse_response};

    /// Connected socket pair with the handler serving the far end.
    struct HandlerTestHarness {
        client: UnixStream,
        server_handle: JoinHandle<()>,
    }

    impl HandlerTestHarness {
        fn send(mut self, request: &[u8]) -> Response {
            self.client.write_all(request).expect("write request");
            self.client.flush().expect("flush");
            let response =
                parse_response(&mut BufReader::new(&mut self.client), MAX_RESPONSE_BYTES)
                    .expect("read response");
            self.server_handle.join().expect("server join");
            response
        }

        fn send_and_hang_up(mut self, request: &[u8]) -> Vec<u8> {
            self.client.write_all(request).expect("write request");
            self.client
                .shutdown(std::net::Shutdown::Write)
                .expect("half close");
            let mut raw = Vec::new();
            self.client.read_to_end(&mut raw).expect("read response");
            self.server_handle.join().expect("server join");
            raw
        }
    }

    #[fixture]
    fn harness() -> HandlerTestHarness {
        let (client, server) = UnixStream::pair().expect("socket pair");
        let manager: Arc<dyn MpiHandler> = Arc::new(ModulesManager::with_default_modules());
        let handler = DispatchConnectionHandler::new(manager, 1024).with_full_logging(true);
        let server_handle = thread::spawn(move || {
            handler.handle(ConnectionStream::new(server));
        });
        HandlerTestHarness {
            client,
            server_handle,
        }
    }

    fn framed(uri: &str, body: &str) -> Vec<u8> {
        format!(
            "POST /{uri} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[rstest]
    fn open_answers_with_session_id(harness: HandlerTestHarness) {
        let response = harness.send(&framed(
            "MpiOpen",
            r#"{"ClientName":"handler","MaxPayloadSizeBytes":0}"#,
        ));

        assert_eq!(response.status(), StatusCode::OK);
        let id: String = serde_json::from_str(response.body()).expect("session id string");
        assert!(!id.is_empty());
    }

    #[rstest]
    fn unknown_operation_is_not_found(harness: HandlerTestHarness) {
        let response = harness.send(&framed("MpiFoo", "{}"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());
    }

    #[rstest]
    fn incomplete_fields_are_bad_requests(harness: HandlerTestHarness) {
        let response = harness.send(&framed("MpiOpen", r#"{"ClientName":"handler"}"#));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.body().is_empty());
    }

    #[rstest]
    fn short_body_is_a_bad_request(harness: HandlerTestHarness) {
        let raw = harness.send_and_hang_up(b"POST /MpiOpen HTTP/1.1\r\nContent-Length: 50\r\n\r\n{}");
        let text = String::from_utf8(raw).expect("utf8 response");
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got {text}");
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[rstest]
    fn oversized_body_is_a_bad_request(harness: HandlerTestHarness) {
        let response = harness.send(b"POST /MpiSet HTTP/1.1\r\nContent-Length: 4096\r\n\r\n");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
