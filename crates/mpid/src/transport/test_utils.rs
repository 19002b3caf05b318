//! Test helpers for the transport module.

use std::io::Write;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::{ConnectionHandler, ConnectionStream};

/// Counts connections and answers each with a single byte.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let _ = stream.write_all(b"k");
    }
}

/// Panics on every connection.
pub(crate) struct PanickingHandler;

impl ConnectionHandler for PanickingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        panic!("handler failure");
    }
}
