//! Test Utilities
//!
//! Helpers shared by the server tests of every crate: unique port allocation
//! and hand-built `multipart/form-data` bodies.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};

const FIRST_TEST_PORT: u16 = 52000;
const LAST_TEST_PORT: u16 = 64000;

/// Boundary used by [`multipart_body`]
pub const TEST_BOUNDARY: &str = "dermalens-test-boundary";

/// Global port counter to ensure unique ports across all tests
static GLOBAL_TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(FIRST_TEST_PORT);

/// Returns a loopback address with a port no other test in this process holds
///
/// Wraps back to the first port once the range is exhausted.
pub fn get_random_port_addr() -> SocketAddr {
    let port = GLOBAL_TEST_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    let port = if port > LAST_TEST_PORT {
        GLOBAL_TEST_PORT_COUNTER.store(FIRST_TEST_PORT + 1, Ordering::SeqCst);
        FIRST_TEST_PORT
    } else {
        port
    };

    SocketAddr::from(([127, 0, 0, 1], port))
}

/// One part of a hand-built multipart body
#[derive(Debug, Clone)]
pub struct TestPart<'a> {
    /// Form field name
    pub name: &'a str,
    /// Filename attribute; `None` makes the part a plain text field
    pub filename: Option<&'a str>,
    /// Part payload
    pub data: &'a [u8],
}

impl<'a> TestPart<'a> {
    /// A file part with the given filename
    pub fn file(name: &'a str, filename: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            data,
        }
    }

    /// A plain form field without a filename
    pub fn text(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: None,
            data,
        }
    }
}

/// Builds a `multipart/form-data` body from the given parts
///
/// Returns the `content-type` header value and the encoded body.
pub fn multipart_body(parts: &[TestPart<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", TEST_BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", TEST_BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", TEST_BOUNDARY),
        body,
    )
}
