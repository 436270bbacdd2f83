//! Request and response payloads.
//!
//! Wire framing, headers, and encoding are owned by the
//! [`Connection`](crate::connection::Connection) implementation; the core
//! treats both directions as opaque bytes.

use bytes::Bytes;

/// An outbound request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    payload: Bytes,
}

impl Request {
    /// Wrap an already-encoded request payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The encoded payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// The single response a connection delivers for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
}

impl Response {
    /// Wrap a decoded response payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The response payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
