// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation identifiers, typed service contracts and client options.

use crate::error::{Error, Result};
use std::fmt;

/// Globally unique identifier of the endpoint that wrote a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

impl Guid {
    #[must_use]
    pub const fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self {
            prefix: [0; 12],
            entity_id: [0; 4],
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.prefix {
            write!(f, "{:02x}", byte)?;
        }
        f.write_str(".")?;
        for byte in self.entity_id {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Request identifier carried by a response header.
///
/// Combines the writer's GUID with the sequence number the transport
/// assigned when the request was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestId {
    pub writer_guid: Guid,
    pub sequence_number: i64,
}

impl RequestId {
    #[must_use]
    pub const fn new(writer_guid: Guid, sequence_number: i64) -> Self {
        Self {
            writer_guid,
            sequence_number,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.writer_guid, self.sequence_number)
    }
}

/// Payload that crosses the middleware boundary as little-endian bytes.
pub trait Message: Sized {
    /// Encode into a freshly allocated buffer.
    fn encode(&self) -> Vec<u8>;

    /// Decode from a buffer produced by [`Message::encode`].
    fn decode(buf: &[u8]) -> Result<Self>;
}

/// Typed request/response contract of a service.
pub trait ServiceType {
    /// Fully qualified type name, matched against the server's type.
    const TYPE_NAME: &'static str;

    type Request: Message;
    type Response: Message;

    #[must_use]
    fn type_info() -> ServiceTypeInfo {
        ServiceTypeInfo {
            type_name: Self::TYPE_NAME,
        }
    }
}

/// Type-erased description of a service type handed to `client_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTypeInfo {
    pub type_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    #[default]
    Reliable,
    BestEffort,
}

/// Options of a client; interpreted by the middleware only.
///
/// Defaults follow the services profile: reliable, keep the last 10
/// responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub reliability: Reliability,
    pub history_depth: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history_depth: 10,
        }
    }
}

/// Read a little-endian `i64` at `offset`.
pub(crate) fn read_i64(buf: &[u8], offset: usize, what: &'static str) -> Result<i64> {
    buf.get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i64::from_le_bytes)
        .ok_or_else(|| Error::Decode {
            what,
            reason: format!("need {} bytes, got {}", offset + 8, buf.len()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn request_ids_hash_by_guid_and_sequence() {
        let guid = Guid::new([1; 12], [0, 0, 1, 0xC3]);
        let mut set = HashSet::new();
        set.insert(RequestId::new(guid, 1));
        set.insert(RequestId::new(guid, 2));
        set.insert(RequestId::new(Guid::zero(), 1));

        assert_eq!(set.len(), 3);
        assert!(set.contains(&RequestId::new(guid, 1)));
    }

    #[test]
    fn request_id_display_is_guid_slash_sequence() {
        let id = RequestId::new(Guid::new([0xab; 12], [0, 0, 0, 0xC3]), 42);
        assert_eq!(
            id.to_string(),
            "abababababababababababab.000000c3/42"
        );
    }

    #[test]
    fn read_i64_reports_short_buffers() {
        let buf = 7i64.to_le_bytes();
        assert_eq!(read_i64(&buf, 0, "value").expect("decode"), 7);

        let err = read_i64(&buf, 4, "value").unwrap_err();
        assert!(matches!(err, Error::Decode { what: "value", .. }));
    }

    #[test]
    fn default_options_are_reliable_depth_ten() {
        let options = ClientOptions::default();
        assert_eq!(options.reliability, Reliability::Reliable);
        assert_eq!(options.history_depth, 10);
    }
}
