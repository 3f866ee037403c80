// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service definitions used by the client fixture.

use crate::error::Result;
use crate::types::{read_i64, Message, ServiceType};

/// `example_interfaces/srv/AddTwoInts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddTwoInts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddTwoIntsRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddTwoIntsResponse {
    pub sum: i64,
}

impl ServiceType for AddTwoInts {
    const TYPE_NAME: &'static str = "example_interfaces/srv/AddTwoInts";

    type Request = AddTwoIntsRequest;
    type Response = AddTwoIntsResponse;
}

impl Message for AddTwoIntsRequest {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.a.to_le_bytes());
        buf.extend_from_slice(&self.b.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            a: read_i64(buf, 0, "AddTwoInts request")?,
            b: read_i64(buf, 8, "AddTwoInts request")?,
        })
    }
}

impl Message for AddTwoIntsResponse {
    fn encode(&self) -> Vec<u8> {
        self.sum.to_le_bytes().to_vec()
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            sum: read_i64(buf, 0, "AddTwoInts response")?,
        })
    }
}
