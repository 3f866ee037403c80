// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service client (requester) handle.
//!
//! A [`Client`] sends one request at a time and later takes the matching
//! response. The transport assigns sequence numbers; the client checks they
//! arrive in order (1, 2, 3, ...) and remembers the one still awaiting an
//! answer.

use crate::context::Node;
use crate::error::{Error, Result, Stage};
use crate::middleware::{ClientId, Middleware, Resource};
use crate::types::{ClientOptions, Guid, Message, RequestId, ServiceType};
use std::marker::PhantomData;

/// Response paired with the identifier of the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope<R> {
    pub header: RequestId,
    pub response: R,
}

impl<R> ResponseEnvelope<R> {
    /// Unwrap the response if it answers `expected`.
    pub fn correlate(self, expected: RequestId) -> Result<R> {
        if self.header == expected {
            Ok(self.response)
        } else {
            Err(Error::CorrelationMismatch {
                expected,
                actual: self.header,
            })
        }
    }
}

/// Client bound to one node and one service.
pub struct Client<'n, M: Middleware, S: ServiceType> {
    node: &'n Node<'n, M>,
    id: ClientId,
    guid: Guid,
    service_name: String,
    last_sequence: i64,
    pending: Option<i64>,
    active: bool,
    _service: PhantomData<fn() -> S>,
}

impl<'n, M: Middleware, S: ServiceType> Client<'n, M, S> {
    /// Create a client of `service_name` on `node`.
    pub fn init(node: &'n Node<'n, M>, service_name: &str, options: &ClientOptions) -> Result<Self> {
        let middleware = node.middleware();
        let id = middleware
            .client_init(node.id(), &S::type_info(), service_name, options)
            .map_err(Error::at(Stage::ClientInit))?;

        let mut client = Self {
            node,
            id,
            guid: Guid::zero(),
            service_name: service_name.to_string(),
            last_sequence: 0,
            pending: None,
            active: true,
            _service: PhantomData,
        };
        // Dropping `client` on this error path releases the handle.
        client.guid = middleware
            .client_guid(id)
            .map_err(Error::at(Stage::ClientInit))?;

        log::debug!(
            "[rcl-client] {} for '{}' ({}) on {}",
            id,
            service_name,
            S::TYPE_NAME,
            node.id()
        );
        Ok(client)
    }

    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn node(&self) -> &'n Node<'n, M> {
        self.node
    }

    /// Sequence number of the request still awaiting its response.
    #[must_use]
    pub fn pending(&self) -> Option<i64> {
        self.pending
    }

    /// Send `request` and return the sequence number assigned to it.
    ///
    /// The number is one greater than the previous one (1 for a fresh
    /// client). Nothing is recorded when the send fails. Any other number is
    /// reported as [`Error::InvalidSequence`] and becomes the baseline for the
    /// next send.
    pub fn send_request(&mut self, request: &S::Request) -> Result<i64> {
        let payload = request.encode();
        let sequence = self
            .node
            .middleware()
            .send_request(self.id, &payload)
            .map_err(Error::at(Stage::Send))?;

        let expected = self.last_sequence + 1;
        // Track what the transport issued, even out of order.
        self.last_sequence = sequence;
        if sequence != expected {
            self.pending = None;
            log::error!(
                "[rcl-client] {} got sequence #{} (expected #{})",
                self.id,
                sequence,
                expected
            );
            return Err(Error::InvalidSequence {
                expected,
                got: sequence,
            });
        }

        self.pending = Some(sequence);
        log::debug!(
            "[rcl-client] {} sent request #{} ({} bytes)",
            self.id,
            sequence,
            payload.len()
        );
        Ok(sequence)
    }

    /// Take the oldest queued response without checking correlation.
    ///
    /// Clears [`Client::pending`] when the response answers the pending
    /// request.
    pub fn take_response(&mut self) -> Result<ResponseEnvelope<S::Response>> {
        let (header, payload) = self.take_raw()?;
        let response = S::Response::decode(&payload)?;
        self.settle(header);
        Ok(ResponseEnvelope { header, response })
    }

    /// Take a response and require that it answers request `sequence`.
    ///
    /// The header is checked before the payload is decoded, so a misrouted
    /// reply is a [`Error::CorrelationMismatch`] whatever its payload.
    pub fn take_validated(&mut self, sequence: i64) -> Result<S::Response> {
        let expected = RequestId::new(self.guid, sequence);
        let (header, payload) = self.take_raw()?;
        if header != expected {
            return Err(Error::CorrelationMismatch {
                expected,
                actual: header,
            });
        }
        let response = S::Response::decode(&payload)?;
        self.settle(header);
        Ok(response)
    }

    fn take_raw(&self) -> Result<(RequestId, Vec<u8>)> {
        let (header, payload) = self
            .node
            .middleware()
            .take_response(self.id)
            .map_err(Error::at(Stage::Take))?
            .ok_or(Error::NoResponseAvailable)?;
        log::debug!("[rcl-client] {} took response for {}", self.id, header);
        Ok((header, payload))
    }

    fn settle(&mut self, header: RequestId) {
        if let Some(sequence) = self.pending {
            if header == RequestId::new(self.guid, sequence) {
                self.pending = None;
            }
        }
    }

    /// Release the client. Must happen before its node is released.
    pub fn fini(mut self) -> Result<()> {
        self.active = false;
        self.release()
    }

    fn release(&self) -> Result<()> {
        if let Some(sequence) = self.pending {
            log::debug!(
                "[rcl-client] releasing {} with request #{} unanswered",
                self.id,
                sequence
            );
        }
        self.node
            .middleware()
            .client_fini(self.id, self.node.id())
            .map_err(Error::released(Resource::Client))
    }
}

impl<M: Middleware, S: ServiceType> Drop for Client<'_, M, S> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(err) = self.release() {
                log::error!("[rcl-client] {} dropped without fini: {}", self.id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::loopback::Loopback;
    use crate::middleware::Op;
    use crate::srv::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
    use std::sync::Arc;

    fn adder() -> Arc<Loopback> {
        let loopback = Arc::new(Loopback::new());
        loopback.respond_with::<AddTwoInts, _>("add_two_ints", |req| AddTwoIntsResponse {
            sum: req.a + req.b,
        });
        loopback
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let loopback = adder();
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "seq_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let count = fastrand::i64(1..40);
        for n in 1..=count {
            let seq = client
                .send_request(&AddTwoIntsRequest { a: n, b: n })
                .expect("send");
            assert_eq!(seq, n);
            assert_eq!(client.pending(), Some(n));
        }
    }

    #[test]
    fn failed_send_consumes_no_sequence_number() {
        let loopback = adder();
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "send_fail_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        loopback.fail_on(Op::SendRequest);
        let err = client
            .send_request(&AddTwoIntsRequest::default())
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Send);
        assert_eq!(client.pending(), None);

        let seq = client
            .send_request(&AddTwoIntsRequest::default())
            .expect("send");
        assert_eq!(seq, 1);
    }

    #[test]
    fn take_without_queued_response_is_an_error() {
        let loopback = Arc::new(Loopback::new());
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "empty_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let err = client.take_response().unwrap_err();
        assert!(matches!(err, Error::NoResponseAvailable));
    }

    #[test]
    fn take_validated_clears_pending_request() {
        let loopback = adder();
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "validate_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let seq = client
            .send_request(&AddTwoIntsRequest { a: 20, b: 22 })
            .expect("send");
        let response = client.take_validated(seq).expect("take");
        assert_eq!(response.sum, 42);
        assert_eq!(client.pending(), None);
    }

    #[test]
    fn response_from_another_writer_is_a_mismatch() {
        let loopback = Arc::new(Loopback::new());
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "guid_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let stranger = RequestId::new(Guid::new([9; 12], [0, 0, 9, 0xC3]), 1);
        loopback
            .inject_response(client.id(), stranger, AddTwoIntsResponse { sum: 1 }.encode())
            .expect("inject");

        let err = client.take_validated(1).unwrap_err();
        match err {
            Error::CorrelationMismatch { expected, actual } => {
                assert_eq!(expected, RequestId::new(client.guid(), 1));
                assert_eq!(actual, stranger);
            }
            other => panic!("expected correlation mismatch, got {other}"),
        }
    }

    #[test]
    fn misrouted_reply_is_a_mismatch_even_when_undecodable() {
        let loopback = Arc::new(Loopback::new());
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "misrouted_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let other_request = RequestId::new(client.guid(), 2);
        loopback
            .inject_response(client.id(), other_request, vec![1, 2, 3])
            .expect("inject");

        match client.take_validated(1).unwrap_err() {
            Error::CorrelationMismatch { expected, actual } => {
                assert_eq!(expected, RequestId::new(client.guid(), 1));
                assert_eq!(actual, other_request);
            }
            other => panic!("expected correlation mismatch, got {other}"),
        }
    }

    #[test]
    fn matching_reply_with_bad_payload_is_a_decode_error() {
        let loopback = Arc::new(Loopback::new());
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "short_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        loopback
            .inject_response(client.id(), RequestId::new(client.guid(), 1), vec![1, 2, 3])
            .expect("inject");

        let err = client.take_validated(1).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(err.stage(), Stage::Take);
    }

    #[test]
    fn client_follows_the_transport_after_a_sequence_gap() {
        let loopback = adder();
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "gap_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        assert_eq!(
            client
                .send_request(&AddTwoIntsRequest::default())
                .expect("first send"),
            1
        );
        loopback.skip_sequences(client.id(), 2).expect("skip");

        let err = client
            .send_request(&AddTwoIntsRequest::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSequence {
                expected: 2,
                got: 4
            }
        ));
        assert_eq!(client.pending(), None);

        let seq = client
            .send_request(&AddTwoIntsRequest::default())
            .expect("send after gap");
        assert_eq!(seq, 5);
        assert_eq!(client.pending(), Some(5));
    }

    #[test]
    fn take_response_clears_pending_only_for_the_pending_request() {
        let loopback = adder();
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "pending_node", "").expect("node");
        let mut client =
            Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                .expect("client");

        let seq = client
            .send_request(&AddTwoIntsRequest { a: 2, b: 3 })
            .expect("send");
        loopback
            .inject_response(
                client.id(),
                RequestId::new(client.guid(), 7),
                AddTwoIntsResponse { sum: 0 }.encode(),
            )
            .expect("inject");

        let envelope = client.take_response().expect("take");
        assert_eq!(envelope.header.sequence_number, seq);
        assert_eq!(envelope.response.sum, 5);
        assert_eq!(client.pending(), None);

        client.send_request(&AddTwoIntsRequest::default()).expect("send");
        let stray = client.take_response().expect("take stray");
        assert_eq!(stray.header.sequence_number, 7);
        assert_eq!(client.pending(), Some(2));
    }

    #[test]
    fn envelope_correlates_on_guid_and_sequence() {
        let guid = Guid::new([3; 12], [0, 0, 1, 0xC3]);
        let envelope = ResponseEnvelope {
            header: RequestId::new(guid, 4),
            response: AddTwoIntsResponse { sum: 9 },
        };

        assert!(matches!(
            envelope.clone().correlate(RequestId::new(Guid::zero(), 4)),
            Err(Error::CorrelationMismatch { .. })
        ));
        assert_eq!(
            envelope.correlate(RequestId::new(guid, 4)).expect("match").sum,
            9
        );
    }

    #[test]
    fn dropped_client_is_released() {
        let loopback = Arc::new(Loopback::new());
        let context = Context::init(Arc::clone(&loopback)).expect("context");
        let node = Node::init(&context, "drop_node", "").expect("node");
        {
            let _client =
                Client::<_, AddTwoInts>::init(&node, "add_two_ints", &ClientOptions::default())
                    .expect("client");
            assert_eq!(loopback.live_handles(), 3);
        }
        assert_eq!(loopback.live_handles(), 2);
    }
}
