// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boundary between the blocking client core and the transport layer.
//!
//! Everything below this trait (message delivery, discovery, graph
//! bookkeeping) belongs to the middleware. The core only ever sees opaque
//! handle identifiers and the status codes returned here.

use crate::error::TransportError;
use crate::types::{ClientOptions, Guid, RequestId, ServiceTypeInfo};
use std::fmt;
use std::time::Duration;

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_id!(
    /// Opaque identifier of an initialized communication context.
    ContextId,
    "context"
);
handle_id!(
    /// Opaque identifier of a node.
    NodeId,
    "node"
);
handle_id!(
    /// Opaque identifier of a service client.
    ClientId,
    "client"
);
handle_id!(
    /// Opaque identifier of a wait set.
    WaitSetId,
    "wait_set"
);

/// Handle classes that own a transport resource and must be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Context,
    Node,
    Client,
    WaitSet,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Context => "context",
            Self::Node => "node",
            Self::Client => "client",
            Self::WaitSet => "wait set",
        })
    }
}

/// Kinds of entities a wait set can hold slots for.
///
/// Only [`WaitableKind::Client`] is registered by this crate; the other
/// classes exist so capacities can be expressed the way the middleware
/// sizes its wait sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitableKind {
    Subscription,
    GuardCondition,
    Timer,
    Client,
    Service,
}

/// Number of slots reserved per waitable class when a wait set is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitSetCapacity {
    pub subscriptions: usize,
    pub guard_conditions: usize,
    pub timers: usize,
    pub clients: usize,
    pub services: usize,
}

impl WaitSetCapacity {
    /// Capacity holding only `count` client slots.
    #[must_use]
    pub const fn clients(count: usize) -> Self {
        Self {
            subscriptions: 0,
            guard_conditions: 0,
            timers: 0,
            clients: count,
            services: 0,
        }
    }

    /// Slots reserved for `kind`.
    #[must_use]
    pub const fn slots(&self, kind: WaitableKind) -> usize {
        match kind {
            WaitableKind::Subscription => self.subscriptions,
            WaitableKind::GuardCondition => self.guard_conditions,
            WaitableKind::Timer => self.timers,
            WaitableKind::Client => self.clients,
            WaitableKind::Service => self.services,
        }
    }
}

/// Result of a successful blocking wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one registered entity is ready. Client slots keep their
    /// registration order; slots whose client is not ready are `None`.
    Ready { clients: Vec<Option<ClientId>> },
    /// The timeout elapsed with nothing ready.
    Timeout,
}

/// Boundary operations, used to name failures and inject faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ContextInit,
    ContextFini,
    NodeInit,
    NodeFini,
    ClientInit,
    ClientFini,
    ServiceReachable,
    WaitSetInit,
    WaitSetFini,
    WaitSetClearClients,
    WaitSetRegisterClient,
    WaitSetBlock,
    SendRequest,
    TakeResponse,
}

impl Op {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContextInit => "context_init",
            Self::ContextFini => "context_fini",
            Self::NodeInit => "node_init",
            Self::NodeFini => "node_fini",
            Self::ClientInit => "client_init",
            Self::ClientFini => "client_fini",
            Self::ServiceReachable => "service_reachable",
            Self::WaitSetInit => "waitset_init",
            Self::WaitSetFini => "waitset_fini",
            Self::WaitSetClearClients => "waitset_clear_clients",
            Self::WaitSetRegisterClient => "waitset_register_client",
            Self::WaitSetBlock => "waitset_block",
            Self::SendRequest => "send_request",
            Self::TakeResponse => "take_response",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport/middleware operations consumed by the client core.
///
/// Every `*_init` must be paired with exactly one matching `*_fini`. The core
/// guarantees the pairing and the reverse ordering; implementations only
/// report what happened.
pub trait Middleware {
    fn context_init(&self) -> Result<ContextId, TransportError>;
    fn context_fini(&self, context: ContextId) -> Result<(), TransportError>;

    fn node_init(
        &self,
        context: ContextId,
        name: &str,
        namespace: &str,
    ) -> Result<NodeId, TransportError>;
    fn node_fini(&self, node: NodeId) -> Result<(), TransportError>;

    fn client_init(
        &self,
        node: NodeId,
        service_type: &ServiceTypeInfo,
        service_name: &str,
        options: &ClientOptions,
    ) -> Result<ClientId, TransportError>;
    fn client_fini(&self, client: ClientId, node: NodeId) -> Result<(), TransportError>;

    /// GUID the transport stamps on requests sent by `client`.
    fn client_guid(&self, client: ClientId) -> Result<Guid, TransportError>;

    /// Whether a server for the client's service is currently matched.
    fn service_reachable(&self, node: NodeId, client: ClientId) -> Result<bool, TransportError>;

    fn waitset_init(
        &self,
        context: ContextId,
        capacity: WaitSetCapacity,
    ) -> Result<WaitSetId, TransportError>;
    fn waitset_fini(&self, wait_set: WaitSetId) -> Result<(), TransportError>;
    fn waitset_clear_clients(&self, wait_set: WaitSetId) -> Result<(), TransportError>;
    fn waitset_register_client(
        &self,
        wait_set: WaitSetId,
        client: ClientId,
    ) -> Result<(), TransportError>;

    /// Block until a registered entity is ready. `timeout_ns < 0` blocks
    /// without a deadline.
    fn waitset_block(
        &self,
        wait_set: WaitSetId,
        timeout_ns: i64,
    ) -> Result<WaitOutcome, TransportError>;

    /// Publish a request and return the sequence number assigned to it.
    fn send_request(&self, client: ClientId, payload: &[u8]) -> Result<i64, TransportError>;

    /// Pop the oldest queued response, `None` when nothing is queued.
    fn take_response(
        &self,
        client: ClientId,
    ) -> Result<Option<(RequestId, Vec<u8>)>, TransportError>;
}

/// Convert an optional timeout to the middleware's nanosecond unit
/// (`-1` = no deadline).
pub(crate) fn duration_to_ns(timeout: Option<Duration>) -> i64 {
    match timeout {
        None => -1,
        Some(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ns_converts_and_saturates() {
        assert_eq!(duration_to_ns(None), -1);
        assert_eq!(duration_to_ns(Some(Duration::from_millis(100))), 100_000_000);
        assert_eq!(duration_to_ns(Some(Duration::MAX)), i64::MAX);
    }

    #[test]
    fn client_capacity_reserves_only_client_slots() {
        let capacity = WaitSetCapacity::clients(1);
        assert_eq!(capacity.slots(WaitableKind::Client), 1);
        for kind in [
            WaitableKind::Subscription,
            WaitableKind::GuardCondition,
            WaitableKind::Timer,
            WaitableKind::Service,
        ] {
            assert_eq!(capacity.slots(kind), 0, "{:?}", kind);
        }
    }

    #[test]
    fn handle_ids_display_with_class_prefix() {
        assert_eq!(ClientId(7).to_string(), "client#7");
        assert_eq!(WaitSetId(2).to_string(), "wait_set#2");
        assert_eq!(Op::WaitSetFini.to_string(), "waitset_fini");
    }
}
