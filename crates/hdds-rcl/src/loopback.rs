// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory [`Middleware`] with a scripted remote peer.
//!
//! `Loopback` stands in for the real transport in tests and in the client
//! fixture. Remote servers are modelled as reply functions keyed by service
//! name: a reply is queued on the client as soon as a request is sent,
//! tagged with the client's GUID and the request's sequence number.
//!
//! Besides message flow it keeps the bookkeeping tests need to check the
//! resource discipline: an ordered acquire/release journal, live handle
//! counts, per-operation call counters and one-shot fault injection.
//! Releasing a context that still has nodes or wait sets, or a node that
//! still has clients, is refused the way a strict middleware would.

use crate::error::TransportError;
use crate::middleware::{
    ClientId, ContextId, Middleware, NodeId, Op, Resource, WaitOutcome, WaitSetCapacity,
    WaitSetId, WaitableKind,
};
use crate::types::{ClientOptions, Guid, Message, RequestId, ServiceType, ServiceTypeInfo};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send>;

/// Entry of the acquire/release journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    Acquired(Resource, u64),
    Released(Resource, u64),
}

struct Peer {
    type_name: Option<&'static str>,
    available_after: usize,
    queries: usize,
    responder: Option<Responder>,
    forced_tag: Option<i64>,
}

impl Default for Peer {
    fn default() -> Self {
        Self {
            type_name: None,
            available_after: 1,
            queries: 0,
            responder: None,
            forced_tag: None,
        }
    }
}

struct NodeEntry {
    context: ContextId,
}

struct ClientEntry {
    node: NodeId,
    service: String,
    type_name: &'static str,
    guid: Guid,
    next_sequence: i64,
    depth: usize,
    replies: VecDeque<(RequestId, Vec<u8>)>,
}

struct WaitSetEntry {
    context: ContextId,
    capacity: WaitSetCapacity,
    clients: Vec<ClientId>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    contexts: HashSet<ContextId>,
    nodes: HashMap<NodeId, NodeEntry>,
    clients: HashMap<ClientId, ClientEntry>,
    wait_sets: HashMap<WaitSetId, WaitSetEntry>,
    peers: HashMap<String, Peer>,
    faults: HashSet<Op>,
    journal: Vec<JournalEntry>,
    reachability_queries: usize,
    wait_blocks: usize,
    spurious_wakeups: usize,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Consume an armed fault for `op`.
    fn trip(&mut self, op: Op) -> Result<(), TransportError> {
        if self.faults.remove(&op) {
            log::debug!("[loopback] injected failure in {}", op);
            return Err(TransportError::Injected(op));
        }
        Ok(())
    }
}

fn ready_slots(
    clients: &HashMap<ClientId, ClientEntry>,
    registered: &[ClientId],
) -> Vec<Option<ClientId>> {
    registered
        .iter()
        .map(|id| {
            clients
                .get(id)
                .filter(|entry| !entry.replies.is_empty())
                .map(|_| *id)
        })
        .collect()
}

fn client_guid_for(context: ContextId, node: NodeId, client: ClientId) -> Guid {
    let mut prefix = [0u8; 12];
    prefix[0..8].copy_from_slice(&context.0.to_le_bytes());
    prefix[8..12].copy_from_slice(&(node.0 as u32).to_le_bytes());
    let key = client.0 as u32;
    // Entity kind 0xC3: user-defined RPC client.
    let entity_id = [(key >> 16) as u8, (key >> 8) as u8, key as u8, 0xC3];
    Guid::new(prefix, entity_id)
}

/// In-memory middleware with scripted peers.
#[derive(Default)]
pub struct Loopback {
    state: Mutex<State>,
}

impl Loopback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `service` with `handler`, typed as `S`.
    ///
    /// Clients whose type name differs from `S::TYPE_NAME` never see the
    /// server as reachable.
    pub fn respond_with<S, F>(&self, service: &str, handler: F)
    where
        S: ServiceType + 'static,
        F: Fn(&S::Request) -> S::Response + Send + 'static,
    {
        let responder: Responder = Box::new(move |payload| match S::Request::decode(payload) {
            Ok(request) => Some(handler(&request).encode()),
            Err(err) => {
                log::debug!("[loopback] dropping undecodable request: {}", err);
                None
            }
        });

        let mut state = self.state.lock();
        let peer = state.peers.entry(service.to_string()).or_default();
        peer.type_name = Some(S::TYPE_NAME);
        peer.responder = Some(responder);
    }

    /// Advertise `service` as `S` without ever answering it.
    pub fn offer<S: ServiceType>(&self, service: &str) {
        let mut state = self.state.lock();
        let peer = state.peers.entry(service.to_string()).or_default();
        peer.type_name = Some(S::TYPE_NAME);
        peer.responder = None;
    }

    /// Make `service` reachable from the `queries`-th availability query on.
    pub fn available_after(&self, service: &str, queries: usize) {
        let mut state = self.state.lock();
        let peer = state.peers.entry(service.to_string()).or_default();
        peer.available_after = queries.max(1);
        peer.queries = 0;
    }

    /// Tag every reply of `service` with `sequence` instead of the request's.
    pub fn tag_responses_with(&self, service: &str, sequence: i64) {
        let mut state = self.state.lock();
        state
            .peers
            .entry(service.to_string())
            .or_default()
            .forced_tag = Some(sequence);
    }

    /// Fail the next call of `op` with [`TransportError::Injected`].
    pub fn fail_on(&self, op: Op) {
        self.state.lock().faults.insert(op);
    }

    /// Queue a reply on `client` directly.
    pub fn inject_response(
        &self,
        client: ClientId,
        header: RequestId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let entry = state
            .clients
            .get_mut(&client)
            .ok_or(TransportError::InvalidHandle)?;
        entry.replies.push_back((header, payload));
        Ok(())
    }

    /// Make the transport consume `count` sequence numbers of `client`
    /// without sending anything.
    pub fn skip_sequences(&self, client: ClientId, count: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let entry = state
            .clients
            .get_mut(&client)
            .ok_or(TransportError::InvalidHandle)?;
        entry.next_sequence += count;
        Ok(())
    }

    /// Wake the next `count` blocks immediately with every client slot empty,
    /// as a wait woken by another entity would.
    pub fn spurious_wakeups(&self, count: usize) {
        self.state.lock().spurious_wakeups = count;
    }

    /// Availability queries answered so far.
    #[must_use]
    pub fn reachability_queries(&self) -> usize {
        self.state.lock().reachability_queries
    }

    /// Blocking waits performed so far.
    #[must_use]
    pub fn wait_blocks(&self) -> usize {
        self.state.lock().wait_blocks
    }

    /// Acquire/release history, oldest first.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.clone()
    }

    /// Handles acquired and not yet released.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.contexts.len() + state.nodes.len() + state.clients.len() + state.wait_sets.len()
    }
}

impl Middleware for Loopback {
    fn context_init(&self) -> Result<ContextId, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::ContextInit)?;
        let id = ContextId(state.next_id());
        state.contexts.insert(id);
        state.journal.push(JournalEntry::Acquired(Resource::Context, id.0));
        Ok(id)
    }

    fn context_fini(&self, context: ContextId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::ContextFini)?;
        if !state.contexts.contains(&context) {
            return Err(TransportError::InvalidHandle);
        }
        if state.nodes.values().any(|node| node.context == context)
            || state.wait_sets.values().any(|ws| ws.context == context)
        {
            return Err(TransportError::Release(format!(
                "{} still has live nodes or wait sets",
                context
            )));
        }
        state.contexts.remove(&context);
        state.journal.push(JournalEntry::Released(Resource::Context, context.0));
        Ok(())
    }

    fn node_init(
        &self,
        context: ContextId,
        name: &str,
        namespace: &str,
    ) -> Result<NodeId, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::NodeInit)?;
        if !state.contexts.contains(&context) {
            return Err(TransportError::InvalidHandle);
        }
        let id = NodeId(state.next_id());
        log::debug!("[loopback] {} is '{}/{}'", id, namespace, name);
        state.nodes.insert(id, NodeEntry { context });
        state.journal.push(JournalEntry::Acquired(Resource::Node, id.0));
        Ok(id)
    }

    fn node_fini(&self, node: NodeId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::NodeFini)?;
        if !state.nodes.contains_key(&node) {
            return Err(TransportError::InvalidHandle);
        }
        if state.clients.values().any(|client| client.node == node) {
            return Err(TransportError::Release(format!(
                "{} still has live clients",
                node
            )));
        }
        state.nodes.remove(&node);
        state.journal.push(JournalEntry::Released(Resource::Node, node.0));
        Ok(())
    }

    fn client_init(
        &self,
        node: NodeId,
        service_type: &ServiceTypeInfo,
        service_name: &str,
        options: &ClientOptions,
    ) -> Result<ClientId, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::ClientInit)?;
        let context = state
            .nodes
            .get(&node)
            .map(|entry| entry.context)
            .ok_or(TransportError::InvalidHandle)?;
        let id = ClientId(state.next_id());
        state.clients.insert(
            id,
            ClientEntry {
                node,
                service: service_name.to_string(),
                type_name: service_type.type_name,
                guid: client_guid_for(context, node, id),
                next_sequence: 1,
                depth: options.history_depth.max(1),
                replies: VecDeque::new(),
            },
        );
        state.journal.push(JournalEntry::Acquired(Resource::Client, id.0));
        Ok(id)
    }

    fn client_fini(&self, client: ClientId, node: NodeId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::ClientFini)?;
        match state.clients.get(&client) {
            Some(entry) if entry.node == node => {}
            _ => return Err(TransportError::InvalidHandle),
        }
        state.clients.remove(&client);
        for wait_set in state.wait_sets.values_mut() {
            wait_set.clients.retain(|id| *id != client);
        }
        state.journal.push(JournalEntry::Released(Resource::Client, client.0));
        Ok(())
    }

    fn client_guid(&self, client: ClientId) -> Result<Guid, TransportError> {
        self.state
            .lock()
            .clients
            .get(&client)
            .map(|entry| entry.guid)
            .ok_or(TransportError::InvalidHandle)
    }

    fn service_reachable(&self, node: NodeId, client: ClientId) -> Result<bool, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::ServiceReachable)?;
        let State {
            clients,
            peers,
            reachability_queries,
            ..
        } = &mut *state;

        let entry = clients
            .get(&client)
            .filter(|entry| entry.node == node)
            .ok_or(TransportError::InvalidHandle)?;
        *reachability_queries += 1;

        match peers.get_mut(&entry.service) {
            Some(peer) if peer.type_name == Some(entry.type_name) => {
                peer.queries += 1;
                Ok(peer.queries >= peer.available_after)
            }
            _ => Ok(false),
        }
    }

    fn waitset_init(
        &self,
        context: ContextId,
        capacity: WaitSetCapacity,
    ) -> Result<WaitSetId, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::WaitSetInit)?;
        if !state.contexts.contains(&context) {
            return Err(TransportError::InvalidHandle);
        }
        let id = WaitSetId(state.next_id());
        state.wait_sets.insert(
            id,
            WaitSetEntry {
                context,
                capacity,
                clients: Vec::with_capacity(capacity.slots(WaitableKind::Client)),
            },
        );
        state.journal.push(JournalEntry::Acquired(Resource::WaitSet, id.0));
        Ok(id)
    }

    fn waitset_fini(&self, wait_set: WaitSetId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::WaitSetFini)?;
        state
            .wait_sets
            .remove(&wait_set)
            .ok_or(TransportError::InvalidHandle)?;
        state.journal.push(JournalEntry::Released(Resource::WaitSet, wait_set.0));
        Ok(())
    }

    fn waitset_clear_clients(&self, wait_set: WaitSetId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::WaitSetClearClients)?;
        state
            .wait_sets
            .get_mut(&wait_set)
            .ok_or(TransportError::InvalidHandle)?
            .clients
            .clear();
        Ok(())
    }

    fn waitset_register_client(
        &self,
        wait_set: WaitSetId,
        client: ClientId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::WaitSetRegisterClient)?;
        if !state.clients.contains_key(&client) {
            return Err(TransportError::InvalidHandle);
        }
        let entry = state
            .wait_sets
            .get_mut(&wait_set)
            .ok_or(TransportError::InvalidHandle)?;
        if entry.clients.len() >= entry.capacity.slots(WaitableKind::Client) {
            return Err(TransportError::CapacityExceeded);
        }
        entry.clients.push(client);
        Ok(())
    }

    fn waitset_block(
        &self,
        wait_set: WaitSetId,
        timeout_ns: i64,
    ) -> Result<WaitOutcome, TransportError> {
        let registered = {
            let mut state = self.state.lock();
            state.trip(Op::WaitSetBlock)?;
            state.wait_blocks += 1;
            let registered = state
                .wait_sets
                .get(&wait_set)
                .ok_or(TransportError::InvalidHandle)?
                .clients
                .clone();
            if state.spurious_wakeups > 0 {
                state.spurious_wakeups -= 1;
                return Ok(WaitOutcome::Ready {
                    clients: vec![None; registered.len()],
                });
            }
            let slots = ready_slots(&state.clients, &registered);
            if slots.iter().any(Option::is_some) {
                return Ok(WaitOutcome::Ready { clients: slots });
            }
            registered
        };

        if timeout_ns < 0 {
            return Err(TransportError::Wait(format!(
                "{} has nothing ready and no deadline",
                wait_set
            )));
        }
        std::thread::sleep(Duration::from_nanos(timeout_ns as u64));

        let state = self.state.lock();
        let slots = ready_slots(&state.clients, &registered);
        if slots.iter().any(Option::is_some) {
            Ok(WaitOutcome::Ready { clients: slots })
        } else {
            Ok(WaitOutcome::Timeout)
        }
    }

    fn send_request(&self, client: ClientId, payload: &[u8]) -> Result<i64, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::SendRequest)?;
        let State { clients, peers, .. } = &mut *state;

        let entry = clients
            .get_mut(&client)
            .ok_or(TransportError::InvalidHandle)?;
        let sequence = entry.next_sequence;
        entry.next_sequence += 1;

        let Some(peer) = peers
            .get(&entry.service)
            .filter(|peer| peer.type_name == Some(entry.type_name))
        else {
            return Ok(sequence);
        };
        if let Some(reply) = peer.responder.as_ref().and_then(|respond| respond(payload)) {
            let tag = peer.forced_tag.unwrap_or(sequence);
            entry
                .replies
                .push_back((RequestId::new(entry.guid, tag), reply));
            while entry.replies.len() > entry.depth {
                if let Some((dropped, _)) = entry.replies.pop_front() {
                    log::debug!("[loopback] history full, dropped reply {}", dropped);
                }
            }
        }
        Ok(sequence)
    }

    fn take_response(
        &self,
        client: ClientId,
    ) -> Result<Option<(RequestId, Vec<u8>)>, TransportError> {
        let mut state = self.state.lock();
        state.trip(Op::TakeResponse)?;
        let entry = state
            .clients
            .get_mut(&client)
            .ok_or(TransportError::InvalidHandle)?;
        Ok(entry.replies.pop_front())
    }
}
