// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One full request/response cycle.
//!
//! Acquires context, node and client, waits for the service, sends one
//! request, waits for the client to become ready, takes and validates the
//! response, then releases everything in reverse order. Each scope hands its
//! outcome and its own release result to [`finish`], so a failed release is
//! reported even when the exchange succeeded.

use crate::client::Client;
use crate::context::{Context, Node};
use crate::env_config::EnvConfig;
use crate::error::{finish, Error, Result, Stage};
use crate::graph::wait_for_service_available;
use crate::middleware::Middleware;
use crate::types::{ClientOptions, RequestId, ServiceType};
use crate::waitset::wait_for_client_ready;
use std::fmt;
use std::sync::Arc;

/// Progress of a cycle. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingServiceAvailable,
    ServiceAvailable,
    RequestSent,
    AwaitingResponse,
    ResponseTaken,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingServiceAvailable => "awaiting service",
            Self::ServiceAvailable => "service available",
            Self::RequestSent => "request sent",
            Self::AwaitingResponse => "awaiting response",
            Self::ResponseTaken => "response taken",
            Self::Failed => "failed",
        })
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport<R> {
    pub header: RequestId,
    pub response: R,
    /// Every state entered, starting from `Idle`.
    pub transitions: Vec<CycleState>,
}

impl<R> CycleReport<R> {
    #[must_use]
    pub fn sequence(&self) -> i64 {
        self.header.sequence_number
    }
}

struct Tracker {
    transitions: Vec<CycleState>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            transitions: vec![CycleState::Idle],
        }
    }

    fn current(&self) -> CycleState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(CycleState::Idle)
    }

    fn advance(&mut self, next: CycleState) {
        log::debug!("[rcl] cycle: {} -> {}", self.current(), next);
        self.transitions.push(next);
    }
}

/// Run one cycle of `S` against `middleware` and return the response.
pub fn run_cycle<M: Middleware, S: ServiceType>(
    middleware: Arc<M>,
    config: &EnvConfig,
    request: &S::Request,
) -> Result<CycleReport<S::Response>> {
    let mut tracker = Tracker::new();

    match with_context::<M, S>(middleware, config, request, &mut tracker) {
        Ok((header, response)) => {
            tracker.advance(CycleState::Idle);
            Ok(CycleReport {
                header,
                response,
                transitions: tracker.transitions,
            })
        }
        Err(err) => {
            tracker.advance(CycleState::Failed);
            log::error!("[rcl] {}: {}", err.stage(), err);
            Err(err)
        }
    }
}

fn with_context<M: Middleware, S: ServiceType>(
    middleware: Arc<M>,
    config: &EnvConfig,
    request: &S::Request,
    tracker: &mut Tracker,
) -> Result<(RequestId, S::Response)> {
    let context = Context::init(middleware)?;
    let outcome = with_node::<M, S>(&context, config, request, tracker);
    finish(outcome, context.fini())
}

fn with_node<M: Middleware, S: ServiceType>(
    context: &Context<M>,
    config: &EnvConfig,
    request: &S::Request,
    tracker: &mut Tracker,
) -> Result<(RequestId, S::Response)> {
    let node = Node::init(context, &config.node_name, &config.namespace)?;
    let outcome = with_client::<M, S>(&node, config, request, tracker);
    finish(outcome, node.fini())
}

fn with_client<M: Middleware, S: ServiceType>(
    node: &Node<'_, M>,
    config: &EnvConfig,
    request: &S::Request,
    tracker: &mut Tracker,
) -> Result<(RequestId, S::Response)> {
    let mut client =
        Client::<M, S>::init(node, &config.service_name, &ClientOptions::default())?;
    let outcome = exchange(&mut client, config, request, tracker);
    finish(outcome, client.fini())
}

fn exchange<M: Middleware, S: ServiceType>(
    client: &mut Client<'_, M, S>,
    config: &EnvConfig,
    request: &S::Request,
    tracker: &mut Tracker,
) -> Result<(RequestId, S::Response)> {
    let discovery = config.discovery;
    tracker.advance(CycleState::AwaitingServiceAvailable);
    if !wait_for_service_available(client.node(), client, discovery.max_tries, discovery.period)? {
        return Err(Error::TimeoutExhausted {
            stage: Stage::ServiceQuery,
            attempts: discovery.attempts(),
        });
    }
    tracker.advance(CycleState::ServiceAvailable);

    let sequence = client.send_request(request)?;
    tracker.advance(CycleState::RequestSent);

    let response_budget = config.response;
    tracker.advance(CycleState::AwaitingResponse);
    if !wait_for_client_ready(client, response_budget.max_tries, response_budget.period)? {
        return Err(Error::TimeoutExhausted {
            stage: Stage::Wait,
            attempts: response_budget.attempts(),
        });
    }

    let response = client.take_validated(sequence)?;
    tracker.advance(CycleState::ResponseTaken);
    log::debug!("[rcl] request #{} answered on '{}'", sequence, client.service_name());
    Ok((RequestId::new(client.guid(), sequence), response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_config::Budget;
    use crate::loopback::Loopback;
    use crate::middleware::Op;
    use crate::srv::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
    use std::time::Duration;

    fn quick_config() -> EnvConfig {
        EnvConfig {
            discovery: Budget::new(20, Duration::from_millis(1)),
            response: Budget::new(20, Duration::from_millis(1)),
            ..EnvConfig::default()
        }
    }

    fn adder() -> Arc<Loopback> {
        let loopback = Arc::new(Loopback::new());
        loopback.respond_with::<AddTwoInts, _>("add_two_ints", |req| AddTwoIntsResponse {
            sum: req.a + req.b,
        });
        loopback
    }

    #[test]
    fn successful_cycle_walks_every_state() {
        let loopback = adder();
        let report = run_cycle::<_, AddTwoInts>(
            Arc::clone(&loopback),
            &quick_config(),
            &AddTwoIntsRequest { a: 1, b: 2 },
        )
        .expect("cycle");

        assert_eq!(report.response.sum, 3);
        assert_eq!(report.sequence(), 1);
        assert_eq!(
            report.transitions,
            vec![
                CycleState::Idle,
                CycleState::AwaitingServiceAvailable,
                CycleState::ServiceAvailable,
                CycleState::RequestSent,
                CycleState::AwaitingResponse,
                CycleState::ResponseTaken,
                CycleState::Idle,
            ]
        );
        assert_eq!(loopback.live_handles(), 0);
    }

    #[test]
    fn absent_service_exhausts_discovery_budget() {
        let loopback = Arc::new(Loopback::new());
        let config = EnvConfig {
            discovery: Budget::new(4, Duration::from_millis(1)),
            ..quick_config()
        };

        let err = run_cycle::<_, AddTwoInts>(
            Arc::clone(&loopback),
            &config,
            &AddTwoIntsRequest::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::TimeoutExhausted {
                stage: Stage::ServiceQuery,
                attempts: 4,
            }
        ));
        assert_eq!(loopback.reachability_queries(), 4);
        assert_eq!(loopback.live_handles(), 0);
    }

    #[test]
    fn send_failure_still_releases_every_handle() {
        let loopback = adder();
        loopback.fail_on(Op::SendRequest);

        let err = run_cycle::<_, AddTwoInts>(
            Arc::clone(&loopback),
            &quick_config(),
            &AddTwoIntsRequest::default(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), Stage::Send);
        assert_eq!(loopback.wait_blocks(), 0);
        assert_eq!(loopback.live_handles(), 0);
    }

    #[test]
    fn node_release_failure_overrides_success() {
        let loopback = adder();
        loopback.fail_on(Op::NodeFini);

        let err = run_cycle::<_, AddTwoInts>(
            Arc::clone(&loopback),
            &quick_config(),
            &AddTwoIntsRequest::default(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.stage(), Stage::Teardown);
    }
}
