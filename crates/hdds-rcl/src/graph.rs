// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service availability polling against the middleware graph.

use crate::client::Client;
use crate::context::Node;
use crate::error::{Error, Result, Stage, TransportError};
use crate::middleware::Middleware;
use crate::types::ServiceType;
use std::time::Duration;

/// Poll until a server for `client`'s service is reachable.
///
/// Performs at least one query, then at most `max_tries` in total, sleeping
/// `period` after each negative answer. Returns `Ok(false)` when the budget
/// runs out. A failing query aborts immediately: it points at a broken
/// handle, not at an absent server.
pub fn wait_for_service_available<M: Middleware, S: ServiceType>(
    node: &Node<'_, M>,
    client: &Client<'_, M, S>,
    max_tries: usize,
    period: Duration,
) -> Result<bool> {
    if client.node().id() != node.id() {
        return Err(Error::Transport {
            stage: Stage::ServiceQuery,
            source: TransportError::InvalidHandle,
        });
    }

    let middleware = node.context().middleware();
    let mut iteration = 0;
    loop {
        iteration += 1;
        let reachable = middleware
            .service_reachable(node.id(), client.id())
            .map_err(|source| {
                log::error!(
                    "[rcl-poller] availability query for '{}' failed: {}",
                    client.service_name(),
                    source
                );
                Error::Transport {
                    stage: Stage::ServiceQuery,
                    source,
                }
            })?;
        if reachable {
            log::debug!(
                "[rcl-poller] '{}' reachable after {} queries",
                client.service_name(),
                iteration
            );
            return Ok(true);
        }
        std::thread::sleep(period);
        if iteration >= max_tries {
            break;
        }
    }

    log::debug!(
        "[rcl-poller] '{}' still unreachable after {} queries",
        client.service_name(),
        iteration
    );
    Ok(false)
}
