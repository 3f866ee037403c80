// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wait-set handle and client readiness correlation.
//!
//! A [`WaitSet`] only stores the identifiers of the clients registered into
//! it; it never controls their lifetime. It is created for one correlation
//! call, cleared before every reuse and released when the call ends.

use crate::client::Client;
use crate::context::Context;
use crate::error::{finish, Error, Result, Stage};
use crate::middleware::{
    duration_to_ns, Middleware, Resource, WaitOutcome, WaitSetCapacity, WaitSetId,
};
use crate::types::ServiceType;
use std::time::Duration;

/// Scoped wait-set registration bound to a [`Context`].
pub struct WaitSet<'ctx, M: Middleware> {
    context: &'ctx Context<M>,
    id: WaitSetId,
    capacity: WaitSetCapacity,
    active: bool,
}

impl<'ctx, M: Middleware> WaitSet<'ctx, M> {
    pub fn init(context: &'ctx Context<M>, capacity: WaitSetCapacity) -> Result<Self> {
        let id = context
            .middleware()
            .waitset_init(context.id(), capacity)
            .map_err(Error::at(Stage::WaitSetInit))?;
        log::debug!("[rcl-waitset] {} initialized ({:?})", id, capacity);

        Ok(Self {
            context,
            id,
            capacity,
            active: true,
        })
    }

    #[must_use]
    pub fn id(&self) -> WaitSetId {
        self.id
    }

    #[must_use]
    pub fn capacity(&self) -> WaitSetCapacity {
        self.capacity
    }

    /// Drop every client registration.
    pub fn clear_clients(&self) -> Result<()> {
        self.context
            .middleware()
            .waitset_clear_clients(self.id)
            .map_err(Error::at(Stage::WaitSetClear))
    }

    pub fn register_client<S: ServiceType>(&self, client: &Client<'_, M, S>) -> Result<()> {
        self.context
            .middleware()
            .waitset_register_client(self.id, client.id())
            .map_err(Error::at(Stage::WaitSetRegister))
    }

    /// Block for at most `timeout` until a registered entity is ready.
    pub fn block(&self, timeout: Duration) -> Result<WaitOutcome> {
        self.context
            .middleware()
            .waitset_block(self.id, duration_to_ns(Some(timeout)))
            .map_err(Error::at(Stage::Wait))
    }

    /// Release the wait set.
    pub fn fini(mut self) -> Result<()> {
        self.active = false;
        self.release()
    }

    fn release(&self) -> Result<()> {
        log::debug!("[rcl-waitset] releasing {}", self.id);
        self.context
            .middleware()
            .waitset_fini(self.id)
            .map_err(Error::released(Resource::WaitSet))
    }
}

impl<M: Middleware> Drop for WaitSet<'_, M> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(err) = self.release() {
                log::error!("[rcl-waitset] {} dropped without fini: {}", self.id, err);
            }
        }
    }
}

/// Block until `client` has a response queued.
///
/// Each of the at least one and at most `max_tries` iterations re-registers
/// the client and blocks for `period`. Returns `Ok(true)` on the first
/// iteration that reports the client ready and `Ok(false)` when the budget
/// runs out. The wait set is released on every path; a failed release is
/// returned as [`Error::Teardown`] even when the wait itself succeeded.
pub fn wait_for_client_ready<M: Middleware, S: ServiceType>(
    client: &Client<'_, M, S>,
    max_tries: usize,
    period: Duration,
) -> Result<bool> {
    let wait_set = WaitSet::init(client.node().context(), WaitSetCapacity::clients(1))?;
    let outcome = poll_client(&wait_set, client, max_tries, period);
    finish(outcome, wait_set.fini())
}

fn poll_client<M: Middleware, S: ServiceType>(
    wait_set: &WaitSet<'_, M>,
    client: &Client<'_, M, S>,
    max_tries: usize,
    period: Duration,
) -> Result<bool> {
    let mut iteration = 0;
    loop {
        iteration += 1;
        wait_set.clear_clients()?;
        wait_set.register_client(client)?;

        match wait_set.block(period) {
            Ok(WaitOutcome::Ready { clients }) => {
                if clients.iter().any(|slot| *slot == Some(client.id())) {
                    log::debug!(
                        "[rcl-waitset] {} ready after {} iterations",
                        client.id(),
                        iteration
                    );
                    return Ok(true);
                }
            }
            Ok(WaitOutcome::Timeout) => {}
            Err(err) => {
                log::error!("[rcl-waitset] {}", err);
                return Err(err);
            }
        }

        if iteration >= max_tries {
            break;
        }
    }

    log::debug!(
        "[rcl-waitset] {} not ready after {} iterations",
        client.id(),
        iteration
    );
    Ok(false)
}
