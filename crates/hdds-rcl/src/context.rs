// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scoped context and node handles.
//!
//! Each handle is released exactly once: either explicitly through `fini`,
//! which reports a failed release as [`Error::Teardown`], or by `Drop` when a
//! scope is left without reaching `fini` (panics). Borrow lifetimes enforce
//! that a node never outlives its context.

use crate::error::{Error, Result, Stage};
use crate::middleware::{ContextId, Middleware, NodeId, Resource};
use std::sync::Arc;

/// Initialized participant in the middleware; root of every other handle.
pub struct Context<M: Middleware> {
    middleware: Arc<M>,
    id: ContextId,
    active: bool,
}

impl<M: Middleware> Context<M> {
    /// Initialize a context on `middleware`.
    pub fn init(middleware: Arc<M>) -> Result<Self> {
        let id = middleware
            .context_init()
            .map_err(Error::at(Stage::ContextInit))?;
        log::debug!("[rcl] {} initialized", id);

        Ok(Self {
            middleware,
            id,
            active: true,
        })
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    /// Release the context.
    pub fn fini(mut self) -> Result<()> {
        self.active = false;
        self.release()
    }

    fn release(&self) -> Result<()> {
        log::debug!("[rcl] releasing {}", self.id);
        self.middleware
            .context_fini(self.id)
            .map_err(Error::released(Resource::Context))
    }
}

impl<M: Middleware> Drop for Context<M> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(err) = self.release() {
                log::error!("[rcl] {} dropped without fini: {}", self.id, err);
            }
        }
    }
}

/// Named endpoint scoped to a [`Context`].
pub struct Node<'ctx, M: Middleware> {
    context: &'ctx Context<M>,
    id: NodeId,
    name: String,
    namespace: String,
    active: bool,
}

impl<'ctx, M: Middleware> Node<'ctx, M> {
    /// Create a node named `name` in `namespace` (empty for the root).
    pub fn init(context: &'ctx Context<M>, name: &str, namespace: &str) -> Result<Self> {
        let id = context
            .middleware()
            .node_init(context.id(), name, namespace)
            .map_err(Error::at(Stage::NodeInit))?;
        log::debug!("[rcl] {} '{}' initialized in {}", id, name, context.id());

        Ok(Self {
            context,
            id,
            name: name.to_string(),
            namespace: namespace.to_string(),
            active: true,
        })
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn context(&self) -> &'ctx Context<M> {
        self.context
    }

    pub(crate) fn middleware(&self) -> &'ctx M {
        self.context.middleware()
    }

    /// Release the node. Every client created from it must be released first.
    pub fn fini(mut self) -> Result<()> {
        self.active = false;
        self.release()
    }

    fn release(&self) -> Result<()> {
        log::debug!("[rcl] releasing {} '{}'", self.id, self.name);
        self.middleware()
            .node_fini(self.id)
            .map_err(Error::released(Resource::Node))
    }
}

impl<M: Middleware> Drop for Node<'_, M> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(err) = self.release() {
                log::error!("[rcl] {} dropped without fini: {}", self.id, err);
            }
        }
    }
}
