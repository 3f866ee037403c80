// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the request/response client.

use crate::middleware::{Op, Resource};
use crate::types::RequestId;
use std::fmt;
use thiserror::Error;

/// Failures reported by a boundary call of the middleware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid handle")]
    InvalidHandle,
    #[error("wait set capacity exceeded")]
    CapacityExceeded,
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("wait failed: {0}")]
    Wait(String),
    #[error("release failed: {0}")]
    Release(String),
    #[error("injected failure in {0}")]
    Injected(Op),
}

/// Stage of a request/response cycle, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ContextInit,
    NodeInit,
    ClientInit,
    ServiceQuery,
    WaitSetInit,
    WaitSetClear,
    WaitSetRegister,
    Wait,
    Send,
    Take,
    Correlate,
    Teardown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContextInit => "context init",
            Self::NodeInit => "node init",
            Self::ClientInit => "client init",
            Self::ServiceQuery => "service availability query",
            Self::WaitSetInit => "wait set init",
            Self::WaitSetClear => "wait set clear",
            Self::WaitSetRegister => "wait set registration",
            Self::Wait => "wait",
            Self::Send => "send request",
            Self::Take => "take response",
            Self::Correlate => "response correlation",
            Self::Teardown => "teardown",
        })
    }
}

/// Errors surfaced by the client core.
#[derive(Debug, Error)]
pub enum Error {
    /// A boundary call failed; fatal to the current operation.
    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        source: TransportError,
    },

    /// A bounded polling loop ran out of attempts.
    #[error("{stage} gave up after {attempts} attempts")]
    TimeoutExhausted { stage: Stage, attempts: usize },

    /// `take_response` was called while nothing was queued.
    #[error("no response available")]
    NoResponseAvailable,

    /// The taken payload could not be decoded.
    #[error("malformed {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// The transport did not hand out the next sequence number.
    #[error("invalid sequence number {got} (expected {expected})")]
    InvalidSequence { expected: i64, got: i64 },

    /// The taken response answers another request.
    #[error("response {actual} does not answer request {expected}")]
    CorrelationMismatch {
        expected: RequestId,
        actual: RequestId,
    },

    /// Releasing a handle failed. Never masked by the primary outcome.
    #[error("failed to release {resource}: {source}")]
    Teardown {
        resource: Resource,
        source: TransportError,
    },
}

impl Error {
    /// `map_err` adapter tagging a transport failure with its stage.
    pub(crate) fn at(stage: Stage) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::Transport { stage, source }
    }

    /// `map_err` adapter for release failures.
    pub(crate) fn released(resource: Resource) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::Teardown { resource, source }
    }

    /// Stage the error belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Transport { stage, .. } | Self::TimeoutExhausted { stage, .. } => *stage,
            Self::NoResponseAvailable | Self::Decode { .. } => Stage::Take,
            Self::InvalidSequence { .. } => Stage::Send,
            Self::CorrelationMismatch { .. } => Stage::Correlate,
            Self::Teardown { .. } => Stage::Teardown,
        }
    }

    /// Whether a resource invariant was violated (leaked or corrupted handle).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Teardown { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Combine the primary outcome of a scope with the release of its resource.
///
/// A teardown failure wins over whatever the scope produced; a primary error
/// that gets overridden is logged so it is not lost.
pub fn finish<T>(primary: Result<T>, teardown: Result<()>) -> Result<T> {
    match (primary, teardown) {
        (primary, Ok(())) => primary,
        (Ok(_), Err(teardown)) => Err(teardown),
        (Err(primary), Err(teardown)) => {
            log::error!("[rcl] {} (superseded by: {})", primary, teardown);
            Err(teardown)
        }
    }
}
