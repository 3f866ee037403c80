// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synchronous request/response client over a readiness-polled middleware.
//!
//! The crate drives one service call at a time on top of a [`Middleware`]:
//!
//! - [`wait_for_service_available`] polls the graph until a server is
//!   reachable,
//! - [`Client`] sends a request and takes the matching response,
//! - [`wait_for_client_ready`] blocks on a [`WaitSet`] until the response is
//!   queued.
//!
//! Every handle ([`Context`], [`Node`], [`Client`], [`WaitSet`]) is released
//! exactly once, in reverse acquisition order, on every exit path.
//! [`run_cycle`] chains all of it for one call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdds_rcl::srv::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
//! use hdds_rcl::{run_cycle, EnvConfig, Loopback};
//!
//! let loopback = Arc::new(Loopback::new());
//! loopback.respond_with::<AddTwoInts, _>("add_two_ints", |req| AddTwoIntsResponse {
//!     sum: req.a + req.b,
//! });
//! let report = run_cycle::<_, AddTwoInts>(
//!     loopback,
//!     &EnvConfig::from_env(),
//!     &AddTwoIntsRequest { a: 1, b: 2 },
//! )?;
//! assert_eq!(report.response.sum, 3);
//! # Ok::<(), hdds_rcl::Error>(())
//! ```

pub mod client;
pub mod context;
pub mod env_config;
pub mod error;
pub mod fixture;
pub mod graph;
pub mod loopback;
pub mod middleware;
pub mod srv;
pub mod types;
pub mod waitset;

pub use client::{Client, ResponseEnvelope};
pub use context::{Context, Node};
pub use env_config::{Budget, EnvConfig};
pub use error::{finish, Error, Result, Stage, TransportError};
pub use fixture::{run_cycle, CycleReport, CycleState};
pub use graph::wait_for_service_available;
pub use loopback::{JournalEntry, Loopback};
pub use middleware::{
    ClientId, ContextId, Middleware, NodeId, Op, Resource, WaitOutcome, WaitSetCapacity,
    WaitSetId, WaitableKind,
};
pub use types::{
    ClientOptions, Guid, Message, Reliability, RequestId, ServiceType, ServiceTypeInfo,
};
pub use waitset::{wait_for_client_ready, WaitSet};
