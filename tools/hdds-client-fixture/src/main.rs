// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hdds-client-fixture - one add_two_ints call through hdds-rcl
//!
//! Acquires a context, a node and a client, waits for the service, sends
//! `{a, b}`, waits for the reply and takes it, then releases everything.
//! Exits with a non-zero status and the failing stage on any error.
//!
//! # Usage
//!
//! ```bash
//! # Default cycle (1 + 2) against the in-process peer
//! hdds-client-fixture
//!
//! # Peer discovered on the 5th query, short budgets
//! hdds-client-fixture --peer-delay 5 --discovery-tries 10 --discovery-period-ms 20
//!
//! # No peer at all: fails after the discovery budget
//! hdds-client-fixture --no-peer --discovery-tries 3
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use hdds_rcl::srv::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
use hdds_rcl::{run_cycle, Budget, EnvConfig, Loopback};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hdds-client-fixture")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run one add_two_ints request/response cycle and release every handle")]
#[command(long_about = None)]
struct Cli {
    /// First operand
    #[arg(short, default_value = "1", allow_hyphen_values = true)]
    a: i64,

    /// Second operand
    #[arg(short, default_value = "2", allow_hyphen_values = true)]
    b: i64,

    /// Node name (overrides HDDS_RCL_NODE_NAME)
    #[arg(long)]
    node_name: Option<String>,

    /// Node namespace (overrides HDDS_RCL_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Service name (overrides HDDS_RCL_SERVICE_NAME)
    #[arg(short, long)]
    service: Option<String>,

    /// Availability queries before giving up
    #[arg(long)]
    discovery_tries: Option<usize>,

    /// Pause between availability queries, in milliseconds
    #[arg(long)]
    discovery_period_ms: Option<u64>,

    /// Wait-set blocks before giving up on the reply
    #[arg(long)]
    response_tries: Option<usize>,

    /// Timeout of each wait-set block, in milliseconds
    #[arg(long)]
    response_period_ms: Option<u64>,

    /// Do not serve the service in-process
    #[arg(long)]
    no_peer: bool,

    /// Availability query on which the in-process peer becomes reachable
    #[arg(long, default_value = "1")]
    peer_delay: usize,

    /// Verbose mode (show hdds-rcl debug logs)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, mut config: EnvConfig) -> EnvConfig {
        if let Some(name) = &self.node_name {
            config.node_name = name.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(service) = &self.service {
            config.service_name = service.clone();
        }
        config.discovery = override_budget(
            config.discovery,
            self.discovery_tries,
            self.discovery_period_ms,
        );
        config.response =
            override_budget(config.response, self.response_tries, self.response_period_ms);
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        config
    }
}

fn override_budget(budget: Budget, tries: Option<usize>, period_ms: Option<u64>) -> Budget {
    Budget::new(
        tries.unwrap_or(budget.max_tries),
        period_ms.map_or(budget.period, Duration::from_millis),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.apply(EnvConfig::from_env());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "hdds_client_fixture={level},hdds_rcl={level}",
            level = config.log_level
        ))
    });
    fmt().with_env_filter(filter).with_target(false).init();

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &EnvConfig) -> Result<()> {
    let loopback = Arc::new(Loopback::new());
    if !cli.no_peer {
        loopback.respond_with::<AddTwoInts, _>(&config.service_name, |req| AddTwoIntsResponse {
            sum: req.a.wrapping_add(req.b),
        });
        loopback.available_after(&config.service_name, cli.peer_delay);
    }

    tracing::info!(
        node = %config.node_name,
        service = %config.service_name,
        discovery_tries = config.discovery.max_tries,
        response_tries = config.response.max_tries,
        "Starting request/response cycle"
    );

    let request = AddTwoIntsRequest { a: cli.a, b: cli.b };
    let report = run_cycle::<_, AddTwoInts>(Arc::clone(&loopback), config, &request)
        .map_err(|err| {
            let stage = err.stage();
            anyhow::Error::new(err).context(format!("cycle failed at {}", stage))
        })?;

    let leaked = loopback.live_handles();
    if leaked != 0 {
        bail!("{} handles still live after teardown", leaked);
    }

    let expected = cli.a.wrapping_add(cli.b);
    if report.response.sum != expected {
        bail!(
            "unexpected response: peer answered {} instead of {}",
            report.response.sum,
            expected
        );
    }

    tracing::info!(
        sequence = report.sequence(),
        sum = report.response.sum,
        header = %report.header,
        "Response taken, all handles released"
    );
    Ok(())
}
