//! # Load Balancer Binary
//!
//! Entry point mirroring `RDQueue/server/loadbalancer.py`'s `main()`:
//! build the broker directory from the configured addresses and serve
//! forever.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rdqueue::cli::LoadBalancerArgs;
use rdqueue::LoadBalancer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = LoadBalancerArgs::parse();
    let _log_guard = rdqueue::logging::init_tracing(
        "load-balancer",
        args.logging.verbose,
        args.logging.log_file.as_deref(),
        args.logging.quiet,
    );

    let address = args.resolve_address()?;
    let brokers = args.resolve_brokers()?;
    info!(%address, broker_count = brokers.len(), "starting load balancer");

    let lb = Arc::new(LoadBalancer::new(address, brokers));
    lb.run().await
}
