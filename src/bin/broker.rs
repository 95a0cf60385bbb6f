//! # Broker Binary
//!
//! Entry point mirroring `RDQueue/server/broker.py`'s `if __name__ ==
//! '__main__'` block: resolve a bind address (or, with `--all`, every
//! configured broker address), load or initialize its snapshot, and serve
//! forever.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rdqueue::cli::BrokerArgs;
use rdqueue::{Broker, QueueEngine};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BrokerArgs::parse();
    let _log_guard = rdqueue::logging::init_tracing(
        "broker",
        args.logging.verbose,
        args.logging.log_file.as_deref(),
        args.logging.quiet,
    );

    let addresses = args.resolve_addresses()?;
    info!(count = addresses.len(), "starting broker(s)");

    let mut handles = Vec::with_capacity(addresses.len());
    for address in addresses {
        let snapshot_path = args
            .snapshot_path
            .clone()
            .unwrap_or_else(|| format!("snapshots/{}.snapshot", address.file_stem()).into());

        let engine = QueueEngine::shared(snapshot_path)?;
        let broker = Arc::new(Broker::new(address, engine, rdqueue::config::max_message_size()));
        let id = broker.id().to_string();
        info!(broker_id = %id, %address, "broker ready");

        handles.push(tokio::spawn(async move {
            if let Err(e) = broker.run().await {
                error!(broker_id = %id, error = %e, "broker exited with error");
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
