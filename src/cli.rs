//! # Command-Line Interface
//!
//! Argument parsing for the `broker` and `load-balancer` binaries, built
//! with `clap`'s derive API, using a `-v`/`-q`/`--log-file` verbosity
//! convention shared by both.

use clap::builder::styling::{AnsiColor, Styles};
use clap::Parser;

use crate::address::Address;
use crate::config;

/// Replicates clap v3's color scheme for the generated `--help` output.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Flags shared by every binary in the cluster.
#[derive(clap::Args, Debug, Clone)]
pub struct LoggingArgs {
    /// Silence all user-facing informational output on stdout.
    ///
    /// When this flag is present, only the detailed file/stderr log is
    /// written.
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity.
    ///
    /// Can be used multiple times:
    ///  -v: debug
    ///  -vv: trace
    /// By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Where to write the detailed log. Use "stderr" to log there instead
    /// of a rolling daily file.
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

/// A message queue broker node.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct BrokerArgs {
    /// Host to bind this broker's TCP listener to.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind this broker's TCP listener to.
    #[arg(long)]
    pub port: Option<u16>,

    /// Run every broker address from `RDQ_BROKER_ADDRESSES` (or the built-in
    /// default pair) as a separate broker in this process, instead of a
    /// single broker bound to `--host`/`--port`.
    #[arg(long, conflicts_with_all = ["host", "port"])]
    pub all: bool,

    /// Path to the on-disk snapshot file. Defaults to a name derived from
    /// the broker's bind address.
    #[arg(long)]
    pub snapshot_path: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl BrokerArgs {
    /// Resolves the set of addresses this invocation should bind, honoring
    /// `--all` over `--host`/`--port` over the environment/default.
    pub fn resolve_addresses(&self) -> anyhow::Result<Vec<Address>> {
        if self.all {
            return Ok(config::broker_addresses());
        }

        if let (Some(host), Some(port)) = (self.host.as_deref(), self.port) {
            return Ok(vec![Address::from_parts(host, port)?]);
        }

        if self.host.is_some() || self.port.is_some() {
            anyhow::bail!("--host and --port must be given together");
        }

        Ok(vec![config::default_broker_addresses()
            .into_iter()
            .next()
            .expect("default broker address list is never empty")])
    }
}

/// The cluster's front-facing load balancer.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct LoadBalancerArgs {
    /// Address to bind the load balancer's own TCP listener to.
    #[arg(long)]
    pub address: Option<String>,

    /// Broker address to register with the directory. Repeat for multiple
    /// brokers. Defaults to `RDQ_BROKER_ADDRESSES` (or the built-in default
    /// pair) when omitted.
    #[arg(long = "broker")]
    pub brokers: Vec<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl LoadBalancerArgs {
    pub fn resolve_address(&self) -> anyhow::Result<Address> {
        match &self.address {
            Some(addr) => Ok(addr.parse()?),
            None => Ok(config::load_balancer_address()),
        }
    }

    pub fn resolve_brokers(&self) -> anyhow::Result<Vec<Address>> {
        if self.brokers.is_empty() {
            return Ok(config::broker_addresses());
        }
        self.brokers
            .iter()
            .map(|s| s.parse().map_err(anyhow::Error::from))
            .collect()
    }
}
