//! # Configuration Surface
//!
//! A small set of named options, each resolvable from an environment
//! variable with a built-in default, which CLI flags then override. There
//! is no config-file reader here — see DESIGN.md for why a TOML/YAML layer
//! isn't added.

use std::env;

use crate::address::Address;

/// Environment variable prefix for every option below.
pub const ENV_PREFIX: &str = "RDQ_";

pub fn default_load_balancer_address() -> Address {
    "127.0.0.1:9090".parse().expect("valid default address")
}

pub fn default_broker_addresses() -> Vec<Address> {
    vec![
        "127.0.0.1:9091".parse().expect("valid default address"),
        "127.0.0.1:9092".parse().expect("valid default address"),
    ]
}

/// Upper bound on a single frame, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Reserved for future cross-broker replication; read but never acted on by
/// the core.
pub fn replication_addresses() -> Vec<Address> {
    env_list("REPLICATION_ADDRESS").unwrap_or_default()
}

/// Resolves `LOAD_BALANCER_ADDRESS` from the environment, falling back to
/// the built-in default.
pub fn load_balancer_address() -> Address {
    env_address("LOAD_BALANCER_ADDRESS").unwrap_or_else(default_load_balancer_address)
}

/// Resolves `BROKER_ADDRESSES` from the environment, falling back to the
/// built-in default pair.
pub fn broker_addresses() -> Vec<Address> {
    env_list("BROKER_ADDRESSES").unwrap_or_else(default_broker_addresses)
}

/// Resolves `MAX_MESSAGE_SIZE` from the environment, falling back to
/// [`DEFAULT_MAX_MESSAGE_SIZE`].
pub fn max_message_size() -> usize {
    env::var(format!("{ENV_PREFIX}MAX_MESSAGE_SIZE"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
}

fn env_address(name: &str) -> Option<Address> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .and_then(|v| v.parse().ok())
}

fn env_list(name: &str) -> Option<Vec<Address>> {
    let raw = env::var(format!("{ENV_PREFIX}{name}")).ok()?;
    let addrs: Vec<Address> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if addrs.is_empty() {
        None
    } else {
        Some(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't race under `cargo test`'s default
    // multi-threaded runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("RDQ_LOAD_BALANCER_ADDRESS");
        assert_eq!(load_balancer_address(), default_load_balancer_address());
    }

    #[test]
    fn env_override_wins_over_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RDQ_LOAD_BALANCER_ADDRESS", "127.0.0.1:7000");
        assert_eq!(load_balancer_address(), "127.0.0.1:7000".parse().unwrap());
        env::remove_var("RDQ_LOAD_BALANCER_ADDRESS");
    }

    #[test]
    fn broker_addresses_parse_comma_separated_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RDQ_BROKER_ADDRESSES", "127.0.0.1:1,127.0.0.1:2");
        let addrs = broker_addresses();
        assert_eq!(addrs.len(), 2);
        env::remove_var("RDQ_BROKER_ADDRESSES");
    }
}
