//! # Load Balancer
//!
//! Mirrors `RDQueue/server/loadbalancer.py`: a directory of known brokers,
//! each periodically probed with a BROKER_INFO request to learn its id and
//! liveness, and a min-heap selection policy that hands out the
//! least-loaded live broker to clients that ask.
//!
//! The source's `Broker.__lt__` is `self.is_alive < other.is_alive and
//! self.load < other.load` — a conjunction of two independent `<`
//! comparisons, which is not a total order (it is neither reflexive-safe
//! nor transitive: two brokers can each compare "not less than" the other
//! without being equal). [`BrokerEntry`]'s `Ord` replaces it with a real
//! total order: alive brokers always sort before dead ones, and within the
//! same liveness, lower load sorts first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::address::Address;
use crate::framing::{write_frame, FrameReader};
use crate::message::{Body, Message, MessageType, Operation};
use crate::scheduler::PeriodicTask;

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// One broker's liveness and load, as tracked by the load balancer.
#[derive(Debug, Clone)]
pub struct BrokerEntry {
    address: Address,
    id: Option<String>,
    load: u64,
    alive: bool,
}

impl BrokerEntry {
    fn new(address: Address) -> Self {
        Self {
            address,
            id: None,
            load: 0,
            alive: false,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// `BinaryHeap` is a max-heap; wrapping in `Reverse`-style ordering here
/// instead means the *least* loaded live broker compares greatest, so
/// `BinaryHeap::pop` returns it directly — the same "pop the best
/// candidate" usage the source gets from `heapq.heappop` on a min-heap.
impl PartialEq for BrokerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.alive == other.alive && self.load == other.load
    }
}
impl Eq for BrokerEntry {}

impl PartialOrd for BrokerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BrokerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Alive brokers are preferable to dead ones; within the same
        // liveness, lower load is preferable. Both comparisons stack into
        // a single total order, then get reversed so `BinaryHeap::pop`
        // yields the most preferable entry.
        let preference = self
            .alive
            .cmp(&other.alive)
            .then_with(|| other.load.cmp(&self.load));
        preference
    }
}

/// Directory of brokers plus the periodic probes that keep it current.
///
/// The directory itself lives behind a `parking_lot::Mutex`: every
/// critical section is a handful of heap operations with no `.await`
/// inside it, so a synchronous lock (held across no suspension point) is
/// both simpler and cheaper than an async one here, unlike the queue
/// engine's critical section which brackets a disk write.
pub struct LoadBalancer {
    address: Address,
    directory: Arc<Mutex<BinaryHeap<BrokerEntry>>>,
    _probes: Vec<PeriodicTask>,
}

impl LoadBalancer {
    /// Builds the directory from `broker_addresses` and starts one
    /// liveness-probing task per broker immediately.
    pub fn new(address: Address, broker_addresses: Vec<Address>) -> Self {
        let directory = Arc::new(Mutex::new(
            broker_addresses
                .into_iter()
                .map(BrokerEntry::new)
                .collect::<BinaryHeap<_>>(),
        ));

        let self_connection_str = address.connection_str();
        let probes = directory
            .lock()
            .iter()
            .map(|entry| entry.address)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|broker_address| {
                let directory = Arc::clone(&directory);
                let self_connection_str = self_connection_str.clone();
                PeriodicTask::spawn(PROBE_INTERVAL, move || {
                    let directory = Arc::clone(&directory);
                    let self_connection_str = self_connection_str.clone();
                    async move { probe_broker(broker_address, &self_connection_str, &directory).await }
                })
            })
            .collect();

        Self {
            address,
            directory,
            _probes: probes,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Pops the most preferable broker, increments its load, and pushes it
    /// back — matching the source's pop/increment/push pattern in
    /// `get_next_broker`. Returns `None` if the selected broker turns out
    /// not to be alive yet (no broker has ever answered a probe) or if the
    /// directory is empty.
    pub fn get_next_broker(&self) -> Option<BrokerEntry> {
        let mut directory = self.directory.lock();
        let mut selected = directory.pop()?;
        selected.load += 1;
        let alive = selected.alive;
        directory.push(selected.clone());

        if !alive {
            warn!(broker = %selected.address, "selected broker is not available yet");
            return None;
        }
        Some(selected)
    }

    /// Snapshot of the current directory, for diagnostics and tests.
    pub fn brokers(&self) -> Vec<BrokerEntry> {
        self.directory.lock().iter().cloned().collect()
    }

    /// Binds the configured address without serving it yet, so callers can
    /// learn the actual bound port before requests start arriving.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind((self.address.host(), self.address.port())).await?;
        info!(address = %self.address, "load balancer listening");
        Ok(listener)
    }

    /// Binds the listener and serves BROKER_INFO/REGISTER_CLIENT requests
    /// forever.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serves an already-bound listener forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let lb = Arc::clone(&self);
            tokio::spawn(async move {
                debug!(%peer, "accepted connection");
                if let Err(e) = lb.handle_connection(stream).await {
                    warn!(%peer, error = %e, "connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<(), crate::error::FramingError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        // A client speaks exactly one request per connection to the load
        // balancer, matching the source's `handle_client` which reads one
        // message, dispatches it, and lets the connection close.
        let request = match reader.read_frame(crate::config::max_message_size()).await? {
            Some(msg) => msg,
            None => return Ok(()),
        };

        if !matches!(request.message_type, MessageType::Request) {
            return Ok(());
        }

        if let Some(response) = self.handle_request(&request) {
            write_frame(&mut write_half, &response).await?;
        }
        Ok(())
    }

    fn handle_request(&self, request: &Message) -> Option<Message> {
        match request.operation {
            Operation::BrokerInfo | Operation::RegisterClient => {
                let broker = self.get_next_broker();
                match broker {
                    None => {
                        error!("no broker is available to handle the client registration request");
                        None
                    }
                    Some(broker) => {
                        info!(broker = %broker.address, "selected broker for client registration");
                        Some(Message::response_ok(
                            self.address.connection_str(),
                            request.sender_addr.clone(),
                            None,
                            Operation::RegisterClient,
                            Body::BrokerAssignment {
                                id: broker.id.clone().unwrap_or_default(),
                                address: broker.address.connection_str(),
                            },
                        ))
                    }
                }
            }
            _ => None,
        }
    }
}

/// Connects to `broker_address`, sends a BROKER_INFO request, and updates
/// the directory entry with the resulting id/liveness. A connect timeout
/// or any I/O error marks the broker dead; the entry is located by address
/// equality and patched in place (`BinaryHeap` has no direct mutate-in-place
/// API, so the heap is rebuilt from its drained contents).
async fn probe_broker(
    broker_address: Address,
    self_connection_str: &str,
    directory: &Arc<Mutex<BinaryHeap<BrokerEntry>>>,
) {
    let outcome = async {
        let mut stream = timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect((
            broker_address.host(),
            broker_address.port(),
        )))
        .await
        .map_err(|_| "connection timed out".to_string())?
        .map_err(|e| e.to_string())?;

        let request = Message::request(
            self_connection_str,
            broker_address.connection_str(),
            None,
            None,
            Operation::BrokerInfo,
            Body::Empty,
        );
        write_frame(&mut stream, &request)
            .await
            .map_err(|e| e.to_string())?;

        let (read_half, _write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let response = reader
            .read_frame(crate::config::max_message_size())
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "connection closed before a response arrived".to_string())?;

        response
            .body
            .as_text()
            .map(|s| s.to_string())
            .ok_or_else(|| "broker info response had no id".to_string())
    }
    .await;

    let mut guard = directory.lock();
    let mut entries: Vec<BrokerEntry> = std::mem::take(&mut *guard).into_vec();
    for entry in entries.iter_mut() {
        if entry.address != broker_address {
            continue;
        }
        match &outcome {
            Ok(id) => {
                if !entry.alive {
                    info!(broker = %broker_address, "broker is alive and ready to serve clients");
                }
                entry.id = Some(id.clone());
                entry.alive = true;
            }
            Err(reason) => {
                entry.alive = false;
                error!(broker = %broker_address, reason, "broker is not available");
            }
        }
        break;
    }
    *guard = entries.into_iter().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_sorts_before_dead_regardless_of_load() {
        let mut alive = BrokerEntry::new("127.0.0.1:1".parse().unwrap());
        alive.alive = true;
        alive.load = 100;

        let mut dead = BrokerEntry::new("127.0.0.1:2".parse().unwrap());
        dead.alive = false;
        dead.load = 0;

        assert!(alive > dead, "an alive, heavily loaded broker must still outrank a dead one");
    }

    #[test]
    fn lower_load_wins_among_alive_brokers() {
        let mut light = BrokerEntry::new("127.0.0.1:1".parse().unwrap());
        light.alive = true;
        light.load = 1;

        let mut heavy = BrokerEntry::new("127.0.0.1:2".parse().unwrap());
        heavy.alive = true;
        heavy.load = 5;

        assert!(light > heavy);
    }

    #[test]
    fn ordering_is_total_unlike_the_source_conjunction() {
        // Two brokers with the same liveness and same load must compare
        // equal, not "neither greater" as an `a < b && c < d` conjunction
        // would leave them.
        let mut a = BrokerEntry::new("127.0.0.1:1".parse().unwrap());
        a.alive = true;
        a.load = 3;
        let mut b = BrokerEntry::new("127.0.0.1:2".parse().unwrap());
        b.alive = true;
        b.load = 3;

        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn get_next_broker_returns_none_when_nothing_is_alive_yet() {
        let lb = LoadBalancer {
            address: "127.0.0.1:0".parse().unwrap(),
            directory: Arc::new(Mutex::new(
                vec![BrokerEntry::new("127.0.0.1:1".parse().unwrap())]
                    .into_iter()
                    .collect(),
            )),
            _probes: Vec::new(),
        };
        assert!(lb.get_next_broker().is_none());
    }

    #[test]
    fn get_next_broker_picks_the_least_loaded_alive_broker() {
        let mut a = BrokerEntry::new("127.0.0.1:1".parse().unwrap());
        a.alive = true;
        a.load = 2;
        let mut b = BrokerEntry::new("127.0.0.1:2".parse().unwrap());
        b.alive = true;
        b.load = 0;

        let lb = LoadBalancer {
            address: "127.0.0.1:0".parse().unwrap(),
            directory: Arc::new(Mutex::new(vec![a, b].into_iter().collect())),
            _probes: Vec::new(),
        };

        let chosen = lb.get_next_broker().unwrap();
        assert_eq!(chosen.address, "127.0.0.1:2".parse().unwrap());
        assert_eq!(chosen.load, 1);
    }
}
