use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::address::Address;
use crate::config::NetworkConfig;
use crate::error::{OdmrpError, OdmrpResult};
use crate::node::Node;

/// Owns every [`Node`] and drives the single worker loop that advances
/// logical time: scan for due nodes, drain the activation queue, sleep
/// until the next deadline or the next external nudge.
pub struct Network {
    nodes: RwLock<HashMap<Address, Arc<Node>>>,
    config: NetworkConfig,
    activation_tx: Sender<Address>,
    activation_rx: Receiver<Address>,
    shutdown: AtomicBool,
    self_ref: std::sync::OnceLock<std::sync::Weak<Network>>,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Arc<Self> {
        let (tx, rx) = unbounded();
        let net = Arc::new(Network {
            nodes: RwLock::new(HashMap::new()),
            config,
            activation_tx: tx,
            activation_rx: rx,
            shutdown: AtomicBool::new(false),
            self_ref: std::sync::OnceLock::new(),
        });
        let _ = net.self_ref.set(Arc::downgrade(&net));
        net
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn weak_self(&self) -> std::sync::Weak<Network> {
        self.self_ref
            .get()
            .cloned()
            .unwrap_or_default()
    }

    /// Creates a node with the given IP and registers it, optionally
    /// setting its multicast source address and initial group memberships.
    /// Fails if the IP is already taken. Neighbor wiring is the caller's
    /// job (via [`Network::connect`]) so that both ends of each link stay
    /// consistent even when the peer is added later.
    pub fn add_node(
        &self,
        ip: Address,
        multicast_source: Option<Address>,
        groups: &[Address],
    ) -> OdmrpResult<Arc<Node>> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&ip) {
            return Err(OdmrpError::NodeConnect(format!("node {ip} already exists")));
        }
        let mut node = Node::new(ip, self.config.clone());
        if let Some(src) = multicast_source {
            node = node.with_multicast_source(src);
        }
        let node = Arc::new(node);
        node.bind_network(self.weak_self());
        for group in groups {
            node.join_multicast_group(*group);
        }
        nodes.insert(ip, node.clone());
        info!(node = %ip, "node added");
        Ok(node)
    }

    pub fn get_node(&self, ip: Address) -> Option<Arc<Node>> {
        self.nodes.read().get(&ip).cloned()
    }

    pub fn node_addresses(&self) -> Vec<Address> {
        self.nodes.read().keys().copied().collect()
    }

    /// Disconnects `ip` from every neighbor and removes it from the
    /// registry.
    pub fn remove_node(&self, ip: Address) -> OdmrpResult<()> {
        let neighbors = self
            .get_node(ip)
            .ok_or(OdmrpError::NotFound(ip))?
            .neighbors();
        for n in neighbors {
            self.disconnect(ip, n)?;
        }
        self.nodes.write().remove(&ip);
        info!(node = %ip, "node removed");
        Ok(())
    }

    pub fn connect(&self, a: Address, b: Address) -> OdmrpResult<()> {
        if a == b {
            return Err(OdmrpError::NodeConnect(format!("{a} cannot connect to itself")));
        }
        let node_a = self.get_node(a).ok_or(OdmrpError::NotFound(a))?;
        let node_b = self.get_node(b).ok_or(OdmrpError::NotFound(b))?;
        node_a.add_neighbor(b);
        node_b.add_neighbor(a);
        debug!(a = %a, b = %b, "connected");
        Ok(())
    }

    pub fn disconnect(&self, a: Address, b: Address) -> OdmrpResult<()> {
        let node_a = self.get_node(a).ok_or(OdmrpError::NotFound(a))?;
        let node_b = self.get_node(b).ok_or(OdmrpError::NotFound(b))?;
        node_a.remove_neighbor(b);
        node_b.remove_neighbor(a);
        debug!(a = %a, b = %b, "disconnected");
        Ok(())
    }

    /// Pushes `ip` onto the activation queue; called by a node whenever it
    /// gains work (queued send, accepted receive) and does not have its own
    /// thread.
    pub(crate) fn activate(&self, ip: Address) {
        let _ = self.activation_tx.send(ip);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the worker if it's blocked on recv_timeout.
        let _ = self.activation_tx.send(Address::from_octets([0, 0, 0, 0]));
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Scans every node for due work (periodic refresh or non-empty queues)
    /// and activates it. Returns the earliest deadline observed, used by the
    /// caller to bound the next sleep.
    fn scan_due_nodes(&self, now: Instant) -> Option<Instant> {
        let mut next_wake = None;
        for node in self.nodes.read().values() {
            if node.is_down() {
                continue;
            }
            let has_pending = node.has_pending();
            let refresh_due = node.refresh_due(now);
            if has_pending || refresh_due {
                self.activate(node.ip_address);
            }
            if let Some(deadline) = node.next_deadline() {
                next_wake = Some(match next_wake {
                    Some(w) if w < deadline => w,
                    _ => deadline,
                });
            }
        }
        next_wake
    }

    /// Drains the activation queue once, calling `process()` on each
    /// activated node until the queue is empty. A node may re-enqueue
    /// itself; such re-entries are served within the same drain if they
    /// arrive before it empties.
    pub fn drain_once(&self) -> usize {
        let mut processed = 0;
        while let Ok(ip) = self.activation_rx.try_recv() {
            if let Some(node) = self.get_node(ip) {
                if node.process() {
                    processed += 1;
                }
            }
        }
        processed
    }

    /// Runs the worker loop until [`Network::request_shutdown`] is called.
    /// Intended to run on a dedicated thread owned by the caller (the
    /// control surface).
    pub fn run(&self) {
        info!("scheduler worker starting");
        while !self.is_shutting_down() {
            let now = Instant::now();
            let next_wake = self.scan_due_nodes(now);
            self.drain_once();

            if self.activation_rx.is_empty() {
                let wait = next_wake
                    .map(|w| w.saturating_duration_since(Instant::now()))
                    .unwrap_or(self.config.tick_interval)
                    .max(Duration::from_millis(1));
                match self.activation_rx.recv_timeout(wait) {
                    Ok(ip) => {
                        if let Some(node) = self.get_node(ip) {
                            node.process();
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        info!("scheduler worker stopped");
    }

    /// Advances the simulation by running scan + drain exactly `ticks`
    /// times, without blocking. Intended for tests and for the control
    /// surface's non-interactive `step` use.
    pub fn tick_n(&self, ticks: usize) {
        for _ in 0..ticks {
            let now = Instant::now();
            self.scan_due_nodes(now);
            self.drain_once();
        }
    }
}
