use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::NetworkConfig;
use crate::network::Network;
use crate::odmrp::OdmrpState;
use crate::packet::{CastMode, IpData, JoinQuery, JoinReply, Packet, SenderEntry};
use crate::queue::BoundedQueue;

/// A single mesh participant.
///
/// Owns its queues and protocol state outright; neighbor links are
/// non-owning [`Address`] values resolved through the owning [`Network`]'s
/// registry at the point of use, which is what lets nodes and the network
/// reference each other without a reference cycle.
pub struct Node {
    pub ip_address: Address,
    pub multicast_source_address: Option<Address>,
    multicast_groups: RwLock<HashSet<Address>>,
    multicast_receivers: RwLock<HashSet<Address>>,
    neighbors: RwLock<Vec<Address>>,

    state: Mutex<OdmrpState>,
    join_query_next: Mutex<Option<JoinQuery>>,
    route_request_cache: RwLock<HashSet<Address>>,

    pending_send: BoundedQueue<IpData>,
    pending_receive: BoundedQueue<Packet>,
    delivered: Mutex<Vec<IpData>>,

    down: AtomicBool,
    ready: AtomicBool,
    send_turn: AtomicBool,

    config: NetworkConfig,
    network: OnceLock<Weak<Network>>,
}

impl Node {
    pub fn new(ip_address: Address, config: NetworkConfig) -> Self {
        let mut groups = HashSet::new();
        groups.insert(ip_address);
        Node {
            ip_address,
            multicast_source_address: None,
            multicast_groups: RwLock::new(groups),
            multicast_receivers: RwLock::new(HashSet::new()),
            neighbors: RwLock::new(Vec::new()),
            state: Mutex::new(OdmrpState::new(
                config.message_cache_size,
                config.route_refresh,
                config.forwarding_timeout,
            )),
            join_query_next: Mutex::new(None),
            route_request_cache: RwLock::new(HashSet::new()),
            pending_send: BoundedQueue::new(config.pending_queue_size),
            pending_receive: BoundedQueue::new(config.pending_queue_size),
            delivered: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            send_turn: AtomicBool::new(true),
            config,
            network: OnceLock::new(),
        }
    }

    pub fn with_multicast_source(mut self, addr: Address) -> Self {
        self.multicast_source_address = Some(addr);
        self
    }

    pub(crate) fn bind_network(&self, network: Weak<Network>) {
        let _ = self.network.set(network);
    }

    fn network(&self) -> Option<std::sync::Arc<Network>> {
        self.network.get().and_then(Weak::upgrade)
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_send.is_empty() || !self.pending_receive.is_empty()
    }

    /// Whether the periodic route-refresh timer is due, or a previously
    /// prepared Join Query is waiting to be sent.
    pub fn refresh_due(&self, now: Instant) -> bool {
        if self.join_query_next.lock().is_some() {
            return true;
        }
        self.multicast_source_address.is_some() && self.state.lock().is_route_refresh_needed(now)
    }

    /// The next route-refresh deadline for this node, used by the scheduler
    /// to bound its sleep between scans.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.multicast_source_address?;
        let state = self.state.lock();
        Some(state.last_route_refresh_at() + state.route_refresh_interval)
    }

    pub fn neighbors(&self) -> Vec<Address> {
        self.neighbors.read().clone()
    }

    pub fn multicast_groups(&self) -> HashSet<Address> {
        self.multicast_groups.read().clone()
    }

    pub fn multicast_receivers(&self) -> HashSet<Address> {
        self.multicast_receivers.read().clone()
    }

    /// Every `IpData` packet delivered to this node so far (destination or
    /// subscribed multicast group reached), in arrival order.
    pub fn delivered(&self) -> Vec<IpData> {
        self.delivered.lock().clone()
    }

    pub fn join_multicast_group(&self, group: Address) {
        self.multicast_groups.write().insert(group);
    }

    pub fn with_routing_table<R>(&self, f: impl FnOnce(&crate::routing::RoutingTable) -> R) -> R {
        f(&self.state.lock().routing_table)
    }

    pub fn with_forwarding_groups<R>(
        &self,
        f: impl FnOnce(&mut crate::odmrp::ForwardingGroupTable) -> R,
    ) -> R {
        f(&mut self.state.lock().forwarding_groups)
    }

    /// Adds `peer` as a neighbor of `self`, if not already present. Does not
    /// touch `peer`'s own neighbor list; [`Network::connect`] calls this on
    /// both ends to keep the link symmetric.
    pub(crate) fn add_neighbor(&self, peer: Address) {
        let mut neighbors = self.neighbors.write();
        if !neighbors.contains(&peer) {
            neighbors.push(peer);
        }
    }

    pub(crate) fn remove_neighbor(&self, peer: Address) {
        self.neighbors.write().retain(|a| *a != peer);
    }

    fn activate(&self) {
        if let Some(net) = self.network() {
            net.activate(self.ip_address);
        }
    }

    /// Queues an outgoing IP packet for origination on this node's next
    /// turn.
    pub fn send_packet(&self, packet: IpData) {
        info!(node = %self.ip_address, dest = %packet.destination, "ip packet queued for send");
        self.pending_send.push(packet);
        self.activate();
    }

    /// Delivers `packet` into this node's receive queue. Returns `false`
    /// (and drops the packet) if the node is down.
    pub fn accept(&self, packet: Packet) -> bool {
        if self.is_down() {
            debug!(node = %self.ip_address, "accept rejected: node down");
            return false;
        }
        self.pending_receive.push(packet);
        self.activate();
        true
    }

    /// Clones `packet` to every neighbor not in `except`. Returns whether at
    /// least one neighbor accepted.
    fn broadcast(&self, packet: &Packet, except: &[Address]) -> bool {
        let Some(net) = self.network() else { return false };
        let mut any = false;
        for neighbor_addr in self.neighbors() {
            if except.contains(&neighbor_addr) {
                continue;
            }
            if let Some(neighbor) = net.get_node(neighbor_addr) {
                if neighbor.accept(packet.clone()) {
                    any = true;
                }
            }
        }
        debug!(node = %self.ip_address, kind = ?packet.cast_mode(), delivered = any, "broadcast");
        any
    }

    /// Attempts to deliver `data` hop-by-hop via the routing table, pruning
    /// stale entries on failed hand-offs and retrying with the next-best
    /// route until one succeeds or none remain.
    fn route_packet(&self, data: IpData) -> bool {
        loop {
            let route = self.with_routing_table(|t| t.route_for_destination(data.destination));
            let Some(route) = route else { return false };
            let Some(net) = self.network() else { return false };
            match net.get_node(route.next_hop) {
                Some(neighbor) if neighbor.accept(Packet::IpData(data.clone())) => return true,
                _ => {
                    self.state
                        .lock()
                        .routing_table
                        .remove_entry(route.destination, route.next_hop);
                    warn!(
                        node = %self.ip_address,
                        dest = %data.destination,
                        next_hop = %route.next_hop,
                        "route failed, pruning entry"
                    );
                }
            }
        }
    }

    fn prepare_join_query(&self, target: Address) -> JoinQuery {
        let seq = self.state.lock().next_sequence_number();
        JoinQuery::new(self.ip_address, target, seq, self.config.default_ttl)
    }

    fn prepare_join_reply(&self, group: Address, sources: &[Address]) -> JoinReply {
        let seq = self.state.lock().next_sequence_number();
        let senders = {
            let state = self.state.lock();
            sources
                .iter()
                .filter_map(|addr| {
                    state
                        .routing_table
                        .route_for_destination(*addr)
                        .map(|route| SenderEntry {
                            sender_addr: *addr,
                            next_hop_addr: route.next_hop,
                            route_expiration_time: 0,
                        })
                })
                .collect()
        };
        JoinReply {
            source: self.ip_address,
            multicast_group: group,
            previous_hop: self.ip_address,
            sequence_number: seq,
            ack_req: false,
            forward_group: false,
            senders,
        }
    }

    /// Performs exactly one protocol-level operation: emit a due Join Query
    /// (P1), originate one pending send (P2), or consume one pending
    /// receive (P3). Returns whether an operation actually ran.
    pub fn process(&self) -> bool {
        let now = Instant::now();
        let did_work = self.try_emit_join_query(now)
            || self.try_originate_send()
            || self.try_consume_receive();

        self.send_turn.fetch_xor(true, Ordering::SeqCst);

        if !self.pending_send.is_empty() || !self.pending_receive.is_empty() {
            self.activate();
        }
        did_work
    }

    fn try_emit_join_query(&self, now: Instant) -> bool {
        let pending = self.join_query_next.lock().take();
        let refresh_due = self.state.lock().is_route_refresh_needed(now);

        let query = match pending {
            Some(q) => Some(q),
            None if refresh_due && self.multicast_source_address.is_some() => {
                Some(self.prepare_join_query(self.multicast_source_address.unwrap()))
            }
            None => None,
        };

        let Some(query) = query else { return false };

        {
            let mut state = self.state.lock();
            state.message_cache.add_entry(query.fingerprint());
            state.reset_last_route_refresh(now);
        }
        info!(node = %self.ip_address, group = %query.multicast_group, seq = query.sequence_number, "originating join query");
        self.broadcast(&Packet::JoinQuery(query), &[]);
        true
    }

    fn try_originate_send(&self) -> bool {
        let receive_has_priority = !self.pending_receive.is_empty() && !self.send_turn.load(Ordering::SeqCst);
        if self.pending_send.is_empty() || receive_has_priority {
            return false;
        }
        let Some(mut packet) = self.pending_send.pop() else { return false };

        match packet.cast_mode {
            CastMode::Broadcast | CastMode::Multicast => {
                packet.hops_traveled = 1;
                packet.previous_hop = self.ip_address;
                self.broadcast(&Packet::IpData(packet), &[]);
            }
            CastMode::Unicast | CastMode::NoAddr => {
                let mut attempt = packet.clone();
                attempt.hops_traveled = 1;
                attempt.previous_hop = self.ip_address;
                if self.route_packet(attempt) {
                    self.route_request_cache.write().remove(&packet.destination);
                } else {
                    let already_pending = self.route_request_cache.read().contains(&packet.destination);
                    if !already_pending {
                        warn!(node = %self.ip_address, dest = %packet.destination, "no route, scheduling join query");
                        let query = self.prepare_join_query(packet.destination);
                        *self.join_query_next.lock() = Some(query);
                        self.route_request_cache.write().insert(packet.destination);
                    }
                    // Either a discovery is already outstanding, or one was
                    // just scheduled: hold the packet for a later turn.
                    self.pending_send.push(packet);
                }
            }
        }
        true
    }

    fn try_consume_receive(&self) -> bool {
        let Some(packet) = self.pending_receive.pop() else { return false };
        match packet {
            Packet::JoinQuery(jq) => self.handle_join_query(jq),
            Packet::JoinReply(jr) => self.handle_join_reply(jr),
            Packet::IpData(data) => self.handle_ip_data(data),
        }
        true
    }

    fn handle_join_query(&self, mut jq: JoinQuery) {
        let fp = jq.fingerprint();
        let already_seen = {
            let mut state = self.state.lock();
            if state.message_cache.contains(&fp) {
                true
            } else {
                state.message_cache.add_entry(fp);
                state
                    .routing_table
                    .add(jq.source, jq.previous_hop, jq.hop_count as u32 + 1);
                false
            }
        };
        if already_seen {
            debug!(node = %self.ip_address, source = %jq.source, seq = jq.sequence_number, "duplicate join query dropped");
            return;
        }

        // `multicast_groups` always contains our own address (see `new`),
        // so this also covers unicast route discovery queries.
        let we_are_target = self.multicast_groups.read().contains(&jq.multicast_group);
        if we_are_target {
            info!(node = %self.ip_address, group = %jq.multicast_group, "replying to join query");
            let reply = self.prepare_join_reply(jq.multicast_group, &[jq.source]);
            self.broadcast(&Packet::JoinReply(reply), &[]);
        }

        let arrived_from = jq.previous_hop;
        jq.hop_count += 1;
        if jq.ttl > 1 {
            jq.ttl -= 1;
            jq.previous_hop = self.ip_address;
            self.broadcast(&Packet::JoinQuery(jq), &[arrived_from]);
        }
    }

    fn handle_join_reply(&self, mut jr: JoinReply) {
        self.state
            .lock()
            .routing_table
            .add(jr.source, jr.previous_hop, 1);

        let mut i = 0;
        while i < jr.senders.len() {
            let not_for_me = jr.senders[i].next_hop_addr != self.ip_address;
            let arrived_at_origin = jr.senders[i].sender_addr == self.ip_address;
            if not_for_me || arrived_at_origin {
                if arrived_at_origin {
                    self.multicast_receivers.write().insert(jr.source);
                }
                jr.senders.remove(i);
                continue;
            }
            let rewritten = self
                .state
                .lock()
                .routing_table
                .route_for_destination(jr.senders[i].sender_addr);
            match rewritten {
                Some(route) => {
                    jr.senders[i].next_hop_addr = route.next_hop;
                    i += 1;
                }
                None => {
                    jr.senders.remove(i);
                }
            }
        }

        if jr.senders.is_empty() {
            debug!(node = %self.ip_address, group = %jr.multicast_group, "join reply has no remaining senders, dropping");
            return;
        }

        let arrived_from = jr.previous_hop;
        self.state
            .lock()
            .forwarding_groups
            .add_group(jr.multicast_group, Instant::now());
        jr.previous_hop = self.ip_address;
        info!(node = %self.ip_address, group = %jr.multicast_group, "forwarding join reply");
        self.broadcast(&Packet::JoinReply(jr), &[arrived_from]);
    }

    fn handle_ip_data(&self, mut data: IpData) {
        let for_us = data.destination == self.ip_address
            || self.multicast_groups.read().contains(&data.destination);
        if for_us {
            info!(node = %self.ip_address, source = %data.source, hops = data.hops_traveled, "ip data delivered");
            self.delivered.lock().push(data);
            return;
        }
        if data.ttl <= 1 {
            debug!(node = %self.ip_address, "ip data dropped: ttl expired");
            return;
        }
        let arrived_from = data.previous_hop;
        data.ttl -= 1;
        data.hops_traveled += 1;
        data.previous_hop = self.ip_address;

        match data.cast_mode {
            CastMode::Unicast | CastMode::NoAddr => {
                if !self.route_packet(data.clone()) {
                    warn!(node = %self.ip_address, dest = %data.destination, "ip data dropped: no route");
                }
            }
            CastMode::Broadcast => {
                self.broadcast(&Packet::IpData(data), &[arrived_from]);
            }
            CastMode::Multicast => {
                let live = self
                    .state
                    .lock()
                    .forwarding_groups
                    .group_entry(data.destination, Instant::now(), self.config.forwarding_timeout, true)
                    .is_some();
                if live {
                    self.broadcast(&Packet::IpData(data), &[arrived_from]);
                } else {
                    debug!(node = %self.ip_address, group = %data.destination, "multicast data dropped: no live forwarding group");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use std::sync::Arc;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn line_topology() -> Arc<Network> {
        let net = Network::new(NetworkConfig::default());
        for ip in ["192.168.0.101", "192.168.0.100", "192.168.0.102", "192.168.0.103", "192.168.0.104"] {
            net.add_node(addr(ip), None, &[]).unwrap();
        }
        net.connect(addr("192.168.0.101"), addr("192.168.0.100")).unwrap();
        net.connect(addr("192.168.0.100"), addr("192.168.0.102")).unwrap();
        net.connect(addr("192.168.0.102"), addr("192.168.0.103")).unwrap();
        net.connect(addr("192.168.0.103"), addr("192.168.0.104")).unwrap();
        net
    }

    #[test]
    fn neighbors_are_symmetric() {
        let net = line_topology();
        let a = net.get_node(addr("192.168.0.101")).unwrap();
        let b = net.get_node(addr("192.168.0.100")).unwrap();
        assert!(a.neighbors().contains(&addr("192.168.0.100")));
        assert!(b.neighbors().contains(&addr("192.168.0.101")));
    }

    #[test]
    fn join_query_builds_reverse_route() {
        let net = line_topology();
        net.get_node(addr("192.168.0.100"))
            .unwrap()
            .join_multicast_group(addr("224.0.0.1"));
        let b = net.get_node(addr("192.168.0.100")).unwrap();
        let query = b.prepare_join_query(addr("224.0.0.1"));
        b.state.lock().message_cache.add_entry(query.fingerprint());
        b.broadcast(&Packet::JoinQuery(query), &[]);

        for _ in 0..20 {
            net.drain_once();
        }

        let a = net.get_node(addr("192.168.0.101")).unwrap();
        assert!(a
            .with_routing_table(|t| t.route_for_destination(addr("192.168.0.100")))
            .is_some());
    }

    #[test]
    fn process_performs_at_most_one_operation() {
        let net = line_topology();
        let a = net.get_node(addr("192.168.0.101")).unwrap();
        a.send_packet(IpData::new(
            addr("192.168.0.101"),
            addr("192.168.0.104"),
            b"hi".to_vec(),
            16,
        ));
        // One call to process() should not fully resolve a multi-hop flow.
        let did = a.process();
        assert!(did);
    }
}
