use crate::address::{Address, AddressKind};

/// Dispatch mode carried by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastMode {
    NoAddr,
    Unicast,
    Multicast,
    Broadcast,
}

impl CastMode {
    /// Infers a cast mode from a destination address's syntactic class.
    pub fn for_destination(dest: Address) -> CastMode {
        match dest.kind() {
            AddressKind::Unicast => CastMode::Unicast,
            AddressKind::Multicast => CastMode::Multicast,
            AddressKind::Broadcast => CastMode::Broadcast,
            AddressKind::None => CastMode::NoAddr,
        }
    }
}

/// A single entry in a Join Reply's sender list: the forwarding-group
/// bookkeeping gets rewritten hop-by-hop as the reply propagates back toward
/// the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderEntry {
    pub sender_addr: Address,
    pub next_hop_addr: Address,
    pub route_expiration_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinQuery {
    pub source: Address,
    pub multicast_group: Address,
    pub previous_hop: Address,
    pub sequence_number: u32,
    pub ttl: u8,
    pub hop_count: u8,
}

impl JoinQuery {
    pub fn new(source: Address, multicast_group: Address, sequence_number: u32, default_ttl: u8) -> Self {
        JoinQuery {
            source,
            multicast_group,
            previous_hop: source,
            sequence_number,
            ttl: default_ttl,
            hop_count: 0,
        }
    }

    pub fn fingerprint(&self) -> (Address, u32) {
        (self.source, self.sequence_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReply {
    pub source: Address,
    pub multicast_group: Address,
    pub previous_hop: Address,
    pub sequence_number: u32,
    pub ack_req: bool,
    pub forward_group: bool,
    pub senders: Vec<SenderEntry>,
}

impl JoinReply {
    pub fn count(&self) -> usize {
        self.senders.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpData {
    pub source: Address,
    pub destination: Address,
    pub previous_hop: Address,
    pub ttl: u8,
    pub hops_traveled: u8,
    pub cast_mode: CastMode,
    pub payload: Vec<u8>,
    pub verbose: bool,
}

impl IpData {
    pub fn new(source: Address, destination: Address, payload: Vec<u8>, default_ttl: u8) -> Self {
        IpData {
            source,
            destination,
            previous_hop: source,
            ttl: default_ttl,
            hops_traveled: 0,
            cast_mode: CastMode::for_destination(destination),
            payload,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// The wire-level envelope: one of the three ODMRP packet kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    JoinQuery(JoinQuery),
    JoinReply(JoinReply),
    IpData(IpData),
}

impl Packet {
    pub fn cast_mode(&self) -> CastMode {
        match self {
            Packet::JoinQuery(_) => CastMode::Broadcast,
            Packet::JoinReply(_) => CastMode::Broadcast,
            Packet::IpData(d) => d.cast_mode,
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            Packet::JoinQuery(_) => crate::config::JOINQUERY_TYPE,
            Packet::JoinReply(_) => crate::config::JOINREPLY_TYPE,
            Packet::IpData(_) => crate::config::IPDATA_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn join_query_fingerprint_is_source_and_sequence() {
        let jq = JoinQuery::new(addr("10.0.0.1"), addr("224.0.0.1"), 7, 32);
        assert_eq!(jq.fingerprint(), (addr("10.0.0.1"), 7));
        assert_eq!(jq.previous_hop, addr("10.0.0.1"));
    }

    #[test]
    fn cast_mode_inferred_from_destination() {
        let d = IpData::new(addr("10.0.0.1"), addr("224.0.0.5"), vec![], 32);
        assert_eq!(d.cast_mode, CastMode::Multicast);
        let d = IpData::new(addr("10.0.0.1"), addr("10.0.0.2"), vec![], 32);
        assert_eq!(d.cast_mode, CastMode::Unicast);
        let d = IpData::new(addr("10.0.0.1"), Address::BROADCAST, vec![], 32);
        assert_eq!(d.cast_mode, CastMode::Broadcast);
    }

    #[test]
    fn packet_clone_does_not_alias() {
        let mut jq = JoinQuery::new(addr("10.0.0.1"), addr("224.0.0.1"), 1, 32);
        let original = Packet::JoinQuery(jq.clone());
        jq.ttl = 5;
        let mutated = Packet::JoinQuery(jq);
        assert_ne!(original, mutated);
    }
}
