//! # ODMRP Mesh Simulator Core
//!
//! A discrete-event simulator of the On-Demand Multicast Routing Protocol
//! (ODMRP): a set of stationary nodes on a static neighbor graph, a
//! flooding Join Query / reverse-path Join Reply mesh-construction
//! handshake, and a cooperative scheduler that advances every node exactly
//! one protocol operation at a time.
//!
//! ## Layout
//!
//! - **[`address`]**: IPv4 address parsing and unicast/multicast/broadcast
//!   classification.
//! - **[`packet`]**: the `JoinQuery` → `JoinReply` → `IpData` packet model.
//! - **[`routing`]**: the multi-next-hop unicast routing table.
//! - **[`odmrp`]**: per-node protocol state: message cache, forwarding-group
//!   soft state, route-refresh timer, sequence counter.
//! - **[`node`]**: a mesh participant and its one-operation-per-call protocol
//!   step function.
//! - **[`network`]**: the scheduler: owns every node and drives the worker
//!   loop.
//! - **[`config`]**: tunable constants.
//! - **[`error`]**: the error taxonomy shared across the crate.

pub mod address;
pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod odmrp;
pub mod packet;
pub mod queue;
pub mod routing;

pub use address::{Address, AddressKind};
pub use config::NetworkConfig;
pub use error::{OdmrpError, OdmrpResult};
pub use network::Network;
pub use node::Node;
pub use packet::{CastMode, IpData, JoinQuery, JoinReply, Packet, SenderEntry};
pub use routing::{RoutingEntry, RoutingTable};
