//! Interactive control surface for the ODMRP mesh simulator.
//!
//! Reads whitespace-tokenized commands from stdin and drives an
//! `odmrp_core::Network` running on a background scheduler thread. Holds no
//! protocol logic of its own: parsing, help text, and table rendering live
//! here, everything else is a call into `odmrp-core`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use odmrp_core::{Address, IpData, Network, NetworkConfig};

/// One line of REPL input, parsed the same way argv would be.
#[derive(Parser)]
#[command(name = "odmrp", no_binary_name = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a node.
    #[command(visible_alias = "a")]
    Add {
        #[arg(long = "ip")]
        ip: String,
        #[arg(long = "ms")]
        multicast_source: Option<String>,
        #[arg(long = "mg")]
        multicast_groups: Vec<String>,
        #[arg(long = "n")]
        neighbors: Vec<String>,
    },
    /// Remove a node and disconnect it from all neighbors.
    Remove { ip: String },
    /// Connect a node to one or more peers (symmetric).
    #[command(visible_alias = "c")]
    Connect { node: String, peers: Vec<String> },
    /// Dump one node's protocol state.
    #[command(visible_alias = "q")]
    Query { ip: String },
    /// List every node and its neighbors.
    #[command(visible_alias = "l")]
    List,
    /// Originate an IP packet.
    #[command(visible_alias = "s")]
    Send {
        #[arg(short = 'v', long)]
        verbose: bool,
        src: String,
        dst: String,
        payload: Vec<String>,
    },
    /// Look up a node's next hop toward a destination.
    #[command(visible_alias = "ro")]
    Route { src: String, dst: String },
    /// Print command help.
    #[command(visible_alias = "h")]
    Help,
    /// Shut down the scheduler and exit.
    #[command(visible_alias = "e")]
    Exit,
}

fn parse_addr(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .with_context(|| format!("'{s}' is not a valid address"))
}

fn cmd_add(
    network: &Network,
    ip: String,
    multicast_source: Option<String>,
    multicast_groups: Vec<String>,
    neighbors: Vec<String>,
) -> Result<()> {
    let ip = parse_addr(&ip)?;
    let ms = multicast_source.map(|s| parse_addr(&s)).transpose()?;
    let groups = multicast_groups
        .iter()
        .map(|s| parse_addr(s))
        .collect::<Result<Vec<_>>>()?;
    network.add_node(ip, ms, &groups)?;
    for n in neighbors {
        let peer = parse_addr(&n)?;
        network.connect(ip, peer)?;
    }
    println!("added {ip}");
    Ok(())
}

fn cmd_remove(network: &Network, ip: String) -> Result<()> {
    let ip = parse_addr(&ip)?;
    network.remove_node(ip)?;
    println!("removed {ip}");
    Ok(())
}

fn cmd_connect(network: &Network, node: String, peers: Vec<String>) -> Result<()> {
    let node = parse_addr(&node)?;
    for p in peers {
        let peer = parse_addr(&p)?;
        network.connect(node, peer)?;
        println!("{node} <-> {peer}");
    }
    Ok(())
}

fn cmd_query(network: &Network, ip: String) -> Result<()> {
    let ip = parse_addr(&ip)?;
    let node = network
        .get_node(ip)
        .ok_or_else(|| anyhow::anyhow!("no such node: {ip}"))?;
    println!("node {ip}");
    println!("  down: {}", node.is_down());
    println!("  neighbors: {:?}", node.neighbors());
    println!("  multicast groups: {:?}", node.multicast_groups());
    println!("  multicast receivers: {:?}", node.multicast_receivers());
    node.with_routing_table(|t| {
        println!("  routing table:");
        for entry in t.all() {
            println!(
                "    {} via {} (cost {})",
                entry.destination, entry.next_hop, entry.cost
            );
        }
    });
    Ok(())
}

fn cmd_list(network: &Network) {
    for ip in network.node_addresses() {
        if let Some(node) = network.get_node(ip) {
            println!("{ip}: {:?}", node.neighbors());
        }
    }
}

fn cmd_send(network: &Network, verbose: bool, src: String, dst: String, payload: Vec<String>) -> Result<()> {
    let src = parse_addr(&src)?;
    let dst = parse_addr(&dst)?;
    let node = network
        .get_node(src)
        .ok_or_else(|| anyhow::anyhow!("no such node: {src}"))?;
    let bytes = payload.join(" ").into_bytes();
    let default_ttl = network.config().default_ttl;
    let packet = IpData::new(src, dst, bytes, default_ttl).with_verbose(verbose);
    node.send_packet(packet);
    println!("queued send {src} -> {dst}");
    Ok(())
}

fn cmd_route(network: &Network, src: String, dst: String) -> Result<()> {
    let src = parse_addr(&src)?;
    let dst = parse_addr(&dst)?;
    let node = network
        .get_node(src)
        .ok_or_else(|| anyhow::anyhow!("no such node: {src}"))?;
    match node.with_routing_table(|t| t.route_for_destination(dst)) {
        Some(route) => println!("{dst} via {} (cost {})", route.next_hop, route.cost),
        None => println!("no route to {dst}"),
    }
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  add/a -ip IP [-ms IP] [-mg IP]... [-n IP]...    create a node");
    println!("  remove IP                                       remove a node");
    println!("  connect/c NODE PEER...                          connect node to peers");
    println!("  query/q IP                                      dump node state");
    println!("  list/l                                          list nodes");
    println!("  send/s [-v] SRC DST [payload...]                originate ip data");
    println!("  route/ro SRC DST                                look up a route");
    println!("  help/h                                          this text");
    println!("  exit/e                                          shut down");
}

fn run_repl(network: Arc<Network>) -> Result<()> {
    let stdin = io::stdin();
    print!("odmrp> ");
    io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            print!("odmrp> ");
            io::stdout().flush().ok();
            continue;
        }
        match Line::try_parse_from(tokens) {
            Ok(parsed) => {
                let result = match parsed.command {
                    Command::Add {
                        ip,
                        multicast_source,
                        multicast_groups,
                        neighbors,
                    } => cmd_add(&network, ip, multicast_source, multicast_groups, neighbors),
                    Command::Remove { ip } => cmd_remove(&network, ip),
                    Command::Connect { node, peers } => cmd_connect(&network, node, peers),
                    Command::Query { ip } => cmd_query(&network, ip),
                    Command::List => {
                        cmd_list(&network);
                        Ok(())
                    }
                    Command::Send {
                        verbose,
                        src,
                        dst,
                        payload,
                    } => cmd_send(&network, verbose, src, dst, payload),
                    Command::Route { src, dst } => cmd_route(&network, src, dst),
                    Command::Help => {
                        print_help();
                        Ok(())
                    }
                    Command::Exit => {
                        network.request_shutdown();
                        println!("shutting down");
                        return Ok(());
                    }
                };
                if let Err(e) = result {
                    println!("error: {e}");
                }
            }
            Err(e) => {
                println!("{e}");
            }
        }
        print!("odmrp> ");
        io::stdout().flush().ok();
    }
    network.request_shutdown();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let network = Network::new(NetworkConfig::default());
    let scheduler_net = network.clone();
    let worker = thread::spawn(move || {
        scheduler_net.run();
    });

    info!("odmrp scheduler started");
    let result = run_repl(network);
    worker.join().expect("scheduler thread panicked");
    result
}
