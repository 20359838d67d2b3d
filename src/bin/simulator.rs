//! AODV mesh simulator
//!
//! Places a set of nodes at random coordinates, derives a TCP mesh from
//! reachability and residual power, and runs one season of route discovery
//! and delivery to a chosen destination.

use aodv_mesh::agent::DeliveryOutcome;
use aodv_mesh::config::PLACEMENT_RANGE;
use aodv_mesh::coordinate::Coordinate;
use aodv_mesh::identity::NodeId;
use aodv_mesh::network::Network;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone)]
struct SimConfig {
    num_nodes: usize,
    base_port: u16,
    seed: u64,
    dest_index: usize,
    payload: String,
    export_path: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_nodes: 8,
            base_port: 9000,
            seed: 42,
            dest_index: 0,
            payload: "PING".to_string(),
            export_path: None,
        }
    }
}

fn generate_placements(config: &SimConfig) -> Vec<(SocketAddr, Coordinate)> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    (0..config.num_nodes)
        .map(|i| {
            let addr = SocketAddr::from(([127, 0, 0, 1], config.base_port + i as u16));
            let x = rng.gen_range(PLACEMENT_RANGE) as f64;
            let y = rng.gen_range(PLACEMENT_RANGE) as f64;
            (addr, Coordinate::new(x, y))
        })
        .collect()
}

fn print_help() {
    println!("Usage: simulator [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -n, --nodes NUM       Number of nodes (default: 8)");
    println!("      --base-port NUM   First node's TCP port (default: 9000)");
    println!("      --seed NUM        Random placement seed (default: 42)");
    println!("      --dest NUM        Index of the destination node (default: 0)");
    println!("      --payload TEXT    USER payload every other node sends (default: PING)");
    println!("      --export PATH     Write per-node stats as JSON to PATH");
    println!("  -h, --help            Show this help");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = SimConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--nodes" | "-n" => {
                if i + 1 < args.len() {
                    config.num_nodes = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--base-port" => {
                if i + 1 < args.len() {
                    config.base_port = args[i + 1].parse().unwrap_or(9000);
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    config.seed = args[i + 1].parse().unwrap_or(42);
                    i += 1;
                }
            }
            "--dest" => {
                if i + 1 < args.len() {
                    config.dest_index = args[i + 1].parse().unwrap_or(0);
                    i += 1;
                }
            }
            "--payload" => {
                if i + 1 < args.len() {
                    config.payload = args[i + 1].clone();
                    i += 1;
                }
            }
            "--export" => {
                if i + 1 < args.len() {
                    config.export_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("AODV mesh simulator");
    println!("====================\n");
    println!("Configuration:");
    println!("  Nodes:       {}", config.num_nodes);
    println!("  Base port:   {}", config.base_port);
    println!("  Seed:        {}", config.seed);
    println!("  Destination: node {}", config.dest_index);
    println!("  Payload:     {:?}", config.payload);
    println!();

    let placements = generate_placements(&config);
    let dest_id = NodeId::new(placements[config.dest_index.min(placements.len() - 1)].0.to_string());

    print!("Spawning {} agents... ", config.num_nodes);
    let spawn_start = Instant::now();
    let network = Network::new(placements).await?;
    println!("done ({} ms)", spawn_start.elapsed().as_millis());

    print!("Deriving link topology... ");
    let topo_start = Instant::now();
    network.init_neighbor().await?;
    println!("done ({} ms)", topo_start.elapsed().as_millis());

    print!("Running season toward {}... ", dest_id);
    let season_start = Instant::now();
    let outcomes = network.start_season(dest_id.clone(), config.payload.clone()).await?;
    println!("done ({} ms)\n", season_start.elapsed().as_millis());

    let delivered = outcomes.values().filter(|o| matches!(o, DeliveryOutcome::Delivered)).count();
    let queued = outcomes.len() - delivered;
    println!("=== Season Results ===");
    println!("Senders:   {}", outcomes.len());
    println!("Delivered: {delivered}");
    println!("Queued:    {queued}");

    if let Some(path) = &config.export_path {
        network.export_stats_json(path).await?;
        println!("\nWrote per-node stats to {path}");
    }

    network.shutdown().await;
    Ok(())
}
