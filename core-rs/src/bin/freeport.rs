//! freeport - lease ports from the command line
//!
//! Useful for shell-driven test suites that need a few ports which no
//! other freeport user on the host will hand out at the same time.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use freeport::{PoolConfig, PortPool, Protocol};
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "freeport")]
#[command(version)]
#[command(about = "Lease free ports from a shared block", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to FREEPORT_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log block selection and leases to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lease ports and print them
    Take {
        /// Number of ports
        #[arg(allow_negative_numbers = true)]
        count: i64,
        /// Keep the lease until Ctrl+C
        #[arg(long)]
        hold: bool,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show pool counters
    Stats {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether a port can be bound right now
    Probe {
        port: u16,
        /// Probe UDP instead of TCP
        #[arg(long)]
        udp: bool,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PoolConfig> {
    match path {
        Some(path) => {
            PoolConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(PoolConfig::from_env()),
    }
}

fn handle_take(pool: &PortPool, count: i64, hold: bool, json: bool) -> anyhow::Result<()> {
    let ports = pool.take(count)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "ports": ports }))?);
    } else {
        let list: Vec<String> = ports.iter().map(u16::to_string).collect();
        println!("{}", list.join(" "));
    }

    if hold {
        let (tx, rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })?;

        eprintln!(
            "{} holding {} port(s), press Ctrl+C to release",
            "[freeport]".cyan(),
            ports.len()
        );
        let _ = rx.recv();
        pool.return_ports(&ports);
        eprintln!("{} released", "[freeport]".cyan());
    }

    Ok(())
}

fn handle_stats(pool: &PortPool, json: bool) -> anyhow::Result<()> {
    let stats = pool.stats()?;
    let block = pool.block()?;

    if json {
        let report = json!({ "block": block, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", "Block:".bold(), block);
    println!("  total   {}", stats.total);
    println!("  free    {}", stats.free.to_string().green());
    println!("  pending {}", stats.pending.to_string().yellow());
    println!("  taken   {}", stats.taken.to_string().red());
    Ok(())
}

fn handle_probe(port: u16, udp: bool) -> anyhow::Result<()> {
    let protocol = if udp { Protocol::Udp } else { Protocol::Tcp };

    if protocol.probe().is_free(port) {
        println!("{} {}/{} is free", "✓".green(), port, protocol);
        Ok(())
    } else {
        bail!("{}/{} is in use", port, protocol)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Take { count, hold, json } => {
            let pool = PortPool::new(config);
            handle_take(&pool, count, hold, json)?;
        }
        Commands::Stats { json } => {
            let pool = PortPool::new(config);
            handle_stats(&pool, json)?;
        }
        Commands::Probe { port, udp } => {
            handle_probe(port, udp)?;
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
