//! # Facade Benchmark Harness
//!
//! Purpose: Drive a live memcached deployment through the facade client from
//! several worker threads, exercising per-thread handle reuse under load.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Keys are preformatted per worker so runs
//!    are comparable over time.
//! 2. **Thread-Affine Hot Path**: All workers share one client value; each
//!    thread still talks to its own backend handle.
//! 3. **Fail Fast**: A missing backend is reported before spawning workers,
//!    not as a stream of zero-result operations.

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use tmc_client::{MemClient, ServerConfig};

const DEFAULT_SERVERS: &str = "127.0.0.1:11211";
const DEFAULT_THREADS: usize = 4;
const DEFAULT_OPS_PER_THREAD: usize = 10_000;
const DEFAULT_VALUE_SIZE: usize = 128;
const KEYSPACE_PER_THREAD: usize = 1024;

struct BenchConfig {
    servers: String,
    threads: usize,
    ops_per_thread: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let servers = args.next().unwrap_or_else(|| DEFAULT_SERVERS.to_string());
        let threads = parse_usize(args.next(), DEFAULT_THREADS).max(1);
        let ops_per_thread = parse_usize(args.next(), DEFAULT_OPS_PER_THREAD);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        BenchConfig {
            servers,
            threads,
            ops_per_thread,
            value_size,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("tmc-bench failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BenchConfig::from_args();
    let client = Arc::new(MemClient::new(ServerConfig::detect(
        config.servers.as_str(),
    )));

    // Probe the main thread's handle first so a dead deployment fails with a
    // clear message instead of a run full of zero results.
    client
        .handle_id()
        .context("unable to create a backend handle; is memcached reachable?")?;

    tracing::info!(
        servers = %config.servers,
        threads = config.threads,
        ops_per_thread = config.ops_per_thread,
        value_size = config.value_size,
        "starting benchmark"
    );

    let payload = vec![0x5Au8; config.value_size];
    let start = Instant::now();

    let mut workers = Vec::with_capacity(config.threads);
    for worker in 0..config.threads {
        let client = Arc::clone(&client);
        let payload = payload.clone();
        let ops = config.ops_per_thread;
        workers.push(thread::spawn(move || {
            let mut hits = 0usize;
            for op in 0..ops {
                let key = format!("tmc:bench:{worker}:{}", op % KEYSPACE_PER_THREAD);
                client.set(&key, &payload, 60, 0);
                if client.get(&key).is_some() {
                    hits += 1;
                }
            }
            hits
        }));
    }

    let mut hits = 0usize;
    for worker in workers {
        hits += worker
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }

    let elapsed = start.elapsed();
    let total_ops = config.threads * config.ops_per_thread * 2;
    let secs = elapsed.as_secs_f64();
    println!(
        "{total_ops} ops in {secs:.3}s ({:.0} ops/s), {hits}/{} gets hit",
        (total_ops as f64) / secs,
        config.threads * config.ops_per_thread
    );

    Ok(())
}
