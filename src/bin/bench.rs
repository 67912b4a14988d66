//! ZoneKV Benchmark Binary
//!
//! Preloads a store, then runs concurrent workers with a mixed
//! read/write workload and reports throughput, latency and store metrics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing_subscriber::{fmt, EnvFilter};
use zonekv::{Store, StoreConfig};

/// ZoneKV Benchmark
#[derive(Parser, Debug)]
#[command(name = "zonekv-bench")]
#[command(about = "Mixed read/write benchmark for a ZoneKV store")]
#[command(version)]
struct Args {
    /// Device file (created if missing, removed afterwards unless --keep)
    #[arg(short, long, default_value = "./zonekv_bench.dev")]
    device: PathBuf,

    /// Device capacity in MB
    #[arg(long, default_value = "1024")]
    device_capacity_mb: u64,

    /// Zone capacity in MB
    #[arg(long, default_value = "64")]
    zone_capacity_mb: u64,

    /// Key size in bytes
    #[arg(long, default_value = "10")]
    key_sz: usize,

    /// Value size in bytes
    #[arg(long, default_value = "102400")]
    value_sz: usize,

    /// Data written before the measured run, in MB
    #[arg(long, default_value = "256")]
    preload_mb: u64,

    /// Data written during the measured run, in MB
    #[arg(long, default_value = "512")]
    write_mb: u64,

    /// Percent of operations that are reads
    #[arg(long, default_value = "10")]
    read_ratio: u32,

    /// Client threads
    #[arg(short, long, default_value = "2")]
    workers: usize,

    /// Keep the device file after the run
    #[arg(long)]
    keep: bool,
}

/// Per-worker latency samples in microseconds
#[derive(Default)]
struct Latencies {
    writes: Vec<u64>,
    reads: Vec<u64>,
}

fn random_key(rng: &mut impl Rng, len: usize) -> Bytes {
    let key: Vec<u8> = rng.sample_iter(&Alphanumeric).take(len).collect();
    Bytes::from(key)
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[rank]
}

fn report(name: &str, mut samples: Vec<u64>) {
    if samples.is_empty() {
        return;
    }
    samples.sort_unstable();
    let avg = samples.iter().sum::<u64>() / samples.len() as u64;
    tracing::info!(
        ops = samples.len(),
        avg_us = avg,
        p50_us = percentile(&samples, 0.50),
        p99_us = percentile(&samples, 0.99),
        max_us = percentile(&samples, 1.0),
        "{} latency",
        name
    );
}

fn preload(store: &Store, args: &Args) -> zonekv::Result<()> {
    let target = args.preload_mb << 20;
    if target == 0 {
        tracing::info!("Skip preload");
        return Ok(());
    }

    let mut rng = rand::thread_rng();
    let value = Bytes::from(vec![b'p'; args.value_sz]);
    let mut written = 0u64;
    let mut last_report = Instant::now();
    while written < target {
        let key = random_key(&mut rng, args.key_sz);
        written += (key.len() + value.len()) as u64;
        store.put(key, value.clone())?;
        if last_report.elapsed() >= Duration::from_secs(5) {
            tracing::info!(mb = written >> 20, "Preloading");
            last_report = Instant::now();
        }
    }
    tracing::info!(bytes = written, "Preload finished");
    Ok(())
}

fn run(store: Arc<Store>, args: &Args) -> Vec<Latencies> {
    let target = args.write_mb << 20;
    let written = Arc::new(AtomicU64::new(0));
    let common_value = Bytes::from(vec![b'v'; args.value_sz]);

    let handles: Vec<_> = (0..args.workers)
        .map(|_| {
            let store = Arc::clone(&store);
            let written = Arc::clone(&written);
            let value = common_value.clone();
            let key_sz = args.key_sz;
            let read_ratio = args.read_ratio;
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut latencies = Latencies::default();
                let mut own_keys: Vec<Bytes> = Vec::new();

                while written.load(Ordering::Relaxed) < target {
                    let read = !own_keys.is_empty() && rng.gen_range(0..100) < read_ratio;
                    let start = Instant::now();
                    if read {
                        let key = &own_keys[rng.gen_range(0..own_keys.len())];
                        match store.get(key) {
                            Ok(_) | Err(zonekv::ZoneKvError::NotFound) => {}
                            Err(e) => tracing::error!("Get failed: {}", e),
                        }
                        latencies.reads.push(start.elapsed().as_micros() as u64);
                    } else {
                        let key = random_key(&mut rng, key_sz);
                        if let Err(e) = store.put(key.clone(), value.clone()) {
                            tracing::error!("Put failed: {}", e);
                            continue;
                        }
                        latencies.writes.push(start.elapsed().as_micros() as u64);
                        written.fetch_add((key.len() + value.len()) as u64, Ordering::Relaxed);
                        own_keys.push(key);
                    }
                }
                latencies
            })
        })
        .collect();

    handles
        .into_iter()
        .filter_map(|handle| handle.join().ok())
        .collect()
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,zonekv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("ZoneKV Benchmark v{}", zonekv::VERSION);
    tracing::info!("Device: {}", args.device.display());

    let config = StoreConfig::builder()
        .device_path(&args.device)
        .device_capacity(args.device_capacity_mb << 20)
        .zone_capacity(args.zone_capacity_mb << 20)
        .use_existing_db(false)
        .build();

    let store = match Store::open(config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = preload(&store, &args) {
        tracing::error!("Preload failed: {}", e);
        std::process::exit(1);
    }

    let start = Instant::now();
    let results = run(Arc::clone(&store), &args);
    if let Err(e) = store.flush() {
        tracing::error!("Final flush failed: {}", e);
    }
    let elapsed = start.elapsed();

    let mut writes = Vec::new();
    let mut reads = Vec::new();
    for latencies in results {
        writes.extend(latencies.writes);
        reads.extend(latencies.reads);
    }

    let write_bytes = writes.len() as u64 * (args.key_sz + args.value_sz) as u64;
    let throughput_mbps = write_bytes as f64 / elapsed.as_secs_f64().max(1e-9) / (1u64 << 20) as f64;
    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        throughput_mbps = %format!("{:.2}", throughput_mbps),
        "Benchmark finished"
    );
    report("Write", writes);
    report("Read", reads);
    tracing::info!(metrics = ?store.metrics(), "Store metrics");

    if let Err(e) = store.close() {
        tracing::error!("Close failed: {}", e);
    }
    drop(store);

    if !args.keep {
        if let Err(e) = std::fs::remove_file(&args.device) {
            tracing::warn!("Failed to remove {}: {}", args.device.display(), e);
        }
    }
}
