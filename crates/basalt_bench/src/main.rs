//! Basalt benchmark harness.
//!
//! Arranges raw-KV regions on an in-process cluster, drives them from
//! worker threads, and reports interval and cumulative latency figures.
//!
//! Usage:
//!   cargo run -p basalt_bench -- --benchmark fillseq --req-num 100000
//!   cargo run -p basalt_bench -- --benchmark readrandom --concurrency 8 --timelimit 30

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::Mutex;

use basalt_common::types::{Range, RegionId};
use basalt_engine::codec::{encode_raw_key, prefix_next};
use basalt_server::LocalCluster;

const SUPPORTED_BENCHMARKS: [&str; 4] = ["fillseq", "fillrandom", "readseq", "readrandom"];
const REGION_NAME_PREFIX: &str = "Benchmark_";
const STORE_COUNT: u64 = 3;

/// Basalt raw-KV benchmark.
#[derive(Parser, Debug, Clone)]
#[command(name = "basalt-bench", about = "Raw-KV benchmark for Basalt")]
struct Args {
    /// Coordinator url. Only the in-process coordinator is wired here.
    #[arg(long, default_value = "local://")]
    coordinator_url: String,

    /// Benchmark kind: fillseq | fillrandom | readseq | readrandom.
    #[arg(long, default_value = "fillseq")]
    benchmark: String,

    /// Region range prefix.
    #[arg(long, default_value = "BENCH")]
    prefix: String,

    /// Number of regions to arrange.
    #[arg(long, default_value_t = 1)]
    region_num: u32,

    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    concurrency: u32,

    /// Total request number.
    #[arg(long, default_value_t = 10000)]
    req_num: u64,

    /// Time limit in seconds; 0 means no limit.
    #[arg(long, default_value_t = 0)]
    timelimit: u64,

    /// Interval in seconds between intermediate reports.
    #[arg(long, default_value_t = 2)]
    delay: u64,

    /// Key size in bytes (suffix after the region prefix).
    #[arg(long, default_value_t = 16)]
    key_size: usize,

    /// Value size in bytes.
    #[arg(long, default_value_t = 64)]
    value_size: usize,

    /// Keys per batched request; 1 sends point requests.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,
}

/// Deterministic xorshift64 generator, one per worker.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

#[derive(Default)]
struct Stats {
    epoch: u64,
    req_num: u64,
    error_count: u64,
    write_bytes: u64,
    read_bytes: u64,
    latencies_us: Vec<u64>,
}

impl Stats {
    fn add(&mut self, duration_us: u64, write_bytes: u64, read_bytes: u64) {
        self.req_num += 1;
        self.write_bytes += write_bytes;
        self.read_bytes += read_bytes;
        self.latencies_us.push(duration_us);
    }

    fn add_error(&mut self) {
        self.error_count += 1;
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.req_num = 0;
        self.error_count = 0;
        self.write_bytes = 0;
        self.read_bytes = 0;
        self.latencies_us.clear();
    }

    fn percentile(&self, sorted: &[u64], p: f64) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[rank]
    }

    fn header() -> String {
        format!(
            "{:>8}{:>10}{:>8}{:>10}{:>10}{:>12}{:>12}{:>12}{:>12}{:>12}",
            "EPOCH", "REQ_NUM", "ERRORS", "QPS", "MB/s", "LAT_AVG(us)", "LAT_MAX(us)",
            "LAT_P50(us)", "LAT_P95(us)", "LAT_P99(us)"
        )
    }

    fn report(&self, cumulative: bool, elapsed_ms: u64) {
        let seconds = (elapsed_ms as f64 / 1000.0).max(f64::EPSILON);
        let mut sorted = self.latencies_us.clone();
        sorted.sort_unstable();
        let avg = if sorted.is_empty() {
            0
        } else {
            sorted.iter().sum::<u64>() / sorted.len() as u64
        };

        if cumulative {
            println!("Cumulative({elapsed_ms}ms):");
            println!("{}", Stats::header());
        } else if self.epoch % 20 == 0 {
            println!("{}", Stats::header());
        }
        println!(
            "{:>8}{:>10}{:>8}{:>10.0}{:>10.2}{:>12}{:>12}{:>12}{:>12}{:>12}",
            self.epoch,
            self.req_num,
            self.error_count,
            self.req_num as f64 / seconds,
            self.write_bytes as f64 / seconds / 1_048_576.0,
            avg,
            sorted.last().copied().unwrap_or(0),
            self.percentile(&sorted, 0.50),
            self.percentile(&sorted, 0.95),
            self.percentile(&sorted, 0.99),
        );
    }
}

struct RegionEntry {
    prefix: String,
    region_id: RegionId,
}

struct Benchmark {
    args: Args,
    cluster: Arc<LocalCluster>,
    regions: Vec<RegionEntry>,
    stop: Arc<AtomicBool>,
    active_workers: AtomicU64,
    stats_interval: Mutex<Stats>,
    stats_cumulative: Mutex<Stats>,
}

impl Benchmark {
    fn new(args: Args, cluster: Arc<LocalCluster>) -> Self {
        Self {
            args,
            cluster,
            regions: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            active_workers: AtomicU64::new(0),
            stats_interval: Mutex::new(Stats::default()),
            stats_cumulative: Mutex::new(Stats::default()),
        }
    }

    /// Create one region per `--region-num`, each covering the encoded
    /// range of its prefix.
    fn arrange_regions(&mut self) -> Result<()> {
        println!("Arrange:");
        for i in 0..self.args.region_num {
            let prefix = format!("{}{:06}", self.args.prefix, i);
            let range = Range::new(
                encode_raw_key(prefix.as_bytes()),
                encode_raw_key(&prefix_next(prefix.as_bytes())),
            );
            let region_id = self
                .cluster
                .coordinator
                .create_region(format!("{}{}", REGION_NAME_PREFIX, i + 1), 3, range)
                .with_context(|| format!("create region for prefix {prefix}"))?;
            println!("Create region({prefix}) {region_id} done");
            self.regions.push(RegionEntry { prefix, region_id });
        }
        Ok(())
    }

    /// Preload keys for the read benchmarks.
    fn arrange_data(&self) -> Result<()> {
        if !self.args.benchmark.starts_with("read") {
            return Ok(());
        }
        let per_region = self.preload_count();
        for region in &self.regions {
            let mut pending = Vec::with_capacity(self.args.batch_size.max(1));
            for i in 0..per_region {
                pending.push((self.seq_key(region, i), self.value()));
                if pending.len() >= self.args.batch_size.max(1) {
                    self.cluster
                        .raw_batch_put(&pending)
                        .map_err(|e| anyhow::anyhow!("preload failed: {e}"))?;
                    pending.clear();
                }
            }
            if !pending.is_empty() {
                self.cluster
                    .raw_batch_put(&pending)
                    .map_err(|e| anyhow::anyhow!("preload failed: {e}"))?;
            }
        }
        Ok(())
    }

    fn preload_count(&self) -> u64 {
        (self.args.req_num / self.regions.len().max(1) as u64).clamp(1, 100_000)
    }

    fn seq_key(&self, region: &RegionEntry, index: u64) -> Vec<u8> {
        let suffix = format!("{index:0width$}", width = self.args.key_size.max(1));
        format!("{}{}", region.prefix, suffix).into_bytes()
    }

    fn random_key(&self, region: &RegionEntry, rng: &mut Rng, modulo: u64) -> Vec<u8> {
        self.seq_key(region, rng.next_u64() % modulo.max(1))
    }

    fn value(&self) -> Vec<u8> {
        vec![b'x'; self.args.value_size]
    }

    fn run(self: &Arc<Self>) -> Result<()> {
        let per_thread =
            (self.args.req_num / (self.args.concurrency as u64 * self.regions.len() as u64)).max(1);

        let start_time = Instant::now();
        self.active_workers
            .store(self.args.concurrency as u64, Ordering::SeqCst);
        let mut workers = Vec::with_capacity(self.args.concurrency as usize);
        for worker_id in 0..self.args.concurrency {
            let bench = Arc::clone(self);
            workers.push(std::thread::spawn(move || {
                bench.worker_routine(worker_id, per_thread);
                bench.active_workers.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        self.interval_report(start_time);

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
        }

        self.stats_cumulative
            .lock()
            .report(true, start_time.elapsed().as_millis() as u64);

        for region in &self.regions {
            self.cluster
                .coordinator
                .drop_region(region.region_id)
                .with_context(|| format!("drop region {}", region.region_id))?;
        }
        Ok(())
    }

    fn worker_routine(&self, worker_id: u32, per_thread: u64) {
        let mut rng = Rng::new(0xB45A17 ^ (worker_id as u64 + 1));
        let preload = self.preload_count();

        'outer: for i in 0..per_thread {
            for region in &self.regions {
                if self.stop.load(Ordering::Relaxed) {
                    break 'outer;
                }
                let started = Instant::now();
                let result = self.execute_one(region, i, &mut rng, preload);
                let elapsed_us = started.elapsed().as_micros() as u64;

                let (ok, write_bytes, read_bytes) = result;
                let mut interval = self.stats_interval.lock();
                let mut cumulative = self.stats_cumulative.lock();
                if ok {
                    interval.add(elapsed_us, write_bytes, read_bytes);
                    cumulative.add(elapsed_us, write_bytes, read_bytes);
                } else {
                    interval.add_error();
                    cumulative.add_error();
                }
            }
        }
    }

    /// Execute one request against one region; returns
    /// `(ok, write_bytes, read_bytes)`.
    fn execute_one(
        &self,
        region: &RegionEntry,
        index: u64,
        rng: &mut Rng,
        preload: u64,
    ) -> (bool, u64, u64) {
        let batch = self.args.batch_size.max(1);
        match self.args.benchmark.as_str() {
            "fillseq" | "fillrandom" => {
                let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..batch)
                    .map(|j| {
                        let key = if self.args.benchmark == "fillseq" {
                            self.seq_key(region, index * batch as u64 + j as u64)
                        } else {
                            self.random_key(region, rng, u64::MAX)
                        };
                        (key, self.value())
                    })
                    .collect();
                let bytes: u64 = pairs
                    .iter()
                    .map(|(k, v)| (k.len() + v.len()) as u64)
                    .sum();
                (self.cluster.raw_batch_put(&pairs).is_ok(), bytes, 0)
            }
            "readseq" | "readrandom" => {
                let keys: Vec<Vec<u8>> = (0..batch)
                    .map(|j| {
                        if self.args.benchmark == "readseq" {
                            self.seq_key(region, (index * batch as u64 + j as u64) % preload)
                        } else {
                            self.random_key(region, rng, preload)
                        }
                    })
                    .collect();
                match self.cluster.raw_batch_get(&keys) {
                    Ok(kvs) => {
                        let bytes: u64 =
                            kvs.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
                        (true, 0, bytes)
                    }
                    Err(_) => (false, 0, 0),
                }
            }
            _ => (false, 0, 0),
        }
    }

    fn interval_report(&self, start_time: Instant) {
        let delay = Duration::from_secs(self.args.delay.max(1));
        let deadline = (self.args.timelimit > 0)
            .then(|| start_time + Duration::from_secs(self.args.timelimit));

        let mut last_report = Instant::now();
        loop {
            std::thread::sleep(Duration::from_millis(10));

            if last_report.elapsed() >= delay {
                let mut interval = self.stats_interval.lock();
                interval.report(false, last_report.elapsed().as_millis() as u64);
                interval.clear();
                last_report = Instant::now();
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    self.stop.store(true, Ordering::Relaxed);
                }
            }

            if self.active_workers.load(Ordering::SeqCst) == 0 {
                break;
            }
        }
    }

    fn print_parameters(&self) {
        println!("Parameter:");
        println!("{:<16}: {:>32}", "benchmark", self.args.benchmark);
        println!("{:<16}: {:>32}", "coordinator_url", self.args.coordinator_url);
        println!("{:<16}: {:>32}", "prefix", self.args.prefix);
        println!("{:<16}: {:>32}", "region_num", self.args.region_num);
        println!("{:<16}: {:>32}", "concurrency", self.args.concurrency);
        println!("{:<16}: {:>32}", "req_num", self.args.req_num);
        println!("{:<16}: {:>32}", "timelimit(s)", self.args.timelimit);
        println!("{:<16}: {:>32}", "delay(s)", self.args.delay);
        println!("{:<16}: {:>32}", "key_size(byte)", self.args.key_size);
        println!("{:<16}: {:>32}", "value_size(byte)", self.args.value_size);
        println!("{:<16}: {:>32}", "batch_size", self.args.batch_size);
        println!();
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if !SUPPORTED_BENCHMARKS.contains(&args.benchmark.as_str()) {
        bail!(
            "not a supported benchmark {:?}, supported: {}",
            args.benchmark,
            SUPPORTED_BENCHMARKS.join(", ")
        );
    }
    if !args.coordinator_url.starts_with("local://") {
        bail!(
            "only the in-process coordinator is available, got {:?}",
            args.coordinator_url
        );
    }
    if args.region_num == 0 || args.concurrency == 0 {
        bail!("--region-num and --concurrency must be at least 1");
    }

    let cluster = Arc::new(LocalCluster::new(STORE_COUNT));
    let mut benchmark = Benchmark::new(args, cluster);
    benchmark.print_parameters();
    benchmark.arrange_regions().context("arrange regions")?;
    benchmark.arrange_data().context("arrange data")?;
    println!();

    let benchmark = Arc::new(benchmark);
    benchmark.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_is_deterministic() {
        let mut a = Rng::new(7);
        let mut b = Rng::new(7);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn percentiles_from_sorted_latencies() {
        let mut stats = Stats::default();
        for us in [10u64, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            stats.add(us, 0, 0);
        }
        let mut sorted = stats.latencies_us.clone();
        sorted.sort_unstable();
        assert_eq!(stats.percentile(&sorted, 0.50), 50);
        assert_eq!(stats.percentile(&sorted, 0.99), 100);
    }
}
