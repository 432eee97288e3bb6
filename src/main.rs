use netflow_collector::{Collector, CollectorConfig, Error, JsonLinesSink};

use clap::Parser;
use log::info;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// NetFlow V5/V9/IPFIX UDP collector emitting JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "netflow_collector", version, about)]
struct Cli {
    /// UDP port to listen on
    #[arg(short, long)]
    port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Maximum datagram size in bytes
    #[arg(long, default_value_t = 65536)]
    buffer_size: usize,

    /// Decoder worker pool size
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Bounded worker queue depth
    #[arg(long, default_value_t = 2000)]
    queue_size: usize,

    /// Template cache TTL in minutes
    #[arg(long, default_value_t = 4000)]
    cache_ttl: u64,

    /// Upper bound on cached templates across all exporters
    #[arg(long, default_value_t = 4096)]
    cache_size: usize,

    /// Name of the event field holding the decoded flow
    #[arg(long, default_value = "netflow")]
    target: String,

    /// Accepted NetFlow versions
    #[arg(long, value_delimiter = ',', default_values_t = [5u16, 9, 10])]
    versions: Vec<u16>,

    /// NetFlow V9 field definition override file
    #[arg(long)]
    netflow_definitions: Option<PathBuf>,

    /// IPFIX field definition override file
    #[arg(long)]
    ipfix_definitions: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> CollectorConfig {
        let mut config = CollectorConfig::new(self.port);
        config.host = self.host;
        config.buffer_size = self.buffer_size;
        config.workers = self.workers;
        config.queue_size = self.queue_size;
        config.cache_ttl = self.cache_ttl;
        config.cache_size = self.cache_size;
        config.target = self.target;
        config.versions = self.versions;
        config.netflow_definitions = self.netflow_definitions;
        config.ipfix_definitions = self.ipfix_definitions;
        config
    }
}

fn main() -> netflow_collector::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .map_err(|e| Error::Config(format!("failed to install signal handler: {e}")))?;

    let collector = Collector::new(config, Arc::new(JsonLinesSink::new()))?;
    info!("listening for netflow on {}", collector.local_addr()?);
    collector.run(shutdown)
}
