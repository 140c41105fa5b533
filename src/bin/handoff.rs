use std::path::PathBuf;

use clap::Parser;
use handoff::harness;
use handoff::{Config, Strategy};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[clap(name = "handoff")]
#[clap(about = "Hands items from a producer thread to a consumer thread", long_about = None)]
struct Args {
    /// Synchronization between producer and consumer.
    #[clap(short, long, value_enum)]
    strategy: Option<Strategy>,

    /// Items to consume before both threads stop.
    #[clap(short, long)]
    limit: Option<usize>,

    /// Make the producer sleep before each push.
    #[clap(short, long)]
    wait: bool,

    /// Producer sleep, in milliseconds, when waiting.
    #[clap(long)]
    delay_ms: Option<u64>,

    /// Print every consumed item.
    #[clap(short, long)]
    trace: bool,

    /// Slots of the naive ring.
    #[clap(long)]
    naive_capacity: Option<usize>,

    /// TOML file to read the settings from, flags take precedence.
    #[clap(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> handoff::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(limit) = self.limit {
            config.consumer_limit = Some(limit);
        }
        if let Some(delay_ms) = self.delay_ms {
            config.delay_ms = delay_ms;
        }
        if let Some(capacity) = self.naive_capacity {
            config.naive_capacity = capacity;
        }
        config.wait |= self.wait;
        config.trace |= self.trace;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    debug!(?args, "command line");

    let config = args.into_config()?;
    info!(
        strategy = %config.strategy,
        limit = config.limit(),
        wait = config.wait,
        "producer, consumer"
    );

    let summary = harness::run_configured(&config)?;
    info!("{}", summary);

    println!("{}ms", summary.elapsed.as_millis());
    Ok(())
}
