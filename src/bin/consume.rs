use std::{io::Write, time::Duration};

use clap::Parser;
use libkafka::{
    blocking::Consumer,
    prelude::{ClientConfig, Error, OffsetPolicy},
};
use tracing_subscriber::EnvFilter;

/// Print messages of a topic, one per line, oldest first.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bootstrap brokers, `host:port[,host:port...]`
    broker: String,

    topic: String,

    /// Stop after this many messages instead of when the topic runs dry
    count: Option<usize>,

    /// Start at the end of the topic and only print new messages
    #[arg(long, default_value = "false")]
    latest: bool,

    /// How long the broker may hold an empty fetch, in milliseconds
    #[arg(long, env = "KAFKA_FETCH_TIMEOUT_MS", default_value = "500")]
    fetch_timeout_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("consume failed: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> libkafka::error::Result<()> {
    let mut config = ClientConfig::new(&args.broker)?
        .fetch_max_wait(Duration::from_millis(args.fetch_timeout_ms));
    if args.latest {
        config = config.offset_policy(OffsetPolicy::Latest);
    }
    let mut consumer = Consumer::with_config(config, &args.topic)?;

    let mut stdout = std::io::stdout().lock();
    let mut printed = 0;
    while args.count.map_or(true, |count| printed < count) {
        match consumer.consume() {
            Ok(value) => {
                // a closed stdout just ends the listing
                if stdout.write_all(&value).and_then(|_| stdout.write_all(b"\n")).is_err() {
                    break;
                }
                printed += 1;
            }
            // with a count, keep waiting until that many arrived
            Err(Error::NoMessageAvailable { .. }) if args.count.is_some() => continue,
            Err(Error::NoMessageAvailable { .. }) => break,
            Err(err) => return Err(err),
        }
    }
    tracing::info!("Consumed {} messages from {}", printed, consumer.topic());
    Ok(())
}
