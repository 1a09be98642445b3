use clap::Parser;
use libkafka::{
    blocking::Producer,
    prelude::{ClientConfig, ProduceMessage},
};
use tracing_subscriber::EnvFilter;

/// Send one message to a topic and wait for the leader to store it.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bootstrap brokers, `host:port[,host:port...]`
    broker: String,

    topic: String,

    message: String,

    /// Message key, messages with the same key land on the same partition
    #[arg(short, long)]
    key: Option<String>,

    #[arg(long, env = "KAFKA_CLIENT_ID")]
    client_id: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("produce failed: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> libkafka::error::Result<()> {
    let mut config = ClientConfig::new(&args.broker)?;
    if let Some(client_id) = args.client_id {
        config = config.client_id(client_id);
    }
    let producer = Producer::with_config(config, &args.topic)?;

    let mut message = ProduceMessage::from(args.message);
    if let Some(key) = args.key {
        message = message.key(key);
    }
    producer.produce(message)?;
    tracing::info!("Produced to {}", producer.topic());
    Ok(())
}
