//! Synchronous front-end over the async engine.
//!
//! Every call blocks the calling thread until the broker answered or the
//! request timeout ran out. The handles here must not be used from inside
//! an async runtime, use [`crate::client::Client`] there instead.
//!
//! ### Example
//! ```rust,no_run
//! use libkafka::blocking::{Consumer, Producer};
//!
//! # fn run() -> libkafka::error::Result<()> {
//! let producer = Producer::new("localhost:9092", "purchases")?;
//! producer.produce("abc")?;
//! producer.produce("xyz")?;
//!
//! let mut consumer = Consumer::new("localhost:9092", "purchases")?;
//! assert_eq!(&consumer.consume()?[..], b"abc");
//! assert_eq!(&consumer.consume()?[..], b"xyz");
//! # Ok(())
//! # }
//! ```
//!
//! # Default client
//!
//! [`produce`] and [`consume`] take no broker, they go through one
//! process wide client. Configure it once with [`init_default`] before the
//! first call, otherwise it is built from the environment by
//! [`ClientConfig::from_env`].
use std::{
    collections::{hash_map::Entry, HashMap},
    io::ErrorKind,
    sync::{Arc, OnceLock},
};

use bytes::Bytes;
use tokio::runtime::Runtime;

use crate::{
    client::Client,
    config::ClientConfig,
    consumer::{self, ConsumeMessage},
    error::{Error, Result},
    producer::{self, ProduceMessage},
};

static DEFAULT_CLIENT: OnceLock<DefaultClient> = OnceLock::new();

fn runtime() -> Result<Arc<Runtime>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("libkafka-io")
        .enable_all()
        .build()
        .map_err(|err| {
            tracing::error!("ERROR: Could not start runtime {:?}", err);
            Error::RuntimeError(err.kind())
        })?;
    Ok(Arc::new(runtime))
}

/// Blocking [`producer::Producer`] for one topic.
pub struct Producer {
    inner: producer::Producer,
    runtime: Arc<Runtime>,
}

impl Producer {
    /// Producer for `topic` on the cluster behind `broker` (`host:port`,
    /// or a comma separated list).
    pub fn new(broker: &str, topic: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(broker)?, topic)
    }

    pub fn with_config(config: ClientConfig, topic: &str) -> Result<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(Client::new(config).producer(topic).build())?;
        Ok(Self { inner, runtime })
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn produce(&self, message: impl Into<ProduceMessage>) -> Result<()> {
        self.runtime.block_on(self.inner.produce(message))
    }

    pub fn produce_batch(&self, messages: &[ProduceMessage]) -> Result<()> {
        self.runtime.block_on(self.inner.produce_batch(messages))
    }
}

/// Blocking [`consumer::Consumer`] for one topic.
pub struct Consumer {
    inner: consumer::Consumer,
    runtime: Arc<Runtime>,
}

impl Consumer {
    /// Consumer for `topic` on the cluster behind `broker`, starting where
    /// the default offset policy says.
    pub fn new(broker: &str, topic: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(broker)?, topic)
    }

    pub fn with_config(config: ClientConfig, topic: &str) -> Result<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(Client::new(config).consumer(topic).build())?;
        Ok(Self { inner, runtime })
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    /// Payload of the next unread message.
    pub fn consume(&mut self) -> Result<Bytes> {
        Ok(self.consume_message()?.value)
    }

    /// The next unread message with its key, offset and headers.
    pub fn consume_message(&mut self) -> Result<ConsumeMessage> {
        self.runtime.block_on(self.inner.consume())
    }

    pub fn seek(&mut self, partition: i32, offset: i64) -> Result<()> {
        self.inner.seek(partition, offset)
    }

    pub fn position(&self, partition: i32) -> Result<Option<i64>> {
        self.inner.position(partition)
    }
}

struct DefaultClient {
    client: Client,
    /// Bare `consume` calls on a topic share one consumer, so they advance.
    consumers: tokio::sync::Mutex<HashMap<String, consumer::Consumer>>,
    runtime: Arc<Runtime>,
}

impl DefaultClient {
    fn new(config: ClientConfig) -> Result<Self> {
        tracing::info!("Default client for {:?}", config.bootstrap);
        Ok(Self {
            runtime: runtime()?,
            client: Client::new(config),
            consumers: tokio::sync::Mutex::new(HashMap::new()),
        })
    }
}

/// Configure the process wide client used by [`produce`] and [`consume`].
///
/// Fails with `DefaultClientAlreadyInitialized` once the default client
/// exists, whether from an earlier call or from a bare call that built it
/// from the environment.
pub fn init_default(config: ClientConfig) -> Result<()> {
    let client = DefaultClient::new(config)?;
    DEFAULT_CLIENT
        .set(client)
        .map_err(|_| Error::DefaultClientAlreadyInitialized)
}

fn default_client() -> Result<&'static DefaultClient> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let candidate = DefaultClient::new(ClientConfig::from_env()?)?;
    if DEFAULT_CLIENT.set(candidate).is_err() {
        tracing::debug!("Default client was initialized concurrently");
    }
    DEFAULT_CLIENT
        .get()
        .ok_or(Error::RuntimeError(ErrorKind::Other))
}

/// Produce `message` to `topic` through the default client.
pub fn produce(topic: &str, message: impl Into<ProduceMessage>) -> Result<()> {
    let default = default_client()?;
    let message = message.into();
    default.runtime.block_on(async {
        let producer = default.client.producer(topic).build().await?;
        producer.produce(message).await
    })
}

/// Payload of the next unread message of `topic` through the default
/// client. Consecutive calls for a topic continue where the last one
/// stopped.
pub fn consume(topic: &str) -> Result<Bytes> {
    let default = default_client()?;
    default.runtime.block_on(async {
        let mut consumers = default.consumers.lock().await;
        let consumer = match consumers.entry(topic.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default.client.consumer(topic).build().await?),
        };
        Ok(consumer.consume().await?.value)
    })
}
