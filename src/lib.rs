//! # libkafka
//! Minimal Rust-native Kafka client: publish messages to a topic and read
//! them back in order.
//!
//! One async engine, the [`Client`](client::Client), talks the Kafka wire
//! protocol over TCP. It keeps one connection per broker, caches which
//! broker leads which partition and refreshes that knowledge when a
//! broker says it is stale. Two front-ends sit on top of it:
//!
//! - the async [`Producer`](prelude::Producer) and
//!   [`Consumer`](prelude::Consumer), built from a client;
//! - the [`blocking`] module, with synchronous `Producer`/`Consumer`
//!   handles bound to a broker and topic, and the bare
//!   [`produce`](blocking::produce) and [`consume`](blocking::consume)
//!   functions backed by a process wide default client.
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//!     - [Blocking](#blocking)
//!     - [Async](#async)
//! - [Ordering and offsets](#ordering-and-offsets)
//! - [Resources](#resources)
//!
//! ## Getting started
//!
//! ### Blocking
//! ```rust,no_run
//! use libkafka::blocking::{self, Consumer, Producer};
//! use libkafka::prelude::*;
//!
//! # fn run() -> Result<()> {
//! let producer = Producer::new("localhost:9092", "purchases")?;
//! producer.produce("abc")?;
//! producer.produce("xyz")?;
//!
//! let mut consumer = Consumer::new("localhost:9092", "purchases")?;
//! assert_eq!(&consumer.consume()?[..], b"abc");
//! assert_eq!(&consumer.consume()?[..], b"xyz");
//! assert!(matches!(consumer.consume(), Err(Error::NoMessageAvailable { .. })));
//!
//! // or through the default client
//! blocking::init_default(ClientConfig::new("localhost:9092")?)?;
//! blocking::produce("purchases", "123")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Async
//! ```rust,no_run
//! use libkafka::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let client = Client::new(ClientConfig::new("localhost:9092")?);
//! let producer = client.producer("purchases").build().await?;
//! producer
//!     .produce_batch(&[ProduceMessage::from("abc"), ProduceMessage::from("xyz")])
//!     .await?;
//!
//! let mut consumer = client.consumer("purchases").build().await?;
//! let message = consumer.consume().await?;
//! println!("{}/{}@{}", message.topic, message.partition, message.offset);
//! # Ok(())
//! # }
//! ```
//!
//! ## Ordering and offsets
//! Unkeyed messages always go to partition 0, so messages produced one
//! after the other are consumed in the same order. Keyed messages are
//! spread with Kafka's murmur2 hash, see [`Partitioner`](prelude::Partitioner).
//!
//! Each consumer owns its offsets. Consumers start at the earliest
//! retained offset unless told otherwise and only ever move forward.
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

pub mod blocking;
pub mod client;
pub mod config;
pub mod consumer;
pub mod consumer_builder;
pub mod encode;
pub mod error;
pub mod metadata;
pub mod network;
mod parser;
pub mod partitioner;
pub mod producer;
pub mod producer_builder;
pub mod protocol;
mod utils;

pub const DEFAULT_CLIENT_ID: &str = "libkafka";

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! # Producing
    //! A [`Producer`] sends every call to the partition leader right away
    //! and returns once the broker acknowledged it. Create one from a
    //! [`Client`] with [`Client::producer`], which hands out a
    //! [`ProducerBuilder`].
    //!
    //! # Consuming
    //! A [`Consumer`] returns one [`ConsumeMessage`] per call in offset
    //! order, or `NoMessageAvailable` when there is nothing new. It can
    //! also be turned into a stream with [`Consumer::into_stream`].
    //!
    //! For those looking to handle the specific requests and responses
    //! that make up the Kafka protocol, visit the [protocol module].
    //!
    //! [protocol module]: crate::protocol
    pub use crate::client::Client;
    pub use crate::config::{ClientConfig, OffsetPolicy};
    pub use crate::consumer::{ConsumeMessage, Consumer};
    pub use crate::consumer_builder::ConsumerBuilder;
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::metadata::{MetadataCache, TopicMetadata, TopicPartition};
    pub use crate::network::{manager::ConnectionManager, BrokerAddress, BrokerConnection};
    pub use crate::partitioner::Partitioner;
    pub use crate::producer::{ProduceMessage, Producer};
    pub use crate::producer_builder::ProducerBuilder;

    pub use bytes;
}
