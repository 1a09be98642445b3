//! Client configuration.
//!
//! Every setting has a default, so the smallest configuration is just
//! the bootstrap broker:
//! ```rust
//! use libkafka::prelude::ClientConfig;
//!
//! let config = ClientConfig::new("localhost:9092").unwrap();
//! assert_eq!(config.client_id, "libkafka");
//! ```
//!
//! The process wide default client used by [`crate::blocking::produce`]
//! and [`crate::blocking::consume`] is configured from the environment
//! when it is not initialized explicitly, see [`ClientConfig::from_env`].
use std::{str::FromStr, time::Duration};

use crate::{
    error::{Error, Result},
    network::{parse_broker_list, tcp::TcpConfig, BrokerAddress},
    DEFAULT_CLIENT_ID,
};

pub const ENV_BROKERS: &str = "KAFKA_BROKERS";
pub const ENV_CLIENT_ID: &str = "KAFKA_CLIENT_ID";
pub const ENV_OFFSET_RESET: &str = "KAFKA_OFFSET_RESET";
pub const ENV_FETCH_TIMEOUT_MS: &str = "KAFKA_FETCH_TIMEOUT_MS";

const DEFAULT_BROKER: &str = "localhost";
const DEFAULT_PORT: u16 = 9092;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FETCH_MAX_WAIT: Duration = Duration::from_millis(100);
const DEFAULT_FETCH_MIN_BYTES: i32 = 1;
const DEFAULT_FETCH_MAX_BYTES: i32 = 1024 * 1024;
const DEFAULT_PARTITION_MAX_BYTES: i32 = 1024 * 1024;
const DEFAULT_REQUIRED_ACKS: i16 = 1;
const DEFAULT_PRODUCE_TIMEOUT_MS: i32 = 5000;
const DEFAULT_METADATA_MAX_RETRIES: usize = 3;
const DEFAULT_METADATA_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Where a consumer starts reading a partition it has no position for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// The oldest offset the broker still retains.
    #[default]
    Earliest,
    /// The offset the next produced message will get.
    Latest,
}

impl FromStr for OffsetPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" | "smallest" => Ok(OffsetPolicy::Earliest),
            "latest" | "largest" => Ok(OffsetPolicy::Latest),
            other => Err(Error::InvalidConfig(format!("unknown offset policy {:?}", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Brokers asked for metadata, in order, until one answers.
    pub bootstrap: Vec<BrokerAddress>,
    pub client_id: String,
    pub connect_timeout: Duration,
    /// Upper bound for one request/response exchange on a connection.
    pub request_timeout: Duration,
    /// How long the broker may hold a fetch waiting for data.
    pub fetch_max_wait: Duration,
    pub fetch_min_bytes: i32,
    pub fetch_max_bytes: i32,
    pub partition_max_bytes: i32,
    pub offset_policy: OffsetPolicy,
    /// 0 for no acknowledgments, 1 for only the leader and -1 for the full ISR.
    pub required_acks: i16,
    pub produce_timeout_ms: i32,
    /// Extra metadata rounds while a partition has no leader yet, as
    /// happens right after a topic is auto-created.
    pub metadata_max_retries: usize,
    pub metadata_retry_backoff: Duration,
    /// Check the broker's ApiVersions on first contact.
    pub verify_api_versions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap: vec![BrokerAddress::new(DEFAULT_BROKER, DEFAULT_PORT)],
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetch_max_wait: DEFAULT_FETCH_MAX_WAIT,
            fetch_min_bytes: DEFAULT_FETCH_MIN_BYTES,
            fetch_max_bytes: DEFAULT_FETCH_MAX_BYTES,
            partition_max_bytes: DEFAULT_PARTITION_MAX_BYTES,
            offset_policy: OffsetPolicy::default(),
            required_acks: DEFAULT_REQUIRED_ACKS,
            produce_timeout_ms: DEFAULT_PRODUCE_TIMEOUT_MS,
            metadata_max_retries: DEFAULT_METADATA_MAX_RETRIES,
            metadata_retry_backoff: DEFAULT_METADATA_RETRY_BACKOFF,
            verify_api_versions: true,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given comma separated `host:port` bootstrap list.
    pub fn new(bootstrap: &str) -> Result<Self> {
        Ok(Self {
            bootstrap: parse_broker_list(bootstrap)?,
            ..Self::default()
        })
    }

    /// Defaults overridden by `KAFKA_BROKERS`, `KAFKA_CLIENT_ID`,
    /// `KAFKA_OFFSET_RESET` and `KAFKA_FETCH_TIMEOUT_MS` where set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(brokers) = lookup(ENV_BROKERS) {
            config.bootstrap = parse_broker_list(&brokers)?;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            config.client_id = client_id;
        }
        if let Some(policy) = lookup(ENV_OFFSET_RESET) {
            config.offset_policy = policy.parse()?;
        }
        if let Some(timeout) = lookup(ENV_FETCH_TIMEOUT_MS) {
            let ms = timeout.trim().parse::<u64>().map_err(|_| {
                Error::InvalidConfig(format!("{} is not a number: {:?}", ENV_FETCH_TIMEOUT_MS, timeout))
            })?;
            config.fetch_max_wait = Duration::from_millis(ms);
        }
        tracing::debug!("Client configuration from environment {:?}", config);
        Ok(config)
    }

    pub fn bootstrap(mut self, bootstrap: Vec<BrokerAddress>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn fetch_max_wait(mut self, max_wait: Duration) -> Self {
        self.fetch_max_wait = max_wait;
        self
    }

    pub fn fetch_min_bytes(mut self, min_bytes: i32) -> Self {
        self.fetch_min_bytes = min_bytes;
        self
    }

    pub fn fetch_max_bytes(mut self, max_bytes: i32) -> Self {
        self.fetch_max_bytes = max_bytes;
        self
    }

    pub fn partition_max_bytes(mut self, max_bytes: i32) -> Self {
        self.partition_max_bytes = max_bytes;
        self
    }

    pub fn offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.offset_policy = policy;
        self
    }

    pub fn required_acks(mut self, required_acks: i16) -> Self {
        self.required_acks = required_acks;
        self
    }

    pub fn produce_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.produce_timeout_ms = timeout_ms;
        self
    }

    pub fn metadata_retries(mut self, max_retries: usize, backoff: Duration) -> Self {
        self.metadata_max_retries = max_retries;
        self.metadata_retry_backoff = backoff;
        self
    }

    pub fn verify_api_versions(mut self, verify: bool) -> Self {
        self.verify_api_versions = verify;
        self
    }

    pub(crate) fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Milliseconds as the protocol's INT32 fields want them, saturating.
pub(crate) fn duration_ms(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}
