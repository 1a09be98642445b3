//! Cluster metadata, which broker leads which partition.
//!
//! Topics are resolved lazily: the first [`MetadataCache::resolve`] for a
//! topic asks a bootstrap broker, later calls are answered from memory
//! until the topic is [invalidated](MetadataCache::invalidate) after a
//! leadership error. An entry is always replaced as a whole, and the map
//! is only locked for writing to swap one in or out. Refreshes run
//! outside of it, one at a time per topic.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::{
    config::ClientConfig,
    error::{Error, KafkaCode, Result},
    network::{manager::ConnectionManager, tcp::TcpConnection, BrokerAddress, BrokerConnection},
    protocol::{MetadataRequest, MetadataResponse},
};

/// A (topic, partition) pair, the unit offsets are tracked for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionLeader {
    pub partition: i32,
    pub leader: BrokerAddress,
}

/// Leaders of every partition of a topic, ordered by partition index.
///
/// A resolved topic always has at least one partition.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadata {
    pub topic: String,
    pub partitions: Vec<PartitionLeader>,
}

impl TopicMetadata {
    pub fn leader(&self, partition: i32) -> Option<&BrokerAddress> {
        self.partitions
            .iter()
            .find(|p| p.partition == partition)
            .map(|p| &p.leader)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn topic_partitions(&self) -> impl Iterator<Item = TopicPartition> + '_ {
        self.partitions
            .iter()
            .map(|p| TopicPartition::new(self.topic.as_str(), p.partition))
    }

    /// Pick out one topic from a metadata response.
    ///
    /// Fails with `UnknownTopic` when the broker does not know it and with
    /// `NoLeaderForTopicPartition` while any partition is without a
    /// reachable leader.
    pub fn from_response(response: &MetadataResponse, topic: &str) -> Result<Self> {
        let unknown = || Error::UnknownTopic {
            topic: topic.to_owned(),
        };
        let entry = response.topic(topic).ok_or_else(unknown)?;
        match entry.error_code {
            KafkaCode::None => {}
            KafkaCode::UnknownTopicOrPartition => return Err(unknown()),
            KafkaCode::LeaderNotAvailable => {
                return Err(Error::NoLeaderForTopicPartition(topic.to_owned(), -1))
            }
            code => {
                tracing::error!("ERROR: Metadata for {} answered {:?}", topic, code);
                return Err(Error::KafkaError(code));
            }
        }
        if entry.partitions.is_empty() {
            return Err(Error::NoLeaderForTopicPartition(topic.to_owned(), -1));
        }

        let mut partitions = entry
            .partitions
            .iter()
            .map(|partition| {
                let no_leader = || {
                    Error::NoLeaderForTopicPartition(topic.to_owned(), partition.partition_index)
                };
                if partition.leader_id < 0 {
                    return Err(no_leader());
                }
                let broker = response.broker(partition.leader_id).ok_or_else(no_leader)?;
                Ok(PartitionLeader {
                    partition: partition.partition_index,
                    leader: broker.address()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        partitions.sort_by_key(|p| p.partition);

        Ok(Self {
            topic: topic.to_owned(),
            partitions,
        })
    }
}

pub struct MetadataCache<T: BrokerConnection = TcpConnection> {
    connections: Arc<ConnectionManager<T>>,
    bootstrap: Vec<BrokerAddress>,
    client_id: String,
    max_retries: usize,
    retry_backoff: Duration,
    topics: RwLock<HashMap<String, Arc<TopicMetadata>>>,
    /// Held while a topic is being refreshed.
    refreshing: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    refreshes: AtomicUsize,
}

impl<T: BrokerConnection> std::fmt::Debug for MetadataCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("bootstrap", &self.bootstrap)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

impl<T: BrokerConnection> MetadataCache<T> {
    pub fn new(config: &ClientConfig, connections: Arc<ConnectionManager<T>>) -> Self {
        Self {
            connections,
            bootstrap: config.bootstrap.clone(),
            client_id: config.client_id.clone(),
            max_retries: config.metadata_max_retries,
            retry_backoff: config.metadata_retry_backoff,
            topics: RwLock::new(HashMap::new()),
            refreshing: Mutex::new(HashMap::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Leaders for every partition of `topic`, from memory when known.
    pub async fn resolve(&self, topic: &str) -> Result<Arc<TopicMetadata>> {
        if let Some(cached) = self.cached(topic).await {
            return Ok(cached);
        }

        let refresh_lock = self
            .refreshing
            .lock()
            .await
            .entry(topic.to_owned())
            .or_default()
            .clone();
        let _refreshing = refresh_lock.lock().await;
        // refreshed by another caller while we waited for the lock
        if let Some(cached) = self.cached(topic).await {
            return Ok(cached);
        }

        let fresh = Arc::new(self.refresh(topic).await?);
        tracing::debug!("Resolved {:?}", fresh);
        self.topics
            .write()
            .await
            .insert(topic.to_owned(), fresh.clone());
        Ok(fresh)
    }

    async fn cached(&self, topic: &str) -> Option<Arc<TopicMetadata>> {
        self.topics.read().await.get(topic).cloned()
    }

    /// Forget `topic`, the next resolve goes back to the cluster.
    pub async fn invalidate(&self, topic: &str) {
        if self.topics.write().await.remove(topic).is_some() {
            tracing::warn!("Invalidated metadata for {}", topic);
        }
    }

    pub async fn is_cached(&self, topic: &str) -> bool {
        self.topics.read().await.contains_key(topic)
    }

    /// Metadata requests sent so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn bootstrap(&self) -> &[BrokerAddress] {
        &self.bootstrap
    }

    #[instrument(name = "metadata-refresh", level = "debug", skip(self))]
    async fn refresh(&self, topic: &str) -> Result<TopicMetadata> {
        let mut retries = 0;
        loop {
            let response = self.request_metadata(topic).await?;
            match TopicMetadata::from_response(&response, topic) {
                Err(Error::NoLeaderForTopicPartition(_, partition)) if retries < self.max_retries => {
                    retries += 1;
                    tracing::debug!(
                        "No leader yet for {}/{}, retry {} of {}",
                        topic,
                        partition,
                        retries,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    /// Ask the bootstrap brokers in order until one answers.
    async fn request_metadata(&self, topic: &str) -> Result<MetadataResponse> {
        let topics = [topic];
        let mut last_error = None;
        for addr in self.bootstrap.iter() {
            let correlation_id = self.connections.next_correlation_id();
            let request = MetadataRequest::new(correlation_id, &self.client_id, &topics);
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            match self.connections.request(addr, correlation_id, &request).await {
                Ok(response) => return Ok(response),
                Err(err @ Error::ConnectionError { .. }) => {
                    tracing::warn!("Bootstrap broker {} unavailable {:?}", addr, err);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::InvalidConfig("no bootstrap brokers configured".to_owned())))
    }
}

#[cfg(test)]
mod test {
    use std::{collections::VecDeque, sync::Mutex};

    use bytes::{BufMut, Bytes};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        network::tcp::TcpConfig,
        protocol::metadata::response::{Broker, Partition, Topic},
    };

    /// One scripted answer: topic error code and the leader of partition 0.
    type Answer = (i16, i32);

    /// Requests for the topic `slow` are answered this late.
    const STALL: Duration = Duration::from_millis(500);

    fn metadata_body(correlation_id: i32, port: u16, topic: &str, (code, leader): Answer) -> Vec<u8> {
        let mut body = vec![];
        body.put_i32(correlation_id);
        body.put_i32(1); // brokers
        body.put_i32(1);
        body.put_i16(9);
        body.put_slice(b"127.0.0.1");
        body.put_i32(port as i32);
        body.put_i16(-1);
        body.put_i32(1); // controller
        body.put_i32(1); // topics
        body.put_i16(code);
        body.put_i16(topic.len() as i16);
        body.put_slice(topic.as_bytes());
        body.put_i8(0);
        if code == 3 {
            body.put_i32(0);
        } else {
            body.put_i32(1);
            body.put_i16(0);
            body.put_i32(0);
            body.put_i32(leader);
            body.put_i32(1);
            body.put_i32(1);
            body.put_i32(0);
        }
        body
    }

    /// Serves the scripted answers in order, one per metadata request.
    async fn broker(answers: Vec<Answer>) -> BrokerAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let answers = Arc::new(Mutex::new(VecDeque::from(answers)));
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let answers = answers.clone();
                tokio::spawn(async move {
                    loop {
                        let Ok(size) = socket.read_i32().await else { return };
                        let mut request = vec![0u8; size as usize];
                        socket.read_exact(&mut request).await.unwrap();
                        let correlation_id = i32::from_be_bytes([request[4], request[5], request[6], request[7]]);
                        let topic_len = i16::from_be_bytes([request[8], request[9]]) as usize;
                        let topics_at = 10 + topic_len + 4;
                        let name_len =
                            i16::from_be_bytes([request[topics_at], request[topics_at + 1]]) as usize;
                        let topic = String::from_utf8(
                            request[topics_at + 2..topics_at + 2 + name_len].to_vec(),
                        )
                        .unwrap();

                        if topic == "slow" {
                            tokio::time::sleep(STALL).await;
                        }
                        let answer = answers.lock().unwrap().pop_front().unwrap_or((0, 1));
                        let body = metadata_body(correlation_id, port, &topic, answer);
                        socket.write_i32(body.len() as i32).await.unwrap();
                        socket.write_all(&body).await.unwrap();
                    }
                });
            }
        });
        BrokerAddress::new("127.0.0.1", port)
    }

    fn cache(bootstrap: Vec<BrokerAddress>) -> MetadataCache {
        let config = ClientConfig::default()
            .bootstrap(bootstrap)
            .metadata_retries(2, Duration::from_millis(10));
        let connections = Arc::new(ConnectionManager::new(TcpConfig::default(), config.request_timeout));
        MetadataCache::new(&config, connections)
    }

    #[tokio::test]
    async fn resolve_is_cached() {
        let addr = broker(vec![]).await;
        let cache = cache(vec![addr.clone()]);

        let first = cache.resolve("purchases").await.unwrap();
        assert_eq!(first.partitions, vec![PartitionLeader { partition: 0, leader: addr }]);
        let second = cache.resolve("purchases").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.refresh_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let addr = broker(vec![]).await;
        let cache = cache(vec![addr]);

        cache.resolve("purchases").await.unwrap();
        cache.invalidate("purchases").await;
        assert!(!cache.is_cached("purchases").await);
        cache.resolve("purchases").await.unwrap();
        assert_eq!(cache.refresh_count(), 2);
    }

    #[tokio::test]
    async fn refresh_does_not_hold_up_cached_topics() {
        let addr = broker(vec![]).await;
        let cache = Arc::new(cache(vec![addr]));
        cache.resolve("fast").await.unwrap();

        let slow = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = tokio::time::Instant::now();
        cache.resolve("fast").await.unwrap();
        assert!(started.elapsed() < STALL / 2);
        assert!(!slow.is_finished());

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(cache.refresh_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_refresh() {
        let addr = broker(vec![]).await;
        let cache = cache(vec![addr]);

        let (first, second) = tokio::join!(cache.resolve("slow"), cache.resolve("slow"));
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(cache.refresh_count(), 1);
    }

    #[tokio::test]
    async fn unknown_topic() {
        let addr = broker(vec![(3, -1)]).await;
        let cache = cache(vec![addr]);

        assert_eq!(
            cache.resolve("nope").await,
            Err(Error::UnknownTopic {
                topic: "nope".to_string()
            })
        );
        assert!(!cache.is_cached("nope").await);
    }

    #[tokio::test]
    async fn waits_for_a_leader() {
        let addr = broker(vec![(5, -1), (0, -1)]).await;
        let cache = cache(vec![addr]);

        let resolved = cache.resolve("fresh").await.unwrap();
        assert_eq!(resolved.partition_count(), 1);
        assert_eq!(cache.refresh_count(), 3);
    }

    #[tokio::test]
    async fn gives_up_without_a_leader() {
        let addr = broker(vec![(5, -1), (5, -1), (5, -1)]).await;
        let cache = cache(vec![addr]);

        assert!(matches!(
            cache.resolve("fresh").await,
            Err(Error::NoLeaderForTopicPartition(_, -1))
        ));
    }

    #[tokio::test]
    async fn skips_dead_bootstrap_brokers() {
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            BrokerAddress::new("127.0.0.1", listener.local_addr().unwrap().port())
        };
        let addr = broker(vec![]).await;
        let cache = cache(vec![dead, addr]);

        assert!(cache.resolve("purchases").await.is_ok());
        assert_eq!(cache.refresh_count(), 2);
    }

    #[test]
    fn leaders_are_sorted_by_partition() {
        let broker = |node_id, port| Broker {
            node_id,
            host: Bytes::from("localhost"),
            port,
            rack: None,
        };
        let partition = |partition_index, leader_id| Partition {
            error_code: KafkaCode::None,
            partition_index,
            leader_id,
            replica_nodes: vec![leader_id],
            isr_nodes: vec![leader_id],
        };
        let response = MetadataResponse {
            brokers: vec![broker(1, 9092), broker(2, 9093)],
            controller_id: 1,
            topics: vec![Topic {
                error_code: KafkaCode::None,
                name: Bytes::from("purchases"),
                is_internal: false,
                partitions: vec![partition(1, 2), partition(0, 1)],
            }],
            ..Default::default()
        };

        let topic = TopicMetadata::from_response(&response, "purchases").unwrap();
        assert_eq!(topic.leader(0), Some(&BrokerAddress::new("localhost", 9092)));
        assert_eq!(topic.leader(1), Some(&BrokerAddress::new("localhost", 9093)));
        assert_eq!(
            topic.topic_partitions().collect::<Vec<_>>(),
            vec![TopicPartition::new("purchases", 0), TopicPartition::new("purchases", 1)]
        );
        assert!(matches!(
            TopicMetadata::from_response(&response, "refunds"),
            Err(Error::UnknownTopic { .. })
        ));
    }
}
