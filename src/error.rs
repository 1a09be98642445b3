//! Errors raised by the client and the broker error codes they carry.
use std::io::ErrorKind;

use num_derive::FromPrimitive;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong talking to a cluster.
///
/// Codec failures (`EncodingError`, `ProtocolError`, `CorruptFrame`,
/// `UnsupportedCompression`, `UnsupportedVersion`) are never retried. `ConnectionError` is surfaced
/// after the connection manager's single reconnect, timeouts included
/// (kind `TimedOut`). The application level
/// errors carry the broker code together with the topic and partition.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("request could not be encoded: {0}")]
    EncodingError(&'static str),

    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    #[error("corrupt record batch, crc expected {expected:#010x} got {actual:#010x}")]
    CorruptFrame { expected: u32, actual: u32 },

    #[error("record batch compressed with unsupported codec {codec}")]
    UnsupportedCompression { codec: i16 },

    #[error("broker does not support api key {api_key} at version {version}")]
    UnsupportedVersion { api_key: i16, version: i16 },

    #[error("connection to {broker} failed: {kind:?}")]
    ConnectionError { broker: String, kind: ErrorKind },

    #[error("topic {topic} does not exist")]
    UnknownTopic { topic: String },

    #[error("produce to {topic}/{partition} failed: {code:?}")]
    ProduceError {
        topic: String,
        partition: i32,
        code: KafkaCode,
    },

    #[error("fetch from {topic}/{partition} failed: {code:?}")]
    FetchError {
        topic: String,
        partition: i32,
        code: KafkaCode,
    },

    #[error("no message available on {topic}")]
    NoMessageAvailable { topic: String },

    #[error("cannot seek partition {partition} back from {current} to {requested}")]
    InvalidSeek {
        partition: i32,
        current: i64,
        requested: i64,
    },

    #[error("partition {partition} is not assigned to this consumer of {topic}")]
    UnassignedPartition { topic: String, partition: i32 },

    #[error("invalid broker address {0:?}")]
    InvalidBrokerAddress(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no leader known for {0}/{1}")]
    NoLeaderForTopicPartition(String, i32),

    #[error("broker responded with {0:?}")]
    KafkaError(KafkaCode),

    #[error("invalid utf8 in response")]
    DecodingUtf8Error,

    #[error("the default client is already initialized")]
    DefaultClientAlreadyInitialized,

    #[error("could not start the client runtime: {0:?}")]
    RuntimeError(ErrorKind),
}

impl Error {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Error::ProtocolError {
            reason: reason.into(),
        }
    }

    /// The broker error code carried by this error, if any.
    pub fn code(&self) -> Option<KafkaCode> {
        match self {
            Error::ProduceError { code, .. } | Error::FetchError { code, .. } => Some(*code),
            Error::KafkaError(code) => Some(*code),
            _ => None,
        }
    }

    /// True when the connection died under an established session, the
    /// case the connection manager reconnects for.
    pub fn is_connection_reset(&self) -> bool {
        matches!(
            self,
            Error::ConnectionError {
                kind: ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected,
                ..
            }
        )
    }

    /// True when the cached leadership is probably stale and one retry
    /// after invalidating the metadata may succeed.
    pub fn is_stale_metadata(&self) -> bool {
        matches!(self, Error::UnknownTopic { .. })
            || self.code().map_or(false, |code| code.is_stale_metadata())
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(i16)]
pub enum KafkaCode {
    /// An unexpected server error, also used for codes this client does
    /// not know about.
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    GroupLoadInProgress = 14,
    GroupCoordinatorNotAvailable = 15,
    NotCoordinatorForGroup = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    IllegalGeneration = 22,
    InconsistentGroupProtocol = 23,
    InvalidGroupId = 24,
    UnknownMemberId = 25,
    InvalidSessionTimeout = 26,
    RebalanceInProgress = 27,
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to
    /// access the requested topic.
    TopicAuthorizationFailed = 29,
    GroupAuthorizationFailed = 30,
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    TopicAlreadyExists = 36,
    InvalidPartitions = 37,
    InvalidReplicationFactor = 38,
    InvalidReplicaAssignment = 39,
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    /// The request is malformed or carries fields the broker rejects.
    InvalidRequest = 42,
    /// The message format version on the broker does not support the
    /// request.
    UnsupportedForMessageFormat = 43,
    PolicyViolation = 44,
    OutOfOrderSequenceNumber = 45,
    DuplicateSequenceNumber = 46,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    InvalidTransactionTimeout = 50,
    ConcurrentTransactions = 51,
    TransactionCoordinatorFenced = 52,
    TransactionalIdAuthorizationFailed = 53,
    SecurityDisabled = 54,
    OperationNotAttempted = 55,
    KafkaStorageError = 56,
    LogDirNotFound = 57,
    SaslAuthenticationFailed = 58,
    UnknownProducerId = 59,
    ReassignmentInProgress = 60,
    DelegationTokenAuthDisabled = 61,
    DelegationTokenNotFound = 62,
    DelegationTokenOwnerMismatch = 63,
    DelegationTokenRequestNotAllowed = 64,
    DelegationTokenAuthorizationFailed = 65,
    DelegationTokenExpired = 66,
    InvalidPrincipalType = 67,
    NonEmptyGroup = 68,
    GroupIdNotFound = 69,
    FetchSessionIdNotFound = 70,
    InvalidFetchSessionEpoch = 71,
    ListenerNotFound = 72,
    TopicDeletionDisabled = 73,
    FencedLeaderEpoch = 74,
    UnknownLeaderEpoch = 75,
    UnsupportedCompressionType = 76,
}

impl KafkaCode {
    /// Codes meaning the client's idea of partition leadership is out of
    /// date.
    pub fn is_stale_metadata(self) -> bool {
        matches!(
            self,
            KafkaCode::UnknownTopicOrPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderForPartition
                | KafkaCode::FencedLeaderEpoch
        )
    }
}

impl From<KafkaCode> for Error {
    fn from(code: KafkaCode) -> Self {
        Error::KafkaError(code)
    }
}
