
use std::time::Duration;

use bytes::Bytes;
use libkafka::prelude::*;
use testsupport::MockBroker;

const TOPIC: &str = "payments";

#[tokio::test]
async fn not_leader_refreshes_metadata_once_and_retries() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;

    let metadata_before = broker.metadata_requests();
    broker.answer_not_leader(TOPIC, 1);
    producer.produce("abc").await?;

    assert_eq!(broker.metadata_requests(), metadata_before + 1);
    assert_eq!(broker.produce_requests(), 2);
    assert_eq!(broker.log_end_offset(TOPIC, 0), 1);

    let mut consumer = client.consumer(TOPIC).build().await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("abc"));
    assert!(consumer.consume().await.is_err());
    Ok(())
}

#[tokio::test]
async fn not_leader_twice_is_surfaced() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;

    let metadata_before = broker.metadata_requests();
    broker.answer_not_leader(TOPIC, 2);
    assert_eq!(
        producer.produce("abc").await,
        Err(Error::ProduceError {
            topic: TOPIC.to_string(),
            partition: 0,
            code: KafkaCode::NotLeaderForPartition,
        })
    );
    assert_eq!(broker.metadata_requests(), metadata_before + 1);
    assert_eq!(broker.produce_requests(), 2);
    assert_eq!(broker.log_end_offset(TOPIC, 0), 0);
    Ok(())
}

#[tokio::test]
async fn unacknowledged_partition_is_a_protocol_error() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;

    broker.leave_out_produce_answers(TOPIC);
    let result = producer.produce("abc").await;
    assert!(
        matches!(result, Err(Error::ProtocolError { .. })),
        "unexpected {:?}",
        result
    );
    // not a leadership problem, so no retry
    assert_eq!(broker.produce_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn fetch_not_leader_refreshes_metadata_once_and_retries() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    client.producer(TOPIC).build().await?.produce("abc").await?;
    let mut consumer = client.consumer(TOPIC).build().await?;

    let metadata_before = broker.metadata_requests();
    broker.answer_fetch_not_leader(TOPIC, 1);
    let message = consumer.consume().await?;

    assert_eq!((message.offset, message.value), (0, Bytes::from("abc")));
    assert_eq!(broker.metadata_requests(), metadata_before + 1);
    assert_eq!(broker.fetch_requests(), 2);
    Ok(())
}

#[tokio::test]
async fn fetch_not_leader_twice_is_surfaced() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    client.producer(TOPIC).build().await?.produce("abc").await?;
    let mut consumer = client.consumer(TOPIC).build().await?;

    let metadata_before = broker.metadata_requests();
    broker.answer_fetch_not_leader(TOPIC, 2);
    assert_eq!(
        consumer.consume().await,
        Err(Error::FetchError {
            topic: TOPIC.to_string(),
            partition: 0,
            code: KafkaCode::NotLeaderForPartition,
        })
    );
    assert_eq!(broker.metadata_requests(), metadata_before + 1);
    assert_eq!(broker.fetch_requests(), 2);

    // nothing was handed out, the next call starts where the first did
    assert_eq!(consumer.position(0)?, Some(0));
    assert_eq!(consumer.consume().await?.value, Bytes::from("abc"));
    Ok(())
}

#[tokio::test]
async fn deleted_records_move_the_cursor_to_the_log_start() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;
    for value in ["a", "b", "c"] {
        producer.produce(value).await?;
    }
    let mut consumer = client.consumer(TOPIC).build().await?;
    consumer.seek(0, 0)?;
    let list_offsets_before = broker.list_offsets_requests();

    broker.truncate(TOPIC, 0, 2);
    let message = consumer.consume().await?;

    assert_eq!((message.offset, message.value), (2, Bytes::from("c")));
    assert_eq!(broker.list_offsets_requests(), list_offsets_before + 1);
    assert_eq!(broker.fetch_requests(), 2);
    assert_eq!(consumer.position(0)?, Some(3));
    Ok(())
}

#[tokio::test]
async fn offset_past_the_log_end_is_surfaced() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    client.producer(TOPIC).build().await?.produce("abc").await?;
    let mut consumer = client.consumer(TOPIC).build().await?;
    consumer.seek(0, 10)?;
    let list_offsets_before = broker.list_offsets_requests();

    assert_eq!(
        consumer.consume().await,
        Err(Error::FetchError {
            topic: TOPIC.to_string(),
            partition: 0,
            code: KafkaCode::OffsetOutOfRange,
        })
    );
    // the log start is behind the cursor, which never moves back
    assert_eq!(broker.list_offsets_requests(), list_offsets_before + 1);
    assert_eq!(broker.fetch_requests(), 1);
    assert_eq!(consumer.position(0)?, Some(10));
    assert!(matches!(consumer.seek(0, 0), Err(Error::InvalidSeek { .. })));
    Ok(())
}

#[tokio::test]
async fn too_large_message_is_a_produce_error() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    broker.max_batch_bytes(512);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;

    let result = producer.produce(vec![b'x'; 4096]).await;
    assert_eq!(
        result,
        Err(Error::ProduceError {
            topic: TOPIC.to_string(),
            partition: 0,
            code: KafkaCode::MessageSizeTooLarge,
        })
    );
    // not a leadership problem, so no retry
    assert_eq!(broker.produce_requests(), 1);

    producer.produce("small").await?;
    assert_eq!(broker.log_end_offset(TOPIC, 0), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_topic() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let expected = Error::UnknownTopic {
        topic: "missing".to_string(),
    };
    assert_eq!(client.producer("missing").build().await.err(), Some(expected.clone()));
    assert_eq!(client.consumer("missing").build().await.err(), Some(expected));
    Ok(())
}

#[tokio::test]
async fn fixed_partition_must_exist() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 2);
    let client = Client::new(broker.config());

    let result = client
        .producer(TOPIC)
        .partitioner(Partitioner::Fixed(5))
        .build()
        .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    let result = client.producer(TOPIC).required_acks(2).build().await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn unreachable_broker_is_a_connection_error() {
    // a port nothing listens on any more
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(&addr.to_string())
        .unwrap()
        .connect_timeout(Duration::from_secs(1));
    let client = Client::new(config);
    let result = client.producer(TOPIC).build().await;
    assert!(
        matches!(result, Err(Error::ConnectionError { .. })),
        "unexpected {:?}",
        result.err()
    );
}

#[tokio::test]
async fn closed_client_reconnects_on_next_request() -> Result<(), Box<Error>> {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, 1);
    let client = Client::new(broker.config());
    let producer = client.producer(TOPIC).build().await?;
    producer.produce("abc").await?;
    let connects = client.connections().connects();

    // a dropped connection is replaced on the next request
    client.close().await;
    producer.produce("xyz").await?;
    assert_eq!(client.connections().connects(), connects + 1);
    Ok(())
}
