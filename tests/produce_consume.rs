
use bytes::Bytes;
use libkafka::prelude::*;
use testsupport::MockBroker;
use tokio_stream::StreamExt;

const TOPIC: &str = "purchases";

async fn setup(partitions: usize) -> (MockBroker, Client) {
    let broker = MockBroker::start().await;
    broker.create_topic(TOPIC, partitions);
    let client = Client::new(broker.config());
    (broker, client)
}

#[tokio::test]
async fn messages_come_back_in_produce_order() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    producer.produce("abc").await?;
    producer.produce("xyz").await?;

    let mut consumer = client.consumer(TOPIC).build().await?;
    let first = consumer.consume().await?;
    assert_eq!(first.value, Bytes::from("abc"));
    assert_eq!((first.partition, first.offset), (0, 0));
    let second = consumer.consume().await?;
    assert_eq!(second.value, Bytes::from("xyz"));
    assert_eq!(second.offset, 1);

    assert_eq!(
        consumer.consume().await,
        Err(Error::NoMessageAvailable {
            topic: TOPIC.to_string()
        })
    );
    Ok(())
}

#[tokio::test]
async fn empty_topic_has_no_message() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let mut consumer = client.consumer(TOPIC).build().await?;

    assert!(matches!(
        consumer.consume().await,
        Err(Error::NoMessageAvailable { .. })
    ));
    assert_eq!(consumer.position(0)?, Some(0));
    Ok(())
}

#[tokio::test]
async fn consumers_keep_their_own_offsets() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    producer.produce("abc").await?;
    producer.produce("xyz").await?;

    let mut first = client.consumer(TOPIC).build().await?;
    let mut second = client.consumer(TOPIC).build().await?;

    assert_eq!(first.consume().await?.value, Bytes::from("abc"));
    assert_eq!(first.consume().await?.value, Bytes::from("xyz"));
    // the first consumer reading everything does not move the second
    assert_eq!(second.consume().await?.value, Bytes::from("abc"));
    assert_eq!(second.position(0)?, Some(1));
    assert_eq!(first.position(0)?, Some(2));
    Ok(())
}

#[tokio::test]
async fn consumer_sees_messages_produced_later() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    let mut consumer = client.consumer(TOPIC).build().await?;
    assert!(consumer.consume().await.is_err());

    producer.produce("late").await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("late"));
    Ok(())
}

#[tokio::test]
async fn latest_policy_skips_existing_messages() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    producer.produce("old").await?;

    let mut consumer = client
        .consumer(TOPIC)
        .offset_policy(OffsetPolicy::Latest)
        .build()
        .await?;
    assert_eq!(consumer.position(0)?, Some(1));
    producer.produce("new").await?;

    let message = consumer.consume().await?;
    assert_eq!(message.value, Bytes::from("new"));
    assert_eq!(message.offset, 1);
    Ok(())
}

#[tokio::test]
async fn batch_is_one_request() -> Result<(), Box<Error>> {
    let (broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;

    let messages = [
        ProduceMessage::from("one"),
        ProduceMessage::from("two").header("trace", "7f3a"),
        ProduceMessage::from("three"),
    ];
    producer.produce_batch(&messages).await?;
    assert_eq!(broker.produce_requests(), 1);
    assert_eq!(broker.log_end_offset(TOPIC, 0), 3);

    let mut consumer = client.consumer(TOPIC).build().await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("one"));
    let two = consumer.consume().await?;
    assert_eq!(two.value, Bytes::from("two"));
    assert_eq!(two.headers.len(), 1);
    assert_eq!(two.headers[0].key, Bytes::from("trace"));
    assert_eq!(two.headers[0].value, Some(Bytes::from("7f3a")));
    assert_eq!(consumer.consume().await?.offset, 2);
    Ok(())
}

#[tokio::test]
async fn keyed_messages_follow_the_hash() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(3).await;
    let producer = client.producer(TOPIC).build().await?;
    producer
        .produce(ProduceMessage::from("basket").key("user-42"))
        .await?;

    let expected = Partitioner::Default.partition(Some(&b"user-42"[..]), 3);
    let mut consumer = client.consumer(TOPIC).build().await?;
    let message = consumer.consume().await?;
    assert_eq!(message.partition, expected);
    assert_eq!(message.key, Some(Bytes::from("user-42")));
    Ok(())
}

#[tokio::test]
async fn partitions_are_read_in_index_order() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(3).await;
    let fixed = client
        .producer(TOPIC)
        .partitioner(Partitioner::Fixed(2))
        .build()
        .await?;
    fixed.produce("on two").await?;
    let unkeyed = client.producer(TOPIC).build().await?;
    unkeyed.produce("on zero").await?;
    unkeyed.produce("on zero again").await?;

    let mut consumer = client.consumer(TOPIC).build().await?;
    let order: Vec<(i32, Bytes)> = vec![
        consumer.consume().await?,
        consumer.consume().await?,
        consumer.consume().await?,
    ]
    .into_iter()
    .map(|m| (m.partition, m.value))
    .collect();
    assert_eq!(
        order,
        vec![
            (0, Bytes::from("on zero")),
            (0, Bytes::from("on zero again")),
            (2, Bytes::from("on two")),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn consumer_restricted_to_partitions() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(2).await;
    client.producer(TOPIC).build().await?.produce("zero").await?;
    client
        .producer(TOPIC)
        .partitioner(Partitioner::Fixed(1))
        .build()
        .await?
        .produce("one")
        .await?;

    let mut consumer = client.consumer(TOPIC).partitions(vec![1]).build().await?;
    assert_eq!(consumer.partitions(), &[1]);
    assert_eq!(consumer.consume().await?.value, Bytes::from("one"));
    assert!(consumer.consume().await.is_err());
    assert!(matches!(
        consumer.position(0),
        Err(Error::UnassignedPartition { partition: 0, .. })
    ));

    let missing = client.consumer(TOPIC).partitions(vec![4]).build().await;
    assert!(matches!(missing, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn seek_moves_forward_only() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    for value in ["a", "b", "c", "d"] {
        producer.produce(value).await?;
    }

    let mut consumer = client.consumer(TOPIC).build().await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("a"));
    consumer.seek(0, 3)?;
    assert_eq!(consumer.position(0)?, Some(3));
    assert_eq!(consumer.consume().await?.value, Bytes::from("d"));

    assert_eq!(
        consumer.seek(0, 1),
        Err(Error::InvalidSeek {
            partition: 0,
            current: 4,
            requested: 1
        })
    );

    let mut started = client.consumer(TOPIC).seek(0, 2).build().await?;
    assert_eq!(started.consume().await?.value, Bytes::from("c"));
    Ok(())
}

#[tokio::test]
async fn stream_yields_messages() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    let consumer = client.consumer(TOPIC).build().await?;

    let stream = consumer.into_stream();
    tokio::pin!(stream);

    producer.produce("abc").await?;
    producer.produce("xyz").await?;
    let first = stream.next().await.unwrap()?;
    let second = stream.next().await.unwrap()?;
    assert_eq!(first.value, Bytes::from("abc"));
    assert_eq!(second.value, Bytes::from("xyz"));
    Ok(())
}

#[tokio::test]
async fn poll_timeout_waits_for_data() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let mut consumer = client
        .consumer(TOPIC)
        .poll_timeout(std::time::Duration::from_secs(5))
        .build()
        .await?;

    let producer = client.producer(TOPIC).build().await?;
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        producer.produce("eventually").await
    });
    assert_eq!(consumer.consume().await?.value, Bytes::from("eventually"));
    Ok(())
}

#[tokio::test]
async fn fire_and_forget() -> Result<(), Box<Error>> {
    let (broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).required_acks(0).build().await?;
    producer.produce("unacknowledged").await?;

    let mut consumer = client.consumer(TOPIC).build().await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("unacknowledged"));
    assert_eq!(broker.produce_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn close_drops_connections() -> Result<(), Box<Error>> {
    let (_broker, client) = setup(1).await;
    let producer = client.producer(TOPIC).build().await?;
    producer.produce("before").await?;
    assert_eq!(client.connections().connection_count().await, 1);

    client.close().await;
    assert_eq!(client.connections().connection_count().await, 0);
    producer.produce("after").await?;

    let mut consumer = client.consumer(TOPIC).build().await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("before"));
    assert_eq!(consumer.consume().await?.value, Bytes::from("after"));
    Ok(())
}
