//! Runs against a real cluster when `KAFKA_BROKERS` is set and the
//! cluster creates topics on first use.

use std::time::Duration;

use bytes::Bytes;
use libkafka::prelude::*;

#[tokio::test]
async fn produce_and_consume_on_a_cluster() -> Result<(), Box<Error>> {
    let Some(config) = testsupport::get_brokers()? else {
        return Ok(());
    };
    let topic = testsupport::random_topic("libkafka-live");
    let client = Client::connect(config.metadata_retries(10, Duration::from_millis(500))).await?;

    let producer = client.producer(topic.as_str()).build().await?;
    producer.produce("abc").await?;
    producer.produce("xyz").await?;

    let mut consumer = client
        .consumer(topic.as_str())
        .poll_timeout(Duration::from_secs(10))
        .build()
        .await?;
    assert_eq!(consumer.consume().await?.value, Bytes::from("abc"));
    assert_eq!(consumer.consume().await?.value, Bytes::from("xyz"));

    client.close().await;
    Ok(())
}
