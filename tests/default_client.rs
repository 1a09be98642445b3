//! The default client is process wide, so everything touching it lives in
//! this one test.

use bytes::Bytes;
use libkafka::{blocking, prelude::Error};
use testsupport::MockBroker;

#[test]
fn bare_produce_and_consume() -> Result<(), Box<Error>> {
    let broker = MockBroker::background();
    broker.create_topic("events", 1);
    broker.create_topic("audit", 1);

    blocking::init_default(broker.config())?;
    assert_eq!(
        blocking::init_default(broker.config()),
        Err(Error::DefaultClientAlreadyInitialized)
    );

    blocking::produce("events", "abc")?;
    blocking::produce("events", "xyz")?;
    assert_eq!(blocking::consume("events")?, Bytes::from("abc"));
    assert_eq!(blocking::consume("events")?, Bytes::from("xyz"));
    assert!(matches!(
        blocking::consume("events"),
        Err(Error::NoMessageAvailable { .. })
    ));

    // consecutive calls share a position per topic
    blocking::produce("events", "123")?;
    blocking::produce("audit", "login")?;
    assert_eq!(blocking::consume("audit")?, Bytes::from("login"));
    assert_eq!(blocking::consume("events")?, Bytes::from("123"));

    assert!(matches!(
        blocking::consume("missing"),
        Err(Error::UnknownTopic { .. })
    ));
    Ok(())
}
