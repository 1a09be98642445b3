//! Choosing the partition a produced message goes to.
//!
//! Keyed messages are hashed the way the Java client does it, murmur2 with
//! Kafka's seed and the sign bit masked, so records with the same key land
//! on the same partition whichever client wrote them. Unkeyed messages all
//! go to partition 0, which keeps every message of a producer in one
//! ordered log.
use murmur2::{murmur2, KAFKA_SEED};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Partitioner {
    /// Hash the key, unkeyed messages to partition 0.
    #[default]
    Default,
    /// Every message to this partition, keyed or not.
    Fixed(i32),
}

impl Partitioner {
    /// Partition for a message with `key` on a topic with
    /// `partition_count` partitions.
    pub fn partition(&self, key: Option<&[u8]>, partition_count: usize) -> i32 {
        match (self, key) {
            (Partitioner::Fixed(partition), _) => *partition,
            (Partitioner::Default, Some(key)) if partition_count > 0 => {
                let positive = murmur2(key, KAFKA_SEED) & 0x7fffffff;
                (positive % partition_count as u32) as i32
            }
            (Partitioner::Default, _) => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn unkeyed_messages_stay_on_partition_zero() {
        for count in [1, 3, 12] {
            assert_eq!(Partitioner::Default.partition(None, count), 0);
        }
    }

    #[test]
    fn keys_are_stable_and_in_range() {
        let first = Partitioner::Default.partition(Some(b"user-42"), 12);
        for _ in 0..10 {
            assert_eq!(Partitioner::Default.partition(Some(b"user-42"), 12), first);
        }
        assert!((0..12).contains(&first));
        assert_eq!(Partitioner::Default.partition(Some(b"user-42"), 1), 0);
    }

    #[test]
    fn keys_spread_over_partitions() {
        let seen = (0..500)
            .map(|i| {
                let key = format!("key-{}", i);
                Partitioner::Default.partition(Some(key.as_bytes()), 8)
            })
            .collect::<HashSet<i32>>();
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn fixed_wins_over_keys() {
        let partitioner = Partitioner::Fixed(2);
        assert_eq!(partitioner.partition(None, 4), 2);
        assert_eq!(partitioner.partition(Some(b"user-42"), 4), 2);
    }
}
