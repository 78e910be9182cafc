//! Embedded partitioned log.
use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
    time::Duration,
};

use log::trace;
use tokio::time::Instant;

use super::{BrokerError, Delivery, EventPublisher, PartitionConsumer};

const POLL_STEP: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
struct Message {
    key: String,
    value: String,
}

#[derive(Default)]
struct BrokerState {
    /// topic -> one append-only log per partition
    topics: Mutex<HashMap<String, Vec<Vec<Message>>>>,
    /// (topic, group, partition) -> committed offset (index of the next unprocessed message)
    offsets: Mutex<HashMap<(String, String, usize), usize>>,
}

/// An in-process, partitioned, ordered, at-least-once log with consumer groups.
///
/// Publishing hashes the key onto a partition, so all messages for one key are FIFO. Consumer
/// groups track a committed offset per partition; a subscriber created after a crash resumes
/// from the committed offset, redelivering anything that was polled but never committed.
#[derive(Clone)]
pub struct MemoryBroker {
    partitions: usize,
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new(partitions: usize) -> Self {
        Self { partitions: partitions.max(1), state: Arc::new(BrokerState::default()) }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions
    }

    /// Joins `group` on `topic`, returning one consumer per partition. Each consumer starts at
    /// the group's committed offset for its partition.
    pub fn subscribe(&self, topic: &str, group: &str) -> Vec<MemoryPartitionConsumer> {
        self.ensure_topic(topic);
        let offsets = self.state.offsets.lock().unwrap();
        (0..self.partitions)
            .map(|partition| {
                let committed = offsets
                    .get(&(topic.to_string(), group.to_string(), partition))
                    .copied()
                    .unwrap_or(0);
                MemoryPartitionConsumer {
                    state: Arc::clone(&self.state),
                    topic: topic.to_string(),
                    group: group.to_string(),
                    partition,
                    next_fetch: committed,
                }
            })
            .collect()
    }

    fn ensure_topic(&self, topic: &str) {
        let mut topics = self.state.topics.lock().unwrap();
        topics.entry(topic.to_string()).or_insert_with(|| vec![Vec::new(); self.partitions]);
    }

    /// All `(key, value)` pairs on a topic, grouped by partition. Test observability.
    pub fn messages(&self, topic: &str) -> Vec<Vec<(String, String)>> {
        let topics = self.state.topics.lock().unwrap();
        topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .map(|log| log.iter().map(|m| (m.key.clone(), m.value.clone())).collect())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of messages on a topic. Test observability.
    pub fn message_count(&self, topic: &str) -> usize {
        self.messages(topic).iter().map(Vec::len).sum()
    }
}

impl EventPublisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, value: String) -> Result<(), BrokerError> {
        let partition = self.partition_for(key);
        let mut topics = self.state.topics.lock().unwrap();
        let logs = topics.entry(topic.to_string()).or_insert_with(|| vec![Vec::new(); self.partitions]);
        logs[partition].push(Message { key: key.to_string(), value });
        trace!("📮️ {topic}/{partition} <- message from key {key}");
        Ok(())
    }
}

pub struct MemoryPartitionConsumer {
    state: Arc<BrokerState>,
    topic: String,
    group: String,
    partition: usize,
    /// Index of the next message to hand out. Starts at the group's committed offset, so
    /// uncommitted deliveries reappear for a fresh subscriber.
    next_fetch: usize,
}

impl MemoryPartitionConsumer {
    fn try_fetch(&mut self) -> Option<Delivery> {
        let topics = self.state.topics.lock().unwrap();
        let log = topics.get(&self.topic)?.get(self.partition)?;
        let message = log.get(self.next_fetch)?;
        let delivery = Delivery {
            key: message.key.clone(),
            value: message.value.clone(),
            partition: self.partition,
            offset: self.next_fetch,
        };
        self.next_fetch += 1;
        Some(delivery)
    }
}

impl PartitionConsumer for MemoryPartitionConsumer {
    fn partition(&self) -> usize {
        self.partition
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.try_fetch() {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        if delivery.partition != self.partition {
            return Err(BrokerError::CommitFailed(format!(
                "delivery belongs to partition {}, consumer owns {}",
                delivery.partition, self.partition
            )));
        }
        let mut offsets = self.state.offsets.lock().unwrap();
        let entry = offsets
            .entry((self.topic.clone(), self.group.clone(), self.partition))
            .or_insert(0);
        *entry = (*entry).max(delivery.offset + 1);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TOPIC: &str = "test-events";

    #[tokio::test]
    async fn same_key_lands_on_one_partition_in_order() {
        let broker = MemoryBroker::new(4);
        for i in 0..5 {
            broker.publish(TOPIC, "agg-1", format!("m{i}")).await.unwrap();
        }
        let per_partition = broker.messages(TOPIC);
        let occupied: Vec<_> = per_partition.iter().filter(|log| !log.is_empty()).collect();
        assert_eq!(occupied.len(), 1);
        let values: Vec<_> = occupied[0].iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn poll_and_commit_advance_the_group() {
        let broker = MemoryBroker::new(1);
        broker.publish(TOPIC, "k", "first".to_string()).await.unwrap();
        broker.publish(TOPIC, "k", "second".to_string()).await.unwrap();

        let mut consumers = broker.subscribe(TOPIC, "g1");
        let consumer = &mut consumers[0];
        let d1 = consumer.poll(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(d1.value, "first");
        consumer.commit(&d1).await.unwrap();
        let d2 = consumer.poll(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(d2.value, "second");
    }

    #[tokio::test]
    async fn uncommitted_deliveries_are_redelivered_to_a_new_subscriber() {
        let broker = MemoryBroker::new(1);
        broker.publish(TOPIC, "k", "only".to_string()).await.unwrap();

        let mut consumers = broker.subscribe(TOPIC, "g1");
        let delivery = consumers[0].poll(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(delivery.value, "only");
        // no commit; a crashed worker's replacement sees the message again
        drop(consumers);

        let mut consumers = broker.subscribe(TOPIC, "g1");
        let redelivered = consumers[0].poll(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(redelivered.value, "only");
        assert_eq!(redelivered.offset, delivery.offset);
    }

    #[tokio::test]
    async fn committed_offsets_are_per_group() {
        let broker = MemoryBroker::new(1);
        broker.publish(TOPIC, "k", "shared".to_string()).await.unwrap();

        let mut g1 = broker.subscribe(TOPIC, "g1");
        let d = g1[0].poll(Duration::from_millis(50)).await.unwrap().unwrap();
        g1[0].commit(&d).await.unwrap();

        let mut g2 = broker.subscribe(TOPIC, "g2");
        let d2 = g2[0].poll(Duration::from_millis(50)).await.unwrap();
        assert!(d2.is_some(), "a second group reads from the beginning");
    }

    #[tokio::test]
    async fn poll_times_out_when_empty() {
        let broker = MemoryBroker::new(2);
        let mut consumers = broker.subscribe(TOPIC, "g1");
        let polled = consumers[0].poll(Duration::from_millis(20)).await.unwrap();
        assert!(polled.is_none());
    }
}
