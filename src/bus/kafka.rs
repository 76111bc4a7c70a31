//! `rdkafka`-backed producer and bid-placed consumer. Consumer construction
//! follows `other_examples/f22dd8dd_base-tips__...kafka_mempool_consumer.rs`
//! (`ClientConfig` + `StreamConsumer::subscribe`); manual commit is used in
//! place of that file's auto-commit so acknowledgement is explicit (§4.4).

use std::sync::Arc;

use rdkafka::{
    config::ClientConfig,
    consumer::{
        CommitMode,
        Consumer,
        StreamConsumer,
    },
    error::KafkaError,
    message::Message,
    producer::{
        FutureProducer,
        FutureRecord,
    },
    Timeout,
};
use tracing::warn;

use super::{
    AuctionEnded,
    BidPlaced,
    BidPlacedConsumer,
    BidResult,
    BusError,
    Delivery,
    EventBus,
};

impl From<KafkaError> for BusError {
    fn from(err: KafkaError) -> Self {
        BusError::Transient(err.to_string())
    }
}

pub struct KafkaEventBus {
    producer: FutureProducer,
    bid_placed_topic: String,
    bid_result_topic: String,
    auction_ended_topic: String,
}

impl KafkaEventBus {
    pub fn new(
        brokers: &str,
        bid_placed_topic: impl Into<String>,
        bid_result_topic: impl Into<String>,
        auction_ended_topic: impl Into<String>,
    ) -> Result<Self, KafkaError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self {
            producer,
            bid_placed_topic: bid_placed_topic.into(),
            bid_result_topic: bid_result_topic.into(),
            auction_ended_topic: auction_ended_topic.into(),
        })
    }

    async fn publish(&self, topic: &str, key: &str, payload: String) -> Result<(), BusError> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);
        self.producer
            .send(record, Timeout::After(std::time::Duration::from_secs(5)))
            .await
            .map_err(|(err, _)| BusError::from(err))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventBus for KafkaEventBus {
    async fn publish_bid_placed(&self, event: &BidPlaced) -> Result<(), BusError> {
        let payload = serde_json::to_string(event).expect("BidPlaced always serializes");
        self.publish(&self.bid_placed_topic, &event.auction_id, payload).await
    }

    async fn publish_bid_result(&self, event: &BidResult) -> Result<(), BusError> {
        let payload = serde_json::to_string(event).expect("BidResult always serializes");
        self.publish(&self.bid_result_topic, &event.auction_id, payload).await
    }

    async fn publish_auction_ended(&self, event: &AuctionEnded) -> Result<(), BusError> {
        let payload = serde_json::to_string(event).expect("AuctionEnded always serializes");
        self.publish(&self.auction_ended_topic, &event.auction_id, payload).await
    }
}

pub struct KafkaBidPlacedConsumer {
    consumer: Arc<StreamConsumer>,
}

impl KafkaBidPlacedConsumer {
    pub fn new(brokers: &str, topic: &str, consumer_group_id: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", consumer_group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[topic])?;
        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait::async_trait]
impl BidPlacedConsumer for KafkaBidPlacedConsumer {
    /// `Ok(None)` means the underlying stream has genuinely ended. A
    /// malformed or empty message is committed and skipped internally
    /// rather than surfaced as end-of-stream.
    async fn recv(&mut self) -> Result<Option<Delivery>, BusError> {
        loop {
            let message = match self.consumer.recv().await {
                Ok(message) => message,
                Err(err) => return Err(BusError::from(err)),
            };

            let payload = message.payload().map(|bytes| bytes.to_vec());
            let owned = message.detach();
            let Some(payload) = payload else {
                warn!("bid-placed message with empty payload, skipping");
                self.consumer.commit_message(&owned, CommitMode::Async).ok();
                continue;
            };

            let event: BidPlaced = match serde_json::from_slice(&payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "failed to decode bid-placed payload, skipping");
                    self.consumer.commit_message(&owned, CommitMode::Async).ok();
                    continue;
                }
            };

            let consumer = Arc::clone(&self.consumer);
            let ack_message = owned;
            let ack = move || {
                if let Err(err) = consumer.commit_message(&ack_message, CommitMode::Async) {
                    warn!(error = %err, "failed to commit bid-placed offset");
                }
            };

            return Ok(Some(Delivery::new(event, ack)));
        }
    }
}
