//! Event bus (§6.2): bid-placed, bid-result, auction-ended. JSON payloads
//! keyed by `auction_id`, at-least-once delivery.

pub mod kafka;
pub mod memory;

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use serde::{
    Deserialize,
    Serialize,
};

use crate::resilience::Retriable;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("transient bus failure: {0}")]
    Transient(String),
}

impl Retriable for BusError {
    fn is_retryable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidPlaced {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BidResultStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidResult {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Decimal,
    pub status: BidResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionEnded {
    pub auction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    pub final_price: Decimal,
    pub total_bids: i64,
}

/// Producer side of the bus, wrapped by the resilience envelope at the call
/// site (one [`crate::resilience::Envelope`] per producer, named
/// `kafka_producer`).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_bid_placed(&self, event: &BidPlaced) -> Result<(), BusError>;
    async fn publish_bid_result(&self, event: &BidResult) -> Result<(), BusError>;
    async fn publish_auction_ended(&self, event: &AuctionEnded) -> Result<(), BusError>;
}

/// A single bid-placed delivery together with the means to acknowledge it.
/// Not acknowledging lets the bus redeliver after its own visibility window
/// (§4.4).
pub struct Delivery {
    pub event: BidPlaced,
    ack: Box<dyn FnOnce() + Send>,
}

impl Delivery {
    pub fn new(event: BidPlaced, ack: impl FnOnce() + Send + 'static) -> Self {
        Self { event, ack: Box::new(ack) }
    }

    /// Acknowledge successful processing. Dropping a `Delivery` without
    /// calling this is equivalent to a no-ack.
    pub fn ack(self) {
        (self.ack)();
    }
}

/// Consumer side of the bus, feeding the evaluator (§4.4). One instance per
/// topic partition assignment; `recv` suspends until a message arrives or
/// the consumer is shut down.
#[async_trait]
pub trait BidPlacedConsumer: Send + Sync {
    async fn recv(&mut self) -> Result<Option<Delivery>, BusError>;
}
