//! In-process bus fake: an mpsc channel carries bid-placed into a
//! [`super::BidPlacedConsumer`], and published bid-result/auction-ended
//! events are captured in a `Mutex<Vec<_>>` for test assertions.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    AuctionEnded,
    BidPlaced,
    BidPlacedConsumer,
    BidResult,
    BusError,
    Delivery,
    EventBus,
};

pub struct InMemoryEventBus {
    bid_placed_tx: mpsc::UnboundedSender<BidPlaced>,
    bid_results: Mutex<Vec<BidResult>>,
    auctions_ended: Mutex<Vec<AuctionEnded>>,
    /// When set, `publish_bid_placed` fails instead of enqueuing — used to
    /// exercise the local-fallback path of §4.3 step 4.
    fail_bid_placed: std::sync::atomic::AtomicBool,
}

pub struct InMemoryBidPlacedConsumer {
    rx: mpsc::UnboundedReceiver<BidPlaced>,
}

impl InMemoryEventBus {
    pub fn new() -> (Self, InMemoryBidPlacedConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                bid_placed_tx: tx,
                bid_results: Mutex::new(Vec::new()),
                auctions_ended: Mutex::new(Vec::new()),
                fail_bid_placed: std::sync::atomic::AtomicBool::new(false),
            },
            InMemoryBidPlacedConsumer { rx },
        )
    }

    pub fn set_bid_placed_failing(&self, failing: bool) {
        self.fail_bid_placed.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn bid_results(&self) -> Vec<BidResult> {
        self.bid_results.lock().unwrap().clone()
    }

    pub fn auctions_ended(&self) -> Vec<AuctionEnded> {
        self.auctions_ended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_bid_placed(&self, event: &BidPlaced) -> Result<(), BusError> {
        if self.fail_bid_placed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BusError::Transient("bid-placed publish disabled for test".to_string()));
        }
        self.bid_placed_tx
            .send(event.clone())
            .map_err(|_| BusError::Transient("bid-placed consumer dropped".to_string()))
    }

    async fn publish_bid_result(&self, event: &BidResult) -> Result<(), BusError> {
        self.bid_results.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn publish_auction_ended(&self, event: &AuctionEnded) -> Result<(), BusError> {
        self.auctions_ended.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl BidPlacedConsumer for InMemoryBidPlacedConsumer {
    async fn recv(&mut self) -> Result<Option<Delivery>, BusError> {
        match self.rx.recv().await {
            Some(event) => Ok(Some(Delivery::new(event, || {}))),
            None => Ok(None),
        }
    }
}
