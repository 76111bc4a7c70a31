//! Expiry Finalizer (§4.5): periodic scan that closes expired auctions.
//! Tick-loop shape grounded on
//! `examples/other_examples/6af9dd92_10log10-tinylvt__api-src-scheduler.rs`'s
//! `Scheduler` (`time::interval`, per-item failures logged and swallowed
//! rather than aborting the tick).

use std::{
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
    instrument,
    warn,
};

use crate::{
    bus::{
        AuctionEnded,
        EventBus,
    },
    cache::Cache,
    domain::Auction,
    metrics_init,
    resilience::Envelope,
    store::Store,
};

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct Finalizer {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    cache: Arc<dyn Cache>,
    store_envelope: Arc<Envelope>,
    bus_envelope: Arc<Envelope>,
}

impl Finalizer {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn EventBus>,
        cache: Arc<dyn Cache>,
        store_envelope: Arc<Envelope>,
        bus_envelope: Arc<Envelope>,
    ) -> Self {
        Self {
            store,
            bus,
            cache,
            store_envelope,
            bus_envelope,
        }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("finalizer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep(&cancel).await;
                }
            }
        }
    }

    #[instrument(skip(self, cancel))]
    async fn sweep(&self, cancel: &CancellationToken) {
        let started = std::time::Instant::now();

        let store = Arc::clone(&self.store);
        let expired = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                async move { store.get_expired(Utc::now()).await }
            })
            .await;

        let expired = match expired {
            Ok(expired) => expired,
            Err(err) => {
                warn!(error = %err, "failed to scan for expired auctions, will retry next tick");
                return;
            }
        };

        for auction in expired {
            if let Err(err) = self.finalize_one(cancel, &auction).await {
                error!(auction_id = %auction.auction_id, error = %err, "failed to finalize expired auction, will retry next tick");
            }
        }

        metrics::histogram!(metrics_init::FINALIZER_SWEEP_DURATION).record(started.elapsed().as_millis() as f64);
    }

    async fn finalize_one(&self, cancel: &CancellationToken, auction: &Auction) -> Result<(), crate::store::StoreError> {
        let store = Arc::clone(&self.store);
        let auction_id = auction.auction_id.clone();
        let highest = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let auction_id = auction_id.clone();
                async move { store.highest_bid(&auction_id).await }
            })
            .await
            .map_err(|_| crate::store::StoreError::Transient("highest_bid exhausted retries".to_string()))?;

        let (winner_id, final_price): (Option<String>, Decimal) = match &highest {
            Some(bid) => (Some(bid.bidder_id.clone()), bid.amount),
            None => (None, auction.start_price),
        };

        let store = Arc::clone(&self.store);
        let auction_id = auction.auction_id.clone();
        let winner_id_for_store = winner_id.clone();
        self.store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let auction_id = auction_id.clone();
                let winner_id = winner_id_for_store.clone();
                async move { store.finish_auction(&auction_id, winner_id, final_price).await }
            })
            .await
            .map_err(|_| crate::store::StoreError::Transient("finish_auction exhausted retries".to_string()))?;

        self.cache.invalidate(&auction.auction_id).await;

        let store = Arc::clone(&self.store);
        let auction_id = auction.auction_id.clone();
        let total_bids = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let auction_id = auction_id.clone();
                async move { store.count_bids(&auction_id).await }
            })
            .await
            .unwrap_or_default();

        let event = AuctionEnded {
            auction_id: auction.auction_id.clone(),
            winner_id: winner_id.filter(|id| !id.is_empty()),
            final_price,
            total_bids,
        };

        // auction-ended delivery is best-effort (§4.5): retry through D, but
        // the auction is finished regardless of whether the event ever ships.
        let bus = Arc::clone(&self.bus);
        let publish_event = event.clone();
        let published = self
            .bus_envelope
            .call(cancel, move || {
                let bus = Arc::clone(&bus);
                let event = publish_event.clone();
                async move { bus.publish_auction_ended(&event).await }
            })
            .await;
        if let Err(err) = published {
            warn!(auction_id = %auction.auction_id, error = %err, "failed to publish auction-ended; auction is finished regardless");
        }

        metrics::counter!(metrics_init::AUCTIONS_FINALIZED).increment(1);
        info!(auction_id = %auction.auction_id, winner_id = ?event.winner_id, final_price = %final_price, total_bids, "auction finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        bus::memory::InMemoryEventBus,
        cache::NoopCache,
        domain::{
            AuctionStatus,
            CreateAuctionInput,
        },
        resilience::{
            CircuitBreakerConfig,
            RetryConfig,
            KAFKA_PRODUCER,
            POSTGRES,
        },
        store::memory::InMemoryStore,
    };

    fn finalizer_with(store: Arc<InMemoryStore>, bus: Arc<InMemoryEventBus>) -> Finalizer {
        Finalizer::new(
            store,
            bus,
            Arc::new(NoopCache),
            Arc::new(Envelope::new(POSTGRES, RetryConfig::default(), CircuitBreakerConfig::postgres_default())),
            Arc::new(Envelope::new(KAFKA_PRODUCER, RetryConfig::default(), CircuitBreakerConfig::kafka_producer_default())),
        )
    }

    #[tokio::test]
    async fn expired_auction_with_no_bids_finishes_with_start_price() {
        let store = Arc::new(InMemoryStore::new());
        let (bus, _consumer) = InMemoryEventBus::new();
        let bus = Arc::new(bus);

        let past = Utc::now() - chrono::Duration::seconds(1);
        store
            .create_auction(
                CreateAuctionInput {
                    auction_id: "a3".to_string(),
                    title: "t".to_string(),
                    description: "d".to_string(),
                    seller_id: "s1".to_string(),
                    start_price: dec!(10),
                    min_step: dec!(1),
                    duration_min: dec!(0.01),
                },
                past,
            )
            .await
            .unwrap();

        let finalizer = finalizer_with(Arc::clone(&store), Arc::clone(&bus));
        let cancel = CancellationToken::new();
        finalizer.sweep(&cancel).await;

        let auction = store.get_auction("a3").await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Finished);
        assert_eq!(auction.winner_id, None);
        assert_eq!(auction.current_bid, dec!(10));

        let ended = bus.auctions_ended();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].winner_id, None);
        assert_eq!(ended[0].final_price, dec!(10));
        assert_eq!(ended[0].total_bids, 0);
    }

    #[tokio::test]
    async fn expired_auction_with_accepted_bid_finishes_with_winner() {
        let store = Arc::new(InMemoryStore::new());
        let (bus, _consumer) = InMemoryEventBus::new();
        let bus = Arc::new(bus);

        let past = Utc::now() - chrono::Duration::seconds(1);
        store
            .create_auction(
                CreateAuctionInput {
                    auction_id: "a4".to_string(),
                    title: "t".to_string(),
                    description: "d".to_string(),
                    seller_id: "s1".to_string(),
                    start_price: dec!(10),
                    min_step: dec!(1),
                    duration_min: dec!(1),
                },
                past,
            )
            .await
            .unwrap();
        store.create_bid("b1", "a4", "u1", dec!(50)).await.unwrap();
        store
            .update_bid_status("b1", crate::domain::BidStatus::Accepted, None)
            .await
            .unwrap();
        store.update_current_bid("a4", dec!(50)).await.unwrap();

        let finalizer = finalizer_with(Arc::clone(&store), Arc::clone(&bus));
        let cancel = CancellationToken::new();
        finalizer.sweep(&cancel).await;

        let auction = store.get_auction("a4").await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Finished);
        assert_eq!(auction.winner_id.as_deref(), Some("u1"));
        assert_eq!(auction.current_bid, dec!(50));

        let ended = bus.auctions_ended();
        assert_eq!(ended[0].winner_id.as_deref(), Some("u1"));
        assert_eq!(ended[0].final_price, dec!(50));
        assert_eq!(ended[0].total_bids, 1);
    }

    #[tokio::test]
    async fn active_unexpired_auction_is_left_alone() {
        let store = Arc::new(InMemoryStore::new());
        let (bus, _consumer) = InMemoryEventBus::new();
        let bus = Arc::new(bus);

        store
            .create_auction(
                CreateAuctionInput {
                    auction_id: "a5".to_string(),
                    title: "t".to_string(),
                    description: "d".to_string(),
                    seller_id: "s1".to_string(),
                    start_price: dec!(10),
                    min_step: dec!(1),
                    duration_min: dec!(60),
                },
                Utc::now() + chrono::Duration::minutes(60),
            )
            .await
            .unwrap();

        let finalizer = finalizer_with(Arc::clone(&store), Arc::clone(&bus));
        let cancel = CancellationToken::new();
        finalizer.sweep(&cancel).await;

        let auction = store.get_auction("a5").await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Active);
        assert!(bus.auctions_ended().is_empty());
    }
}
