//! Bid Submission (§4.3): synchronous, durable, best-effort-published.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    warn,
};

use crate::{
    bus::{
        BidPlaced,
        EventBus,
    },
    domain::{
        Bid,
        DomainError,
        PlaceBidInput,
    },
    evaluator::Evaluator,
    resilience::{
        Envelope,
        EnvelopeError,
    },
    store::{
        Store,
        StoreError,
    },
};

impl From<EnvelopeError<StoreError>> for DomainError {
    fn from(err: EnvelopeError<StoreError>) -> Self {
        match err {
            EnvelopeError::CircuitOpen(name) => DomainError::CircuitOpen(name),
            EnvelopeError::Cancelled => DomainError::Cancelled,
            EnvelopeError::Upstream(StoreError::NotFound) => DomainError::NotFound,
            EnvelopeError::Upstream(StoreError::AlreadyExists) => DomainError::AlreadyExists,
            EnvelopeError::Upstream(StoreError::Transient(msg)) => DomainError::Transient(msg),
        }
    }
}

pub struct Submitter {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    store_envelope: Arc<Envelope>,
    bus_envelope: Arc<Envelope>,
    /// Used for the step-4 local fallback when publish is exhausted but the
    /// breaker still permits dependency calls.
    evaluator: Arc<Evaluator>,
}

impl Submitter {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn EventBus>,
        store_envelope: Arc<Envelope>,
        bus_envelope: Arc<Envelope>,
        evaluator: Arc<Evaluator>,
    ) -> Self {
        Self {
            store,
            bus,
            store_envelope,
            bus_envelope,
            evaluator,
        }
    }

    pub async fn place_bid(&self, cancel: &CancellationToken, input: PlaceBidInput) -> Result<Bid, DomainError> {
        if input.bid_id.trim().is_empty() || input.auction_id.trim().is_empty() || input.bidder_id.trim().is_empty() {
            return Err(DomainError::Validation("bid_id, auction_id, bidder_id must be non-empty".to_string()));
        }
        if input.amount <= rust_decimal::Decimal::ZERO {
            return Err(DomainError::Validation("amount must be > 0".to_string()));
        }

        let store = Arc::clone(&self.store);
        let create_input = input.clone();
        let bid = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let input = create_input.clone();
                async move { store.create_bid(&input.bid_id, &input.auction_id, &input.bidder_id, input.amount).await }
            })
            .await?;

        let event = BidPlaced {
            bid_id: bid.bid_id.clone(),
            auction_id: bid.auction_id.clone(),
            bidder_id: bid.bidder_id.clone(),
            amount: bid.amount,
            timestamp: bid.created_at,
        };

        let bus = Arc::clone(&self.bus);
        let publish_event = event.clone();
        let published = self
            .bus_envelope
            .call(cancel, move || {
                let bus = Arc::clone(&bus);
                let event = publish_event.clone();
                async move { bus.publish_bid_placed(&event).await }
            })
            .await;

        if let Err(err) = published {
            metrics::counter!(crate::metrics_init::BID_PLACED_FALLBACK_INVOKED).increment(1);
            warn!(
                bid_id = %bid.bid_id,
                auction_id = %bid.auction_id,
                error = %err,
                "bid-placed publish exhausted retries, falling back to inline evaluation"
            );
            if let Err(err) = self.evaluator.evaluate_once(cancel, event).await {
                error!(
                    bid_id = %bid.bid_id,
                    auction_id = %bid.auction_id,
                    error = %err,
                    "local-fallback evaluation failed; bid remains PENDING until redelivered"
                );
            }
        }

        Ok(bid)
    }
}

/// `ends_at = now() + duration_min` minutes, used by auction creation.
pub fn compute_ends_at(duration_min: rust_decimal::Decimal) -> chrono::DateTime<Utc> {
    let millis = (duration_min * rust_decimal::Decimal::from(60_000))
        .round()
        .to_string()
        .parse::<i64>()
        .unwrap_or(0);
    Utc::now() + chrono::Duration::milliseconds(millis)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        bus::memory::InMemoryEventBus,
        cache::NoopCache,
        domain::{
            BidStatus,
            CreateAuctionInput,
        },
        lock::InMemoryLock,
        resilience::{
            CircuitBreakerConfig,
            RetryConfig,
            KAFKA_PRODUCER,
            POSTGRES,
        },
        store::memory::InMemoryStore,
    };

    fn submitter_with(
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryEventBus>,
    ) -> Submitter {
        let store_envelope = Arc::new(Envelope::new(POSTGRES, RetryConfig::default(), CircuitBreakerConfig::postgres_default()));
        let bus_envelope = Arc::new(Envelope::new(
            KAFKA_PRODUCER,
            RetryConfig {
                max_attempts: 2,
                initial_wait: std::time::Duration::from_millis(1),
                max_wait: std::time::Duration::from_millis(5),
                multiplier: 2.0,
            },
            CircuitBreakerConfig::kafka_producer_default(),
        ));
        let evaluator = Arc::new(Evaluator::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::new(InMemoryLock::new()),
            Arc::new(NoopCache),
            Arc::clone(&store_envelope),
            Arc::clone(&bus_envelope),
        ));
        Submitter::new(store, bus, store_envelope, bus_envelope, evaluator)
    }

    fn place_input(bid_id: &str, auction_id: &str, bidder: &str, amount: rust_decimal::Decimal) -> PlaceBidInput {
        PlaceBidInput {
            bid_id: bid_id.to_string(),
            auction_id: auction_id.to_string(),
            bidder_id: bidder.to_string(),
            amount,
        }
    }

    async fn seed_auction(store: &InMemoryStore, id: &str, seller: &str) {
        store
            .create_auction(
                CreateAuctionInput {
                    auction_id: id.to_string(),
                    title: "t".to_string(),
                    description: "d".to_string(),
                    seller_id: seller.to_string(),
                    start_price: dec!(10),
                    min_step: dec!(1),
                    duration_min: dec!(1),
                },
                chrono::Utc::now() + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_empty_ids_and_non_positive_amount() {
        let store = Arc::new(InMemoryStore::new());
        let (bus, _c) = InMemoryEventBus::new();
        let bus = Arc::new(bus);
        let submitter = submitter_with(store, bus);
        let cancel = CancellationToken::new();

        let err = submitter.place_bid(&cancel, place_input("", "a1", "u1", dec!(10))).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = submitter.place_bid(&cancel, place_input("b1", "a1", "u1", dec!(0))).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_bid_id_surfaces_as_conflict() {
        let store = Arc::new(InMemoryStore::new());
        seed_auction(&store, "a1", "s1").await;
        let (bus, _c) = InMemoryEventBus::new();
        let bus = Arc::new(bus);
        let submitter = submitter_with(Arc::clone(&store), bus);
        let cancel = CancellationToken::new();

        submitter.place_bid(&cancel, place_input("b1", "a1", "u1", dec!(12))).await.unwrap();
        let err = submitter.place_bid(&cancel, place_input("b1", "a1", "u1", dec!(13))).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists));
    }

    #[tokio::test]
    async fn successful_submission_returns_pending_bid() {
        let store = Arc::new(InMemoryStore::new());
        seed_auction(&store, "a1", "s1").await;
        let (bus, _c) = InMemoryEventBus::new();
        let bus = Arc::new(bus);
        let submitter = submitter_with(Arc::clone(&store), bus);
        let cancel = CancellationToken::new();

        let bid = submitter.place_bid(&cancel, place_input("b1", "a1", "u1", dec!(12))).await.unwrap();
        assert_eq!(bid.status, BidStatus::Pending);
        assert_eq!(bid.amount, dec!(12));
    }

    #[tokio::test]
    async fn publish_failure_falls_back_to_inline_evaluation() {
        let store = Arc::new(InMemoryStore::new());
        seed_auction(&store, "a1", "s1").await;
        let (bus, _c) = InMemoryEventBus::new();
        bus.set_bid_placed_failing(true);
        let bus = Arc::new(bus);
        let submitter = submitter_with(Arc::clone(&store), Arc::clone(&bus));
        let cancel = CancellationToken::new();

        submitter.place_bid(&cancel, place_input("b1", "a1", "u1", dec!(12))).await.unwrap();

        // bid-placed publish was disabled, so the bid must have reached a
        // terminal status via the local-fallback evaluation, not the
        // (never-delivered) consumer path.
        let bid = store.get_bid("b1").await.unwrap();
        assert_eq!(bid.status, BidStatus::Accepted);
        assert_eq!(store.get_auction("a1").await.unwrap().current_bid, dec!(12));
    }
}
