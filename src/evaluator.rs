//! Bid Evaluator (§4.4): the per-auction-serialized worker that decides
//! acceptance. Consumer loop shape grounded on
//! `examples/astriaorg-astria/crates/astria-bridge-withdrawer/src/withdrawer/submitter/mod.rs`'s
//! `Submitter::run` (`select!` over shutdown + channel recv, structured
//! logging, no-ack-on-contention).

use std::{
    future::Future,
    sync::Arc,
};

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::{
    bus::{
        BidPlaced,
        BidPlacedConsumer,
        BidResult,
        BidResultStatus,
        EventBus,
    },
    cache::Cache,
    domain::{
        AuctionStatus,
        BidStatus,
    },
    lock::DistributedLock,
    resilience::{
        Envelope,
        EnvelopeError,
    },
    store::{
        Store,
        StoreError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("lock service error: {0}")]
    Lock(#[from] crate::lock::LockError),
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl From<EnvelopeError<StoreError>> for EvaluationError {
    fn from(err: EnvelopeError<StoreError>) -> Self {
        match err {
            EnvelopeError::Upstream(err) => EvaluationError::Store(err),
            EnvelopeError::CircuitOpen(name) => {
                EvaluationError::Store(StoreError::Transient(format!("circuit open for dependency {name}")))
            }
            EnvelopeError::Cancelled => EvaluationError::Store(StoreError::Transient("operation cancelled".to_string())),
        }
    }
}

pub struct Evaluator {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    lock: Arc<dyn DistributedLock>,
    cache: Arc<dyn Cache>,
    store_envelope: Arc<Envelope>,
    bus_envelope: Arc<Envelope>,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn EventBus>,
        lock: Arc<dyn DistributedLock>,
        cache: Arc<dyn Cache>,
        store_envelope: Arc<Envelope>,
        bus_envelope: Arc<Envelope>,
    ) -> Self {
        Self {
            store,
            bus,
            lock,
            cache,
            store_envelope,
            bus_envelope,
        }
    }

    /// Routes a single store call through the resilience envelope (§4.2,
    /// §2: "all store and bus calls flow through D").
    async fn store_call<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, EvaluationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.store_envelope.call(cancel, op).await.map_err(Into::into)
    }

    /// Consumes `consumer` until `cancel` fires. Each message: acquire the
    /// per-auction lock, evaluate, ack iff every write succeeded.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, mut consumer: Box<dyn BidPlacedConsumer>) {
        loop {
            let delivery = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("evaluator shutting down, stopping bid-placed consumer");
                    break;
                }
                delivery = consumer.recv() => delivery,
            };

            let delivery = match delivery {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("bid-placed consumer closed, stopping evaluator");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "bid-placed consumer recv failed, retrying");
                    continue;
                }
            };

            let event = delivery.event.clone();
            match self.evaluate_once(&cancel, event).await {
                Ok(Acknowledged::Yes) => delivery.ack(),
                Ok(Acknowledged::No) => {
                    metrics::counter!(crate::metrics_init::LOCK_ACQUIRE_FAILURES).increment(1);
                    debug!(bid_id = %delivery.event.bid_id, "lock contended, leaving unacknowledged for redelivery");
                }
                Err(err) => {
                    warn!(bid_id = %delivery.event.bid_id, error = %err, "evaluation failed, leaving unacknowledged for redelivery");
                }
            }
        }
    }

    /// Evaluates a single bid-placed event. Used both by the consumer loop
    /// in [`Self::run`] and by the submission-side local fallback
    /// (§4.3 step 4), so it must be safe to call without a surrounding bus
    /// delivery.
    #[instrument(skip(self, cancel), fields(bid_id = %event.bid_id, auction_id = %event.auction_id))]
    pub async fn evaluate_once(
        &self,
        cancel: &CancellationToken,
        event: BidPlaced,
    ) -> Result<Acknowledged, EvaluationError> {
        let Some(guard) = self.lock.try_acquire(&event.auction_id).await? else {
            debug!("auction lock held by another evaluator, not acknowledging");
            return Ok(Acknowledged::No);
        };

        let outcome = self.evaluate_under_lock(cancel, &event).await;

        if let Err(release_err) = self.lock.release(guard).await {
            warn!(error = %release_err, "failed to release auction lock (token mismatch or expiry)");
        }

        outcome
    }

    async fn evaluate_under_lock(
        &self,
        cancel: &CancellationToken,
        event: &BidPlaced,
    ) -> Result<Acknowledged, EvaluationError> {
        // Idempotency fence: if a previous delivery already made this bid
        // terminal, redelivery must not re-evaluate it.
        let store = Arc::clone(&self.store);
        let bid_id = event.bid_id.clone();
        let bid = self
            .store_call(cancel, move || {
                let store = Arc::clone(&store);
                let bid_id = bid_id.clone();
                async move { store.get_bid(&bid_id).await }
            })
            .await?;
        if bid.status.is_terminal() {
            debug!(status = ?bid.status, "bid already terminal, skipping re-evaluation");
            return Ok(Acknowledged::Yes);
        }

        let store = Arc::clone(&self.store);
        let auction_id = event.auction_id.clone();
        let auction = match self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let auction_id = auction_id.clone();
                async move { store.get_auction(&auction_id).await }
            })
            .await
        {
            Ok(auction) => auction,
            Err(EnvelopeError::Upstream(StoreError::NotFound)) => {
                self.reject(cancel, event, "auction not found".to_string()).await?;
                return Ok(Acknowledged::Yes);
            }
            Err(err) => return Err(err.into()),
        };

        if !matches!(auction.status, AuctionStatus::Active) {
            self.reject(cancel, event, "auction ended".to_string()).await?;
            return Ok(Acknowledged::Yes);
        }

        if event.bidder_id == auction.seller_id {
            self.reject(cancel, event, "seller cannot bid".to_string()).await?;
            return Ok(Acknowledged::Yes);
        }

        let minimum = auction.current_bid + auction.min_step;
        if event.amount < minimum {
            self.reject(cancel, event, format!("bid must be \u{2265} {minimum:.2}")).await?;
            return Ok(Acknowledged::Yes);
        }

        self.accept(cancel, event, &auction.auction_id, event.amount).await?;
        Ok(Acknowledged::Yes)
    }

    async fn accept(
        &self,
        cancel: &CancellationToken,
        event: &BidPlaced,
        auction_id: &str,
        amount: Decimal,
    ) -> Result<(), EvaluationError> {
        let store = Arc::clone(&self.store);
        let auction_id_owned = auction_id.to_string();
        self.store_call(cancel, move || {
            let store = Arc::clone(&store);
            let auction_id = auction_id_owned.clone();
            async move { store.update_current_bid(&auction_id, amount).await }
        })
        .await?;

        let store = Arc::clone(&self.store);
        let bid_id = event.bid_id.clone();
        self.store_call(cancel, move || {
            let store = Arc::clone(&store);
            let bid_id = bid_id.clone();
            async move { store.update_bid_status(&bid_id, BidStatus::Accepted, None).await }
        })
        .await?;

        self.cache.invalidate(auction_id).await;

        let result = BidResult {
            bid_id: event.bid_id.clone(),
            auction_id: event.auction_id.clone(),
            bidder_id: event.bidder_id.clone(),
            amount: event.amount,
            status: BidResultStatus::Accepted,
            reason: None,
        };
        self.publish_bid_result(cancel, result).await;

        metrics::counter!(crate::metrics_init::BIDS_ACCEPTED).increment(1);
        info!(auction_id, amount = %event.amount, "bid accepted");
        Ok(())
    }

    async fn reject(&self, cancel: &CancellationToken, event: &BidPlaced, reason: String) -> Result<(), EvaluationError> {
        let store = Arc::clone(&self.store);
        let bid_id = event.bid_id.clone();
        let reason_owned = reason.clone();
        self.store_call(cancel, move || {
            let store = Arc::clone(&store);
            let bid_id = bid_id.clone();
            let reason = reason_owned.clone();
            async move { store.update_bid_status(&bid_id, BidStatus::Rejected, Some(reason)).await }
        })
        .await?;

        let result = BidResult {
            bid_id: event.bid_id.clone(),
            auction_id: event.auction_id.clone(),
            bidder_id: event.bidder_id.clone(),
            amount: event.amount,
            status: BidResultStatus::Rejected,
            reason: Some(reason.clone()),
        };
        self.publish_bid_result(cancel, result).await;

        metrics::counter!(crate::metrics_init::BIDS_REJECTED).increment(1);
        info!(auction_id = %event.auction_id, reason, "bid rejected");
        Ok(())
    }

    /// bid-result delivery is best-effort (§5 iv): route the publish through
    /// D so a transient bus failure is retried, but never fail the
    /// evaluation over it once retries are exhausted.
    async fn publish_bid_result(&self, cancel: &CancellationToken, result: BidResult) {
        let bus = Arc::clone(&self.bus);
        let outcome = self
            .bus_envelope
            .call(cancel, move || {
                let bus = Arc::clone(&bus);
                let result = result.clone();
                async move { bus.publish_bid_result(&result).await }
            })
            .await;
        if let Err(err) = outcome {
            warn!(error = %err, "failed to publish bid-result; bid-result delivery is best-effort");
        }
    }
}

/// Whether the caller should consider this bid-placed delivery processed.
/// Kept distinct from a plain bool so call sites read clearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledged {
    Yes,
    No,
}
