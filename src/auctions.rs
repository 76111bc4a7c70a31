//! Auction read/write surface backing the HTTP handlers in `api::auction`
//! (§6.1 `/auction/create`, `/auction/get`, `/auction/list`). Thin compared
//! to [`crate::submission::Submitter`]: creation and reads have no async
//! evaluation stage of their own, just the store (through the resilience
//! envelope) and the best-effort cache.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cache::Cache,
    domain::{
        Auction,
        CreateAuctionInput,
        DomainError,
    },
    resilience::Envelope,
    store::Store,
    submission::compute_ends_at,
};

pub struct AuctionService {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    store_envelope: Arc<Envelope>,
    cache_ttl_secs: u64,
}

impl AuctionService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, store_envelope: Arc<Envelope>, cache_ttl_secs: u64) -> Self {
        Self {
            store,
            cache,
            store_envelope,
            cache_ttl_secs,
        }
    }

    pub async fn create(&self, cancel: &CancellationToken, input: CreateAuctionInput) -> Result<Auction, DomainError> {
        validate_create(&input)?;

        let ends_at = compute_ends_at(input.duration_min);
        let store = Arc::clone(&self.store);
        let create_input = input.clone();
        let auction = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let input = create_input.clone();
                async move { store.create_auction(input, ends_at).await }
            })
            .await?;

        self.cache.put_auction(&auction, self.cache_ttl_secs).await;
        Ok(auction)
    }

    /// Cache-first read. A cache miss or a disabled cache falls through to
    /// the store; the store is always authoritative (§9).
    pub async fn get(&self, cancel: &CancellationToken, auction_id: &str) -> Result<Auction, DomainError> {
        if let Some(auction) = self.cache.get_auction(auction_id).await {
            return Ok(auction);
        }

        let store = Arc::clone(&self.store);
        let id = auction_id.to_string();
        let auction = self
            .store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                let id = id.clone();
                async move { store.get_auction(&id).await }
            })
            .await?;

        self.cache.put_auction(&auction, self.cache_ttl_secs).await;
        Ok(auction)
    }

    /// `list_active` only (§6.1, §9): expired-but-unfinalized auctions stay
    /// invisible to this read path until the finalizer runs, by design.
    pub async fn list(&self, cancel: &CancellationToken, limit: i64, offset: i64) -> Result<(Vec<Auction>, i64), DomainError> {
        let store = Arc::clone(&self.store);
        self.store_envelope
            .call(cancel, move || {
                let store = Arc::clone(&store);
                async move { store.list_active(limit, offset).await }
            })
            .await
            .map_err(Into::into)
    }
}

fn validate_create(input: &CreateAuctionInput) -> Result<(), DomainError> {
    if input.auction_id.trim().is_empty() || input.seller_id.trim().is_empty() || input.title.trim().is_empty() {
        return Err(DomainError::Validation(
            "auction_id, seller_id, title must be non-empty".to_string(),
        ));
    }
    if input.start_price <= rust_decimal::Decimal::ZERO {
        return Err(DomainError::Validation("start_price must be > 0".to_string()));
    }
    if input.min_step <= rust_decimal::Decimal::ZERO {
        return Err(DomainError::Validation("min_step must be > 0".to_string()));
    }
    if input.duration_min <= rust_decimal::Decimal::ZERO {
        return Err(DomainError::Validation("duration_min must be > 0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        cache::NoopCache,
        resilience::{
            CircuitBreakerConfig,
            RetryConfig,
        },
        store::memory::InMemoryStore,
    };

    fn service() -> AuctionService {
        AuctionService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(NoopCache),
            Arc::new(Envelope::new(
                crate::resilience::POSTGRES,
                RetryConfig::default(),
                CircuitBreakerConfig::postgres_default(),
            )),
            30,
        )
    }

    fn create_input(id: &str) -> CreateAuctionInput {
        CreateAuctionInput {
            auction_id: id.to_string(),
            title: "a vintage lamp".to_string(),
            description: "barely used".to_string(),
            seller_id: "s1".to_string(),
            start_price: dec!(10),
            min_step: dec!(1),
            duration_min: dec!(1),
        }
    }

    #[tokio::test]
    async fn create_rejects_non_positive_start_price() {
        let svc = service();
        let cancel = CancellationToken::new();
        let mut input = create_input("a1");
        input.start_price = dec!(0);
        let err = svc.create(&cancel, input).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let svc = service();
        let cancel = CancellationToken::new();
        let created = svc.create(&cancel, create_input("a1")).await.unwrap();
        assert_eq!(created.current_bid, created.start_price);
        let fetched = svc.get(&cancel, "a1").await.unwrap();
        assert_eq!(fetched.auction_id, "a1");
    }

    #[tokio::test]
    async fn duplicate_auction_id_is_a_conflict() {
        let svc = service();
        let cancel = CancellationToken::new();
        svc.create(&cancel, create_input("a1")).await.unwrap();
        let err = svc.create(&cancel, create_input("a1")).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists));
    }
}
