//! Durable store (§4.1): auctions and bids, strongly consistent, the
//! platform's single source of truth.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;

use crate::{
    domain::{
        Auction,
        Bid,
        BidStatus,
        CreateAuctionInput,
    },
    resilience::Retriable,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl Retriable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Transactional operations over auctions and bids (§4.1). Implemented by
/// [`postgres::PostgresStore`] for production and [`memory::InMemoryStore`]
/// for tests.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_auction(&self, input: CreateAuctionInput, ends_at: DateTime<Utc>) -> Result<Auction, StoreError>;

    async fn get_auction(&self, auction_id: &str) -> Result<Auction, StoreError>;

    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Auction>, i64), StoreError>;

    async fn update_current_bid(&self, auction_id: &str, amount: Decimal) -> Result<(), StoreError>;

    async fn finish_auction(
        &self,
        auction_id: &str,
        winner_id: Option<String>,
        final_price: Decimal,
    ) -> Result<(), StoreError>;

    /// Auctions with `status = ACTIVE ∧ ends_at ≤ now`.
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError>;

    async fn create_bid(&self, bid_id: &str, auction_id: &str, bidder_id: &str, amount: Decimal) -> Result<Bid, StoreError>;

    async fn get_bid(&self, bid_id: &str) -> Result<Bid, StoreError>;

    async fn update_bid_status(&self, bid_id: &str, status: BidStatus, reason: Option<String>) -> Result<(), StoreError>;

    /// Highest bid with status ∈ {PENDING, ACCEPTED}, ordered by amount desc.
    async fn highest_bid(&self, auction_id: &str) -> Result<Option<Bid>, StoreError>;

    async fn list_bids(&self, auction_id: &str, limit: i64) -> Result<Vec<Bid>, StoreError>;

    async fn count_bids(&self, auction_id: &str) -> Result<i64, StoreError>;
}
