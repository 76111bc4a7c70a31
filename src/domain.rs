//! Core data model: auctions, bids, and the error taxonomy of §7.

use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub auction_id: String,
    pub title: String,
    pub description: String,
    pub seller_id: String,
    pub start_price: Decimal,
    pub min_step: Decimal,
    pub current_bid: Decimal,
    pub status: AuctionStatus,
    /// Empty until finished; may remain empty if no valid bids were received.
    pub winner_id: Option<String>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Auction {
    pub fn is_active(&self) -> bool {
        matches!(self.status, AuctionStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Decimal,
    pub status: BidStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input to [`crate::submission::Submitter::place_bid`].
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBidInput {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Decimal,
}

/// Input to auction creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuctionInput {
    pub auction_id: String,
    pub title: String,
    pub description: String,
    pub seller_id: String,
    pub start_price: Decimal,
    pub min_step: Decimal,
    pub duration_min: Decimal,
}

/// The error taxonomy of §7, shared by the store, bus, lock, and cache
/// collaborators and by the HTTP and evaluation layers that consume them.
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    #[error("invalid request parameters: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("auction ended")]
    AuctionEnded,
    #[error("bid must be \u{2265} {minimum}")]
    BidTooLow { minimum: Decimal },
    #[error("seller cannot bid")]
    SellerCannotBid,
    #[error("dependency unavailable: {0}")]
    Transient(String),
    #[error("circuit open for dependency {0}")]
    CircuitOpen(&'static str),
    #[error("cancelled")]
    Cancelled,
}

impl DomainError {
    /// Whether this error represents a client-facing conflict (§7, not
    /// retried).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists | Self::AuctionEnded | Self::BidTooLow { .. } | Self::SellerCannotBid
        )
    }
}
