//! In-memory `Store` fake for tests, mirroring the mutex-guarded
//! `BTreeMap` shape of
//! `other_examples/c8a453a5_matklad-sniper__...bidding_engine.rs`'s
//! `InMemoryBiddingStateStore`.

use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;

use super::{
    Store,
    StoreError,
};
use crate::domain::{
    Auction,
    AuctionStatus,
    Bid,
    BidStatus,
    CreateAuctionInput,
};

#[derive(Default)]
struct Inner {
    auctions: BTreeMap<String, Auction>,
    bids: BTreeMap<String, Bid>,
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_auction(&self, input: CreateAuctionInput, ends_at: DateTime<Utc>) -> Result<Auction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.auctions.contains_key(&input.auction_id) {
            return Err(StoreError::AlreadyExists);
        }
        let auction = Auction {
            auction_id: input.auction_id.clone(),
            title: input.title,
            description: input.description,
            seller_id: input.seller_id,
            start_price: input.start_price,
            min_step: input.min_step,
            current_bid: input.start_price,
            status: AuctionStatus::Active,
            winner_id: None,
            ends_at,
            created_at: Utc::now(),
            finished_at: None,
        };
        inner.auctions.insert(input.auction_id, auction.clone());
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: &str) -> Result<Auction, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .auctions
            .get(auction_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Auction>, i64), StoreError> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut active: Vec<Auction> = inner
            .auctions
            .values()
            .filter(|a| a.is_active() && a.ends_at > now)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = active.len() as i64;
        let page = active
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_current_bid(&self, auction_id: &str, amount: Decimal) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let auction = inner.auctions.get_mut(auction_id).ok_or(StoreError::NotFound)?;
        auction.current_bid = amount;
        Ok(())
    }

    async fn finish_auction(
        &self,
        auction_id: &str,
        winner_id: Option<String>,
        final_price: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let auction = inner.auctions.get_mut(auction_id).ok_or(StoreError::NotFound)?;
        if !auction.is_active() {
            return Err(StoreError::NotFound);
        }
        auction.status = AuctionStatus::Finished;
        auction.winner_id = winner_id;
        auction.current_bid = final_price;
        auction.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .auctions
            .values()
            .filter(|a| a.is_active() && a.ends_at <= now)
            .cloned()
            .collect())
    }

    async fn create_bid(&self, bid_id: &str, auction_id: &str, bidder_id: &str, amount: Decimal) -> Result<Bid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.bids.contains_key(bid_id) {
            return Err(StoreError::AlreadyExists);
        }
        if !inner.auctions.contains_key(auction_id) {
            return Err(StoreError::NotFound);
        }
        let bid = Bid {
            bid_id: bid_id.to_string(),
            auction_id: auction_id.to_string(),
            bidder_id: bidder_id.to_string(),
            amount,
            status: BidStatus::Pending,
            reason: None,
            created_at: Utc::now(),
        };
        inner.bids.insert(bid_id.to_string(), bid.clone());
        Ok(bid)
    }

    async fn get_bid(&self, bid_id: &str) -> Result<Bid, StoreError> {
        self.inner.lock().unwrap().bids.get(bid_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_bid_status(&self, bid_id: &str, status: BidStatus, reason: Option<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let bid = inner.bids.get_mut(bid_id).ok_or(StoreError::NotFound)?;
        bid.status = status;
        bid.reason = reason;
        Ok(())
    }

    async fn highest_bid(&self, auction_id: &str) -> Result<Option<Bid>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bids
            .values()
            .filter(|b| b.auction_id == auction_id && matches!(b.status, BidStatus::Pending | BidStatus::Accepted))
            .max_by(|a, b| a.amount.cmp(&b.amount).then(b.created_at.cmp(&a.created_at)))
            .cloned())
    }

    async fn list_bids(&self, auction_id: &str, limit: i64) -> Result<Vec<Bid>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut bids: Vec<Bid> = inner.bids.values().filter(|b| b.auction_id == auction_id).cloned().collect();
        bids.sort_by(|a, b| b.amount.cmp(&a.amount));
        bids.truncate(limit.max(0) as usize);
        Ok(bids)
    }

    async fn count_bids(&self, auction_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bids
            .values()
            .filter(|b| b.auction_id == auction_id)
            .count() as i64)
    }
}
