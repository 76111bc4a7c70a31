//! Read cache (§4.4, §9): a best-effort projection of the auction row,
//! invalidated whenever the evaluator accepts a bid. Never consulted by the
//! evaluator itself, only by read paths (`GET /auction/get`).

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::domain::Auction;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_auction(&self, auction_id: &str) -> Option<Auction>;
    async fn put_auction(&self, auction: &Auction, ttl_secs: u64);
    async fn invalidate(&self, auction_id: &str);
}

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(auction_id: &str) -> String {
        format!("cache:auction:{auction_id}")
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_auction(&self, auction_id: &str) -> Option<Auction> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(auction_id)).await.ok()?;
        raw.and_then(|json| serde_json::from_str(&json).ok())
    }

    async fn put_auction(&self, auction: &Auction, ttl_secs: u64) {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        if let Ok(json) = serde_json::to_string(auction) {
            let _: Result<(), _> = conn.set_ex(Self::key(&auction.auction_id), json, ttl_secs).await;
        }
    }

    async fn invalidate(&self, auction_id: &str) {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: Result<(), _> = conn.del(Self::key(auction_id)).await;
    }
}

/// Used when `cache_addr` is unset: every read is a miss, every write a
/// no-op. Keeps the read path correct (store remains authoritative) without
/// requiring Redis for deployments that don't want the cache layer.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get_auction(&self, _auction_id: &str) -> Option<Auction> {
        None
    }

    async fn put_auction(&self, _auction: &Auction, _ttl_secs: u64) {}

    async fn invalidate(&self, _auction_id: &str) {}
}
