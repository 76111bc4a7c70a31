//! `sqlx`-backed implementation of [`super::Store`] against the schema of
//! §6.3. Grounded on the typed-query style of
//! `other_examples/4d55a85a_cowprotocol-services__...database-auctions.rs`
//! and the `#[tracing::instrument]` + `sqlx::query_as` idiom of
//! `other_examples/6af9dd92_10log10-tinylvt__...scheduler.rs`.

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use sqlx::{
    postgres::PgPoolOptions,
    PgPool,
};
use tracing::instrument;

use super::{
    Store,
    StoreError,
};
use crate::domain::{
    Auction,
    Bid,
    BidStatus,
    CreateAuctionInput,
};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str, max_pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(max_pool_size).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StoreError::AlreadyExists;
        }
        // A bid referencing a nonexistent auction trips the
        // `bids.auction_id REFERENCES auctions` FK rather than surfacing as
        // a row absent from a SELECT; map it onto the same NotFound a
        // missing-auction lookup would produce.
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Transient(other.to_string()),
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self))]
    async fn create_auction(&self, input: CreateAuctionInput, ends_at: DateTime<Utc>) -> Result<Auction, StoreError> {
        sqlx::query_as::<_, Auction>(
            r#"
            INSERT INTO auctions
                (auction_id, title, description, seller_id, start_price, min_step,
                 current_bid, status, winner_id, ends_at, created_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $5, 'ACTIVE', NULL, $7, now(), NULL)
            RETURNING *
            "#,
        )
        .bind(&input.auction_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.seller_id)
        .bind(input.start_price)
        .bind(input.min_step)
        .bind(ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn get_auction(&self, auction_id: &str) -> Result<Auction, StoreError> {
        sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Auction>, i64), StoreError> {
        let rows = sqlx::query_as::<_, Auction>(
            r#"
            SELECT * FROM auctions
            WHERE status = 'ACTIVE' AND ends_at > now()
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let total: i64 = sqlx::query_scalar("SELECT count(*) FROM auctions WHERE status = 'ACTIVE' AND ends_at > now()")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok((rows, total))
    }

    #[instrument(skip(self))]
    async fn update_current_bid(&self, auction_id: &str, amount: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE auctions SET current_bid = $1 WHERE auction_id = $2")
            .bind(amount)
            .bind(auction_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn finish_auction(
        &self,
        auction_id: &str,
        winner_id: Option<String>,
        final_price: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE auctions
            SET status = 'FINISHED', winner_id = $1, current_bid = $2, finished_at = now()
            WHERE auction_id = $3 AND status = 'ACTIVE'
            "#,
        )
        .bind(winner_id)
        .bind(final_price)
        .bind(auction_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Auction>, StoreError> {
        sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE status = 'ACTIVE' AND ends_at <= $1")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn create_bid(&self, bid_id: &str, auction_id: &str, bidder_id: &str, amount: Decimal) -> Result<Bid, StoreError> {
        sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (bid_id, auction_id, bidder_id, amount, status, reason, created_at)
            VALUES ($1, $2, $3, $4, 'PENDING', NULL, now())
            RETURNING *
            "#,
        )
        .bind(bid_id)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn get_bid(&self, bid_id: &str) -> Result<Bid, StoreError> {
        sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE bid_id = $1")
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn update_bid_status(&self, bid_id: &str, status: BidStatus, reason: Option<String>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE bids SET status = $1, reason = $2 WHERE bid_id = $3")
            .bind(status)
            .bind(reason)
            .bind(bid_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn highest_bid(&self, auction_id: &str) -> Result<Option<Bid>, StoreError> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT * FROM bids
            WHERE auction_id = $1 AND status IN ('PENDING', 'ACCEPTED')
            ORDER BY amount DESC
            LIMIT 1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn list_bids(&self, auction_id: &str, limit: i64) -> Result<Vec<Bid>, StoreError> {
        sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC LIMIT $2")
            .bind(auction_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn count_bids(&self, auction_id: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT count(*) FROM bids WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}
