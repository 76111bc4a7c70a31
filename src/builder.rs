//! Wires a loaded [`Config`] into a runnable [`Service`]. Field-struct
//! `Builder` idiom grounded on
//! `astria-bridge-withdrawer/src/withdrawer/submitter/builder.rs`.

use std::sync::Arc;

use eyre::{
    Result,
    WrapErr as _,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use redis::aio::ConnectionManager;

use crate::{
    api::AppState,
    auctions::AuctionService,
    bus::{
        kafka::{
            KafkaBidPlacedConsumer,
            KafkaEventBus,
        },
        BidPlacedConsumer,
        EventBus,
    },
    cache::{
        Cache,
        NoopCache,
        RedisCache,
    },
    config::Config,
    evaluator::Evaluator,
    finalizer::Finalizer,
    lock::{
        DistributedLock,
        RedisLock,
    },
    rate_limit::RateLimiterMap,
    resilience::{
        Envelope,
        KAFKA_PRODUCER,
        POSTGRES,
    },
    service::{
        Service,
        ShutdownHandle,
    },
    store::{
        postgres::PostgresStore,
        Store,
    },
    submission::Submitter,
};

pub struct Builder {
    pub config: Config,
}

impl Builder {
    /// Connects to Postgres, Redis and Kafka and assembles a [`Service`]
    /// ready to [`Service::run`]. Returns the service paired with the
    /// [`ShutdownHandle`] the caller uses to trigger a graceful shutdown.
    pub async fn build(self) -> Result<(Service, ShutdownHandle)> {
        let Config {
            http_address,
            store_url,
            store_max_pool_size,
            bus_brokers,
            bid_placed_topic,
            bid_result_topic,
            auction_ended_topic,
            consumer_group_id,
            cache_addr,
            cache_password,
            cache_db,
            cache_ttl_secs,
            rate_limit_rps,
            rate_limit_burst,
            log_level: _,
            ..
        } = self.config.clone();

        let postgres_store = PostgresStore::connect(&store_url, store_max_pool_size)
            .await
            .wrap_err("failed to connect to postgres store")?;
        postgres_store
            .migrate()
            .await
            .wrap_err("failed to run database migrations")?;
        let store: Arc<dyn Store> = Arc::new(postgres_store);

        let bus: Arc<dyn EventBus> = Arc::new(
            KafkaEventBus::new(&bus_brokers, &bid_placed_topic, &bid_result_topic, &auction_ended_topic)
                .wrap_err("failed to construct kafka producer")?,
        );
        let bid_placed_consumer: Box<dyn BidPlacedConsumer> =
            Box::new(KafkaBidPlacedConsumer::new(&bus_brokers, &bid_placed_topic, &consumer_group_id).wrap_err("failed to construct kafka consumer")?);

        let redis_client = redis::Client::open(redis_url(&cache_addr, cache_password.as_deref(), cache_db))
            .wrap_err("failed to parse redis url")?;
        let redis_conn = ConnectionManager::new(redis_client)
            .await
            .wrap_err("failed to connect to redis")?;
        let lock: Arc<dyn DistributedLock> = Arc::new(RedisLock::new(redis_conn.clone()));
        let cache: Arc<dyn Cache> = if cache_addr.is_empty() {
            Arc::new(NoopCache)
        } else {
            Arc::new(RedisCache::new(redis_conn))
        };

        let store_envelope = Arc::new(Envelope::new(POSTGRES, self.config.retry_config(), self.config.postgres_breaker_config()));
        let bus_envelope = Arc::new(Envelope::new(
            KAFKA_PRODUCER,
            self.config.retry_config(),
            self.config.kafka_producer_breaker_config(),
        ));

        let evaluator = Arc::new(Evaluator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            lock,
            Arc::clone(&cache),
            Arc::clone(&store_envelope),
            Arc::clone(&bus_envelope),
        ));
        let submitter = Arc::new(Submitter::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&store_envelope),
            Arc::clone(&bus_envelope),
            Arc::clone(&evaluator),
        ));
        let auctions = Arc::new(AuctionService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&store_envelope),
            cache_ttl_secs,
        ));
        let finalizer = Arc::new(Finalizer::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            cache,
            Arc::clone(&store_envelope),
            Arc::clone(&bus_envelope),
        ));

        let rate_limiter = Arc::new(RateLimiterMap::new(rate_limit_rps, rate_limit_burst));
        let prometheus = PrometheusBuilder::new()
            .install_recorder()
            .wrap_err("failed to install prometheus recorder")?;

        let shutdown_handle = ShutdownHandle::new();
        let app_state = AppState {
            auctions,
            submitter,
            store,
            store_envelope,
            bus_envelope,
            rate_limiter,
            prometheus,
            shutdown: shutdown_handle.token(),
        };

        let service = Service::new(shutdown_handle.token(), http_address, app_state, evaluator, bid_placed_consumer, finalizer);
        Ok((service, shutdown_handle))
    }
}

fn redis_url(addr: &str, password: Option<&str>, db: i64) -> String {
    match password.filter(|p| !p.is_empty()) {
        Some(password) => format!("redis://:{password}@{}/{db}", strip_scheme(addr)),
        None => format!("redis://{}/{db}", strip_scheme(addr)),
    }
}

fn strip_scheme(addr: &str) -> &str {
    addr.trim_start_matches("redis://")
}
