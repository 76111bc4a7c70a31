//! Wires the bid lifecycle pipeline (submission -> bus -> evaluator) against
//! the in-process fakes and exposes it behind the real `axum::Router` so
//! these tests drive the actual HTTP surface rather than calling service
//! methods directly. Shape grounded on
//! `astria-bridge-withdrawer/tests/blackbox/helpers/mod.rs`'s
//! `TestBridgeWithdrawerConfig::spawn`, minus the external mock servers:
//! this system's store/bus/lock/cache all have in-memory fakes already used
//! by the unit tests, so no wiremock is needed to exercise the pipeline
//! end-to-end. The expiry finalizer is exercised directly against these same
//! fakes in `src/finalizer.rs`'s own unit tests rather than here.

use std::sync::Arc;

use auction_platform::{
    api::{
        self,
        AppState,
    },
    auctions::AuctionService,
    bus::memory::InMemoryEventBus,
    cache::NoopCache,
    evaluator::Evaluator,
    lock::InMemoryLock,
    rate_limit::RateLimiterMap,
    resilience::{
        CircuitBreakerConfig,
        Envelope,
        RetryConfig,
        KAFKA_PRODUCER,
        POSTGRES,
    },
    store::{
        memory::InMemoryStore,
        Store,
    },
    submission::Submitter,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<InMemoryEventBus>,
    pub router: axum::Router,
    cancel: CancellationToken,
    evaluator_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn Store> = store.clone();
        let (bus, consumer) = InMemoryEventBus::new();
        let bus = Arc::new(bus);
        let lock = Arc::new(InMemoryLock::new());
        let cache = Arc::new(NoopCache);

        let store_envelope = Arc::new(Envelope::new(
            POSTGRES,
            RetryConfig::default(),
            CircuitBreakerConfig::postgres_default(),
        ));
        let bus_envelope = Arc::new(Envelope::new(
            KAFKA_PRODUCER,
            RetryConfig::default(),
            CircuitBreakerConfig::kafka_producer_default(),
        ));

        let evaluator = Arc::new(Evaluator::new(
            store_dyn.clone(),
            bus.clone(),
            lock.clone(),
            cache.clone(),
            store_envelope.clone(),
            bus_envelope.clone(),
        ));

        let cancel = CancellationToken::new();
        let evaluator_task = tokio::spawn(Arc::clone(&evaluator).run(cancel.clone(), Box::new(consumer)));

        let auctions = Arc::new(AuctionService::new(store_dyn.clone(), cache.clone(), store_envelope.clone(), 30));
        let submitter = Arc::new(Submitter::new(
            store_dyn.clone(),
            bus.clone(),
            store_envelope.clone(),
            bus_envelope.clone(),
            evaluator.clone(),
        ));

        let prometheus = PrometheusBuilder::new().build_recorder().handle();

        let state = AppState {
            auctions,
            submitter,
            store: store_dyn,
            store_envelope,
            bus_envelope,
            rate_limiter: Arc::new(RateLimiterMap::new(1_000, 1_000)),
            prometheus,
            shutdown: cancel.clone(),
        };

        Self {
            store,
            bus,
            router: api::router(state),
            cancel,
            evaluator_task,
        }
    }

    /// Blocks until every bid-placed message enqueued so far has been
    /// evaluated. The in-memory bus delivers in-process, so a few scheduler
    /// yields are enough to drain the consumer loop.
    pub async fn settle(&self) {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.evaluator_task.await;
    }
}
