//! Top-level task orchestration: the HTTP surface, the bid evaluator
//! consumer loop and the expiry finalizer ticker, all sharing one
//! [`CancellationToken`]. Grounded on
//! `astria-bridge-withdrawer/src/withdrawer/mod.rs`'s `Service`/`Shutdown`
//! pair: a `ShutdownHandle` the caller holds to trigger shutdown, and a
//! per-task bounded timeout before falling back to `JoinHandle::abort()`.

use std::{
    sync::Arc,
    time::Duration,
};

use eyre::{
    Result,
    WrapErr as _,
};
use tokio::task::{
    JoinError,
    JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
};

use crate::{
    api::{
        self,
        AppState,
    },
    bus::BidPlacedConsumer,
    evaluator::Evaluator,
    finalizer::Finalizer,
};

/// A handle for instructing the running [`Service`] to shut down. Dropping it
/// without calling [`ShutdownHandle::shutdown`] also triggers shutdown, so a
/// `main` that returns early still tears everything down.
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(self) {
        self.token.cancel();
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            info!("shutdown handle dropped, issuing shutdown to all tasks");
        }
        self.token.cancel();
    }
}

pub struct Service {
    shutdown_token: CancellationToken,
    http_address: String,
    app_state: AppState,
    evaluator: Arc<Evaluator>,
    bid_placed_consumer: Box<dyn BidPlacedConsumer>,
    finalizer: Arc<Finalizer>,
}

impl Service {
    /// `app_state.shutdown` must be `shutdown_token.clone()` (or equal to
    /// it): the HTTP handlers and the orchestration loop below must observe
    /// the same cancellation signal.
    pub fn new(
        shutdown_token: CancellationToken,
        http_address: String,
        app_state: AppState,
        evaluator: Arc<Evaluator>,
        bid_placed_consumer: Box<dyn BidPlacedConsumer>,
        finalizer: Arc<Finalizer>,
    ) -> Self {
        Self {
            shutdown_token,
            http_address,
            app_state,
            evaluator,
            bid_placed_consumer,
            finalizer,
        }
    }

    pub async fn run(self) {
        let Self {
            shutdown_token,
            http_address,
            app_state,
            evaluator,
            bid_placed_consumer,
            finalizer,
        } = self;

        let api_cancel = shutdown_token.clone();
        let mut api_task: JoinHandle<Result<()>> = tokio::spawn(async move {
            api::serve(&http_address, app_state)
                .await
                .wrap_err("HTTP surface ended unexpectedly")
        });
        info!("spawned HTTP surface task");

        let evaluator_cancel = shutdown_token.clone();
        let mut evaluator_task: JoinHandle<()> =
            tokio::spawn(evaluator.run(evaluator_cancel, bid_placed_consumer));
        info!("spawned bid evaluator task");

        let finalizer_cancel = shutdown_token.clone();
        let mut finalizer_task: JoinHandle<()> = tokio::spawn(finalizer.run(finalizer_cancel));
        info!("spawned expiry finalizer task");

        tokio::select! {
            outcome = &mut api_task => {
                report_exit("HTTP surface", outcome);
            }
            () = &mut evaluator_task => {
                info!(task = "bid evaluator", "task has exited");
            }
            () = &mut finalizer_task => {
                info!(task = "expiry finalizer", "task has exited");
            }
        }

        shutdown_token.cancel();
        shutdown(api_task, evaluator_task, finalizer_task).await;
    }
}

fn report_exit(task_name: &str, outcome: Result<Result<()>, JoinError>) {
    match outcome {
        Ok(Ok(())) => info!(task = task_name, "task has exited"),
        Ok(Err(error)) => error!(task = task_name, %error, "task returned with error"),
        Err(error) => error!(task = task_name, %error, "task panicked"),
    }
}

const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const EVALUATOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const FINALIZER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Gives each remaining task a bounded window to notice `shutdown_token` is
/// cancelled and exit on its own before aborting it.
async fn shutdown(
    mut api_task: JoinHandle<Result<()>>,
    mut evaluator_task: JoinHandle<()>,
    mut finalizer_task: JoinHandle<()>,
) {
    if !evaluator_task.is_finished() {
        info!("waiting for bid evaluator to shut down");
        match tokio::time::timeout(EVALUATOR_SHUTDOWN_TIMEOUT, &mut evaluator_task).await {
            Ok(Ok(())) => info!("bid evaluator exited gracefully"),
            Ok(Err(error)) => error!(%error, "bid evaluator panicked"),
            Err(_) => {
                error!(timeout_secs = EVALUATOR_SHUTDOWN_TIMEOUT.as_secs(), "bid evaluator did not shut down in time; aborting");
                evaluator_task.abort();
            }
        }
    }

    if !finalizer_task.is_finished() {
        info!("waiting for expiry finalizer to shut down");
        match tokio::time::timeout(FINALIZER_SHUTDOWN_TIMEOUT, &mut finalizer_task).await {
            Ok(Ok(())) => info!("expiry finalizer exited gracefully"),
            Ok(Err(error)) => error!(%error, "expiry finalizer panicked"),
            Err(_) => {
                error!(timeout_secs = FINALIZER_SHUTDOWN_TIMEOUT.as_secs(), "expiry finalizer did not shut down in time; aborting");
                finalizer_task.abort();
            }
        }
    }

    if !api_task.is_finished() {
        info!("waiting for HTTP surface to shut down");
        match tokio::time::timeout(HTTP_SHUTDOWN_TIMEOUT, &mut api_task)
            .await
            .map(flatten)
        {
            Ok(Ok(())) => info!("HTTP surface exited gracefully"),
            Ok(Err(error)) => error!(%error, "HTTP surface exited with an error"),
            Err(_) => {
                error!(timeout_secs = HTTP_SHUTDOWN_TIMEOUT.as_secs(), "HTTP surface did not shut down in time; aborting");
                api_task.abort();
            }
        }
    }
}

fn flatten(res: Result<Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error),
        Err(error) => Err(error).wrap_err("task panicked"),
    }
}
