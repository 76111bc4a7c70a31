//! `/api/v1/bid/*` handlers (§6.1).

use axum::{
    extract::{
        Query,
        State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{
    error::ApiError,
    AppState,
};
use crate::domain::{
    Bid,
    PlaceBidInput,
};

pub async fn place(State(state): State<AppState>, Json(input): Json<PlaceBidInput>) -> Result<(StatusCode, Json<Bid>), ApiError> {
    metrics::counter!(crate::metrics_init::BIDS_SUBMITTED).increment(1);
    let bid = state.submitter.place_bid(&state.shutdown, input).await?;
    Ok((StatusCode::ACCEPTED, Json(bid)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub auction_id: String,
    pub limit: Option<i64>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Vec<Bid>>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let store = std::sync::Arc::clone(&state.store);
    let auction_id = query.auction_id.clone();
    let bids = state
        .store_envelope
        .call(&state.shutdown, move || {
            let store = std::sync::Arc::clone(&store);
            let auction_id = auction_id.clone();
            async move { store.list_bids(&auction_id, limit).await }
        })
        .await
        .map_err(|err| ApiError(crate::domain::DomainError::from(err)))?;
    Ok(Json(bids))
}
