//! `/api/v1/auction/*` handlers (§6.1).

use axum::{
    extract::{
        Query,
        State,
    },
    http::StatusCode,
    Json,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::{
    error::ApiError,
    AppState,
};
use crate::domain::{
    Auction,
    CreateAuctionInput,
};

pub async fn create(State(state): State<AppState>, Json(input): Json<CreateAuctionInput>) -> Result<(StatusCode, Json<Auction>), ApiError> {
    let auction = state.auctions.create(&state.shutdown, input).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub auction_id: String,
}

pub async fn get(State(state): State<AppState>, Query(query): Query<GetQuery>) -> Result<Json<Auction>, ApiError> {
    let auction = state.auctions.get(&state.shutdown, &query.auction_id).await?;
    Ok(Json(auction))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub auctions: Vec<Auction>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<ListResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * page_size;

    let (auctions, total) = state.auctions.list(&state.shutdown, page_size, offset).await?;
    let total_pages = (total + page_size - 1) / page_size.max(1);

    Ok(Json(ListResponse {
        auctions,
        total,
        page,
        page_size,
        total_pages,
    }))
}
