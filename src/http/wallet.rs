//! Per-chain balance/address/faucet routes backed by the node's connectors
//! (SPEC_FULL.md 4.9 supplement: the HTTP surface needs a way to observe
//! and, on the mock connectors, fund a wallet without going through a
//! settlement).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{error::CoreError, error::ErrorKind, node::Node};

use super::{auth::AuthUser, error::ApiError};

pub fn router() -> Router<Arc<Node>> {
    Router::new()
        .route("/wallet/:chain/address", get(address_for))
        .route("/wallet/:chain/balance", get(balance))
        .route("/wallet/:chain/fund", post(fund))
}

#[derive(Serialize)]
struct AddressResponse {
    chain: String,
    address: String,
}

async fn address_for(
    State(node): State<Arc<Node>>,
    AuthUser(username): AuthUser,
    Path(chain): Path<String>,
) -> Result<Json<AddressResponse>, ApiError> {
    let connector = node
        .connector_for_chain(&chain)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown chain")))?;
    let address = connector.address_for(&username).await?;
    Ok(Json(AddressResponse { chain, address }))
}

#[derive(Deserialize)]
struct BalanceQuery {
    address: String,
}

#[derive(Serialize)]
struct BalanceResponse {
    chain: String,
    address: String,
    balance: u64,
}

async fn balance(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(chain): Path<String>,
    axum::extract::Query(query): axum::extract::Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let connector = node
        .connector_for_chain(&chain)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown chain")))?;
    let balance = connector.balance(&query.address).await?;
    Ok(Json(BalanceResponse {
        chain,
        address: query.address,
        balance,
    }))
}

#[derive(Deserialize)]
struct FundRequest {
    address: String,
    amount: u64,
}

async fn fund(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(chain): Path<String>,
    Json(req): Json<FundRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    let connector = node
        .connector_for_chain(&chain)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown chain")))?;
    connector.fund(&req.address, req.amount).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
