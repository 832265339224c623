//! Settlement initiation and status routes (spec.md 4.8, 6). Initiation
//! spawns the coordinator's background `run()` loop, which drives
//! lock/observe/claim/refund automatically from there; the `lock-<chain>`
//! action exists alongside that for an operator or test harness to submit
//! a chain lock directly when they want to drive a step by hand rather than
//! wait on the coordinator's own polling.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    error::{CoreError, ErrorKind},
    negotiation::{ProposalId, ProposalStatus},
    node::Node,
    orderbook::Side,
    settlement::{ChainAddress, Settlement, SettlementStatus},
};

use super::{auth::AuthUser, error::ApiError};

pub fn router() -> Router<Arc<Node>> {
    Router::new()
        .route("/settlement", get(list_settlements))
        .route("/settlement/:proposal_id", get(get_settlement))
        .route("/settlement/:proposal_id/initiate", post(initiate))
        .route("/settlement/:proposal_id/:action", post(chain_action))
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

async fn list_settlements(State(node): State<Arc<Node>>) -> Result<Json<Vec<SettlementStatus>>, ApiError> {
    Ok(Json(node.settlements.list()?.iter().map(SettlementStatus::from).collect()))
}

async fn get_settlement(State(node): State<Arc<Node>>, Path(proposal_id): Path<String>) -> Result<Json<Settlement>, ApiError> {
    node.settlements
        .get(&proposal_id)?
        .map(Json)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "settlement not found")))
}

/// Starts a settlement for an Accepted proposal on the Maker side
/// (spec.md 4.8); the Taker side self-initiates asynchronously off
/// `settlement.request.*` once it observes this (see
/// `node::server::settlement_self_initiate_loop`).
async fn initiate(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(proposal_id): Path<String>,
) -> Result<Json<Settlement>, ApiError> {
    let proposal = node
        .negotiation
        .get(&ProposalId(proposal_id.clone()))?
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "proposal not found")))?;
    if proposal.status != ProposalStatus::Accepted {
        return Err(ApiError::from(CoreError::new(
            ErrorKind::ConstraintViolated,
            "proposal is not accepted",
        )));
    }

    let order = node
        .order_book
        .get(&proposal.order_id)?
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "order not found")))?;

    let quote_amount = (proposal.amount as f64 * proposal.price) as u64;
    let (maker, taker, maker_amount, taker_amount) = match order.side {
        Side::Sell => (
            ChainAddress {
                chain: order.base_chain.clone(),
                address: proposal.maker_base_address.clone().ok_or_else(|| {
                    ApiError::from(CoreError::new(ErrorKind::ConstraintViolated, "proposal missing maker base address"))
                })?,
            },
            ChainAddress {
                chain: order.quote_chain.clone(),
                address: proposal.taker_quote_address.clone().ok_or_else(|| {
                    ApiError::from(CoreError::new(ErrorKind::ConstraintViolated, "proposal missing taker quote address"))
                })?,
            },
            proposal.amount,
            quote_amount,
        ),
        Side::Buy => (
            ChainAddress {
                chain: order.quote_chain.clone(),
                address: proposal.maker_quote_address.clone().ok_or_else(|| {
                    ApiError::from(CoreError::new(ErrorKind::ConstraintViolated, "proposal missing maker quote address"))
                })?,
            },
            ChainAddress {
                chain: order.base_chain.clone(),
                address: proposal.taker_base_address.clone().ok_or_else(|| {
                    ApiError::from(CoreError::new(ErrorKind::ConstraintViolated, "proposal missing taker base address"))
                })?,
            },
            quote_amount,
            proposal.amount,
        ),
    };

    let settlement = node
        .coordinator
        .initiate_as_maker(proposal_id.clone(), maker, taker, maker_amount, taker_amount, now())
        .await?;

    let coordinator = node.coordinator.clone();
    let running_id = proposal_id.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.run(&running_id).await {
            log::warn!("settlement {running_id}: coordinator loop ended: {e}");
        }
    });

    Ok(Json(settlement))
}

#[derive(Deserialize)]
struct ChainActionRequest {
    receiver: String,
    amount: u64,
    timeout: u64,
}

async fn chain_action(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path((proposal_id, action)): Path<(String, String)>,
    Json(req): Json<ChainActionRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let chain = action
        .strip_prefix("lock-")
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown settlement action")))?;

    let settlement = node
        .settlements
        .get(&proposal_id)?
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "settlement not found")))?;

    let is_maker_side = chain.eq_ignore_ascii_case(&settlement.maker.chain);
    let is_taker_side = chain.eq_ignore_ascii_case(&settlement.taker.chain);
    if !is_maker_side && !is_taker_side {
        return Err(ApiError::from(CoreError::new(
            ErrorKind::ConstraintViolated,
            "chain does not belong to this settlement",
        )));
    }

    let connector = node
        .connector_for_chain(chain)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown chain")))?;
    let txref = connector.lock(settlement.hash_lock, &req.receiver, req.amount, req.timeout).await?;

    let updated_at = now();
    let updated = node.settlements.update(&proposal_id, |s| {
        if is_maker_side {
            s.maker_lock_txref = Some(txref.clone());
        } else {
            s.taker_lock_txref = Some(txref.clone());
        }
        s.updated_at = updated_at;
    })?;

    Ok(Json(updated))
}
