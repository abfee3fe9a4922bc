//! API request handlers.
//!
//! Reads the services answer with `None` for missing-or-unauthorized are
//! surfaced as 404 so a non-member cannot discover ids.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState, CurrentUser};
use crate::error::{Result, WarehubError};
use crate::identity::IdentityEvent;
use crate::models::{
    InvitationId, NewProduct, NewStore, NewWarehouse, ProductId, ProductUpdate, StoreId,
    StoreUpdate, UserId, WarehouseId, WarehouseUpdate,
};
use crate::rbac::Role;

// ═══════════════════════════════════════════════════════════════════════════════
// Health & metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Provider webhook. Signature verification happens upstream.
pub async fn identity_event(
    State(state): State<AppState>,
    Json(event): Json<IdentityEvent>,
) -> Result<impl IntoResponse> {
    let outcome = state.identity.apply_event(&event).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(ApiResponse::success(user))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Warehouses
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct WarehouseQuery {
    pub name: Option<String>,
}

/// `GET /warehouses`, or `?name=` for an exact-name lookup among the
/// caller's warehouses.
pub async fn list_warehouses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<WarehouseQuery>,
) -> Result<axum::response::Response> {
    match query.name {
        Some(name) => {
            let warehouse = state
                .fanout
                .find_warehouse_by_name(&user, &name)
                .await?
                .ok_or_else(|| WarehubError::warehouse_not_found(&name))?;
            Ok(Json(ApiResponse::success(warehouse)).into_response())
        }
        None => {
            let warehouses = state.fanout.my_warehouses(&user).await?;
            Ok(Json(ApiResponse::success(warehouses)).into_response())
        }
    }
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<NewWarehouse>,
) -> Result<impl IntoResponse> {
    let warehouse = state.hierarchy.create_warehouse(&user, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(warehouse))))
}

pub async fn get_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let warehouse = state
        .fanout
        .get_warehouse(&user, id)
        .await?
        .ok_or_else(|| WarehubError::warehouse_not_found(id))?;
    Ok(Json(ApiResponse::success(warehouse)))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
    Json(update): Json<WarehouseUpdate>,
) -> Result<impl IntoResponse> {
    let warehouse = state.hierarchy.update_warehouse(&user, id, update).await?;
    Ok(Json(ApiResponse::success(warehouse)))
}

pub async fn delete_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let report = state.hierarchy.delete_warehouse(&user, id).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn warehouse_totals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let totals = state
        .hierarchy
        .warehouse_totals(&user, id)
        .await?
        .ok_or_else(|| WarehubError::warehouse_not_found(id))?;
    Ok(Json(ApiResponse::success(totals)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Members & invitations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_members(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let members = state.memberships.list_members(&user, id).await?;
    Ok(Json(ApiResponse::success(members)))
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

pub async fn change_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((warehouse_id, target)): Path<(WarehouseId, UserId)>,
    Json(change): Json<RoleChange>,
) -> Result<impl IntoResponse> {
    let membership = state
        .memberships
        .change_role(&user, warehouse_id, target, change.role)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((warehouse_id, target)): Path<(WarehouseId, UserId)>,
) -> Result<impl IntoResponse> {
    let membership = state
        .memberships
        .remove_member(&user, warehouse_id, target)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: Role,
}

pub async fn invite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
    Json(request): Json<InviteRequest>,
) -> Result<impl IntoResponse> {
    let invitation = state
        .memberships
        .invite(&user, id, &request.email, request.role)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(invitation))))
}

pub async fn list_warehouse_invitations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let invitations = state.memberships.list_warehouse_invitations(&user, id).await?;
    Ok(Json(ApiResponse::success(invitations)))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<InvitationId>,
) -> Result<impl IntoResponse> {
    let membership = state.memberships.accept(&user, id).await?;
    Ok(Json(ApiResponse::success(membership)))
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<InvitationId>,
) -> Result<impl IntoResponse> {
    let invitation = state.memberships.decline(&user, id).await?;
    Ok(Json(ApiResponse::success(invitation)))
}

pub async fn cancel_invitation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<InvitationId>,
) -> Result<impl IntoResponse> {
    state.memberships.cancel(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_invitations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let invitations = state.memberships.list_my_invitations(&user).await?;
    Ok(Json(ApiResponse::success(invitations)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stores
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_stores(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
) -> Result<impl IntoResponse> {
    let stores = state.fanout.list_stores(&user, id).await?;
    Ok(Json(ApiResponse::success(stores)))
}

pub async fn create_store(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<WarehouseId>,
    Json(input): Json<NewStore>,
) -> Result<impl IntoResponse> {
    let store = state.hierarchy.create_store(&user, id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(store))))
}

pub async fn get_store(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<impl IntoResponse> {
    let store = state
        .fanout
        .get_store(&user, id)
        .await?
        .ok_or_else(|| WarehubError::store_not_found(id))?;
    Ok(Json(ApiResponse::success(store)))
}

pub async fn update_store(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
    Json(update): Json<StoreUpdate>,
) -> Result<impl IntoResponse> {
    let store = state.hierarchy.update_store(&user, id, update).await?;
    Ok(Json(ApiResponse::success(store)))
}

pub async fn delete_store(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<impl IntoResponse> {
    let report = state.hierarchy.delete_store(&user, id).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn store_totals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<impl IntoResponse> {
    let totals = state
        .hierarchy
        .store_totals(&user, id)
        .await?
        .ok_or_else(|| WarehubError::store_not_found(id))?;
    Ok(Json(ApiResponse::success(totals)))
}

pub async fn my_stores(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let stores = state.fanout.my_stores(&user).await?;
    Ok(Json(ApiResponse::success(stores)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Products
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<impl IntoResponse> {
    let products = state.fanout.list_products(&user, id).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
    Json(input): Json<NewProduct>,
) -> Result<impl IntoResponse> {
    let product = state.hierarchy.create_product(&user, id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<impl IntoResponse> {
    let product = state
        .fanout
        .get_product(&user, id)
        .await?
        .ok_or_else(|| WarehubError::product_not_found(id))?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
    Json(update): Json<ProductUpdate>,
) -> Result<impl IntoResponse> {
    let product = state.hierarchy.update_product(&user, id, update).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<impl IntoResponse> {
    let product = state.hierarchy.delete_product(&user, id).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn my_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let products = state.fanout.my_products(&user).await?;
    Ok(Json(ApiResponse::success(products)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fan-out reads
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn my_warehouses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let warehouses = state.fanout.my_warehouses(&user).await?;
    Ok(Json(ApiResponse::success(warehouses)))
}

pub async fn my_memberships(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let memberships = state.fanout.my_memberships(&user).await?;
    Ok(Json(ApiResponse::success(memberships)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse<T> {
    pub query: String,
    pub count: usize,
    pub results: Vec<T>,
}

pub async fn search(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let results = state.fanout.semantic_search(&user, &query.q).await?;
    Ok(Json(ApiResponse::success(SearchResponse {
        count: results.len(),
        query: query.q,
        results,
    })))
}
