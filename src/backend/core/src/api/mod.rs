//! HTTP adapter for Warehub.
//!
//! A thin axum layer over the services: handlers extract the acting user,
//! call exactly one service operation and wrap the result. All policy lives
//! in the services.
//!
//! The acting user is identified by the `x-external-auth-id` header, set by
//! the upstream auth proxy after it has verified the session.

mod extract;
mod handlers;
pub mod middleware;

pub use extract::{CurrentUser, EXTERNAL_AUTH_HEADER};

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::db::TenantStore;
use crate::fanout::FanoutService;
use crate::hierarchy::HierarchyService;
use crate::identity::IdentityService;
use crate::membership::MembershipService;
use crate::telemetry::MetricsRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TenantStore>,
    pub identity: IdentityService,
    pub memberships: MembershipService,
    pub hierarchy: HierarchyService,
    pub fanout: FanoutService,
    pub metrics: MetricsRegistry,
}

/// Build the API router.
///
/// # Endpoints
///
/// - `GET /health`, `GET /metrics`
/// - `POST /api/v1/identity/events` - provider webhook
/// - `GET|POST /api/v1/warehouses`, `GET|PATCH|DELETE /api/v1/warehouses/:id`
/// - `GET /api/v1/warehouses/:id/totals`
/// - `GET|POST /api/v1/warehouses/:id/stores`
/// - `GET /api/v1/warehouses/:id/members`, `PATCH|DELETE /api/v1/warehouses/:id/members/:user_id`
/// - `GET|POST /api/v1/warehouses/:id/invitations`
/// - `POST /api/v1/invitations/:id/accept|decline`, `DELETE /api/v1/invitations/:id`
/// - `GET|PATCH|DELETE /api/v1/stores/:id`, `GET /api/v1/stores/:id/totals`
/// - `GET|POST /api/v1/stores/:id/products`
/// - `GET|PATCH|DELETE /api/v1/products/:id`
/// - `GET /api/v1/me`, `/api/v1/me/{warehouses,stores,products,memberships,invitations}`
/// - `GET /api/v1/search?q=`
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1_router())
        .layer(axum_middleware::from_fn(middleware::request_metrics))
        .layer(axum_middleware::from_fn(middleware::request_id))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/identity/events", post(handlers::identity_event))
        // Warehouses
        .route(
            "/warehouses",
            get(handlers::list_warehouses).post(handlers::create_warehouse),
        )
        .route(
            "/warehouses/:id",
            get(handlers::get_warehouse)
                .patch(handlers::update_warehouse)
                .delete(handlers::delete_warehouse),
        )
        .route("/warehouses/:id/totals", get(handlers::warehouse_totals))
        .route(
            "/warehouses/:id/stores",
            get(handlers::list_stores).post(handlers::create_store),
        )
        // Members & invitations
        .route("/warehouses/:id/members", get(handlers::list_members))
        .route(
            "/warehouses/:id/members/:user_id",
            axum::routing::patch(handlers::change_role).delete(handlers::remove_member),
        )
        .route(
            "/warehouses/:id/invitations",
            get(handlers::list_warehouse_invitations).post(handlers::invite),
        )
        .route("/invitations/:id", axum::routing::delete(handlers::cancel_invitation))
        .route("/invitations/:id/accept", post(handlers::accept_invitation))
        .route("/invitations/:id/decline", post(handlers::decline_invitation))
        // Stores
        .route(
            "/stores/:id",
            get(handlers::get_store)
                .patch(handlers::update_store)
                .delete(handlers::delete_store),
        )
        .route("/stores/:id/totals", get(handlers::store_totals))
        .route(
            "/stores/:id/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        // Products
        .route(
            "/products/:id",
            get(handlers::get_product)
                .patch(handlers::update_product)
                .delete(handlers::delete_product),
        )
        // The acting user's view
        .route("/me", get(handlers::me))
        .route("/me/warehouses", get(handlers::my_warehouses))
        .route("/me/stores", get(handlers::my_stores))
        .route("/me/products", get(handlers::my_products))
        .route("/me/memberships", get(handlers::my_memberships))
        .route("/me/invitations", get(handlers::my_invitations))
        .route("/search", get(handlers::search))
}

/// API response wrapper.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}
