#![allow(clippy::result_large_err)]
//! # Warehub Core
//!
//! Multi-tenant inventory authorization and hierarchy engine.
//!
//! ## Architecture
//!
//! - **Models**: Warehouse → Store → Product hierarchy, users, memberships, invitations
//! - **RBAC**: Fixed role-permission matrix and the authorization guard
//! - **Membership**: Invitation state machine, role changes, member removal
//! - **Hierarchy**: Guarded create/update/delete with cascades and aggregates
//! - **Fan-out**: Tenant-scoped reads and semantic search across the caller's stores
//! - **Jobs**: Fire-and-forget embedding regeneration with supersession
//! - **Storage**: `TenantStore` over PostgreSQL or memory
//! - **Telemetry**: Structured logging with redaction, Prometheus metrics

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod hierarchy;
pub mod identity;
pub mod jobs;
pub mod membership;
pub mod models;
pub mod rbac;
pub mod search;
pub mod storage;
pub mod telemetry;

pub use error::{ErrorCode, ErrorKind, Result, WarehubError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::App;
    pub use crate::db::{CascadeReport, MemoryStore, PgStore, TenantStore, WarehouseTotals};
    pub use crate::error::{ErrorCode, ErrorKind, Result, WarehubError};
    pub use crate::fanout::{FanoutLimits, FanoutService, ProductView, SearchResult, StoreView, WarehouseView};
    pub use crate::hierarchy::{CascadeRetry, HierarchyService, StoreTotals};
    pub use crate::identity::{IdentityEvent, IdentityService, SyncOutcome};
    pub use crate::jobs::{EmbeddingPipeline, EmbeddingWorker, TaskQueue};
    pub use crate::membership::{InvitationView, MemberView, MembershipService};
    pub use crate::models::{
        Invitation, InvitationId, InvitationStatus, Membership, NewProduct, NewStore, NewWarehouse,
        Product, ProductId, ProductUpdate, Store, StoreId, StoreType, StoreUpdate, User, UserId,
        UserProfile, Warehouse, WarehouseId, WarehouseUpdate,
    };
    pub use crate::rbac::{AuthorizationGuard, Permission, Role};
}
