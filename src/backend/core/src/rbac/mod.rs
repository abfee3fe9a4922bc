//! Role-based access control scoped to a single warehouse.
//!
//! This module provides:
//! - **Models**: the closed `Role` and `Permission` sets
//! - **Matrix**: the static role → permission table
//! - **Guard**: membership lookup plus matrix check, per request
//!
//! # Usage
//!
//! ```rust,ignore
//! use warehub_core::rbac::{AuthorizationGuard, Permission};
//!
//! let guard = AuthorizationGuard::new(store.clone());
//! guard
//!     .require_permission(user_id, warehouse_id, Permission::StoresCreate)
//!     .await?;
//! ```

pub mod guard;
pub mod models;
pub mod roles;

pub use guard::{AccessDecision, AuthorizationGuard};
pub use models::{ParseRbacError, Permission, Role};
pub use roles::{has_permission, permissions_for, role_name_has_permission};
