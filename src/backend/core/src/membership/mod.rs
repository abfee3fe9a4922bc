//! Membership and invitation workflow.
//!
//! Joining a warehouse is negotiated: a holder of `users:invite` issues an
//! invitation to an e-mail address, and only the user holding that address
//! can accept or decline it.
//!
//! ```text
//!   invite ──► pending ──accept──► accepted   (membership inserted atomically)
//!                 │
//!                 └────decline──► declined
//!
//!   cancel: deletes the invitation in any state
//! ```
//!
//! Membership rows are only written here (and by warehouse creation).

mod invitations;
mod members;

pub use invitations::InvitationView;
pub use members::MemberView;

use std::sync::Arc;

use crate::db::TenantStore;
use crate::rbac::AuthorizationGuard;

/// Guarded entry points for every membership and invitation mutation.
#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn TenantStore>,
    guard: AuthorizationGuard,
    protect_last_owner: bool,
}

impl MembershipService {
    pub fn new(store: Arc<dyn TenantStore>, protect_last_owner: bool) -> Self {
        Self {
            guard: AuthorizationGuard::new(store.clone()),
            store,
            protect_last_owner,
        }
    }

    pub fn protects_last_owner(&self) -> bool {
        self.protect_last_owner
    }
}
