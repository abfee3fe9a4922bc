//! End-to-end workflows across identity, membership, hierarchy and fan-out,
//! run against the in-memory store.

mod common;

use common::TestApp;
use std::collections::HashSet;
use warehub_core::db::TenantStore;
use warehub_core::error::{ErrorCode, ErrorKind};
use warehub_core::models::{
    InvitationStatus, NewProduct, NewStore, NewWarehouse, ProductUpdate, StoreType,
};
use warehub_core::rbac::{has_permission, Permission, Role};

// ============================================================================
// Role matrix
// ============================================================================

#[test]
fn test_permission_matrix_exhaustive() {
    use Permission::*;
    let expected: &[(Role, &[Permission])] = &[
        (Role::Owner, &Permission::ALL),
        (
            Role::Manager,
            &[
                WarehouseUpdate,
                UsersView,
                StoresCreate,
                StoresUpdate,
                StoresView,
                InventoryCreate,
                InventoryUpdate,
                InventoryView,
            ],
        ),
        (
            Role::Staff,
            &[StoresView, InventoryCreate, InventoryUpdate, InventoryView],
        ),
    ];

    for (role, granted) in expected {
        for permission in Permission::ALL {
            assert_eq!(
                has_permission(*role, permission),
                granted.contains(&permission),
                "{} / {}",
                role,
                permission
            );
        }
    }
}

// ============================================================================
// Warehouse creation & invitations
// ============================================================================

#[tokio::test]
async fn test_create_warehouse_yields_single_owner() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;

    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("Main", "central depot"))
        .await
        .unwrap();

    let members = app.state.memberships.list_members(&u, warehouse.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].membership.user_id, u.id);
    assert_eq!(members[0].membership.role, Role::Owner);
}

#[tokio::test]
async fn test_invite_accept_reinvite_scenario() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let a = app.user("a", "a@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();

    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Manager)
        .await
        .unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
    let listed = app
        .state
        .memberships
        .list_warehouse_invitations(&u, warehouse.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let membership = app.state.memberships.accept(&a, invitation.id).await.unwrap();
    assert_eq!(membership.role, Role::Manager);
    let listed = app
        .state
        .memberships
        .list_warehouse_invitations(&u, warehouse.id)
        .await
        .unwrap();
    assert_eq!(listed[0].status, InvitationStatus::Accepted);

    // A member cannot be invited again while the membership exists.
    let err = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Staff)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyMember);

    // Once removed, a fresh invitation replaces the accepted record.
    app.state
        .memberships
        .remove_member(&u, warehouse.id, a.id)
        .await
        .unwrap();
    let again = app
        .state
        .memberships
        .invite(&u, warehouse.id, "A@X.com ", Role::Staff)
        .await
        .unwrap();
    let listed = app
        .state
        .memberships
        .list_warehouse_invitations(&u, warehouse.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, again.id);
    assert_eq!(listed[0].status, InvitationStatus::Pending);
}

#[tokio::test]
async fn test_second_pending_invitation_conflicts() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();

    app.state
        .memberships
        .invite(&u, warehouse.id, "b@x.com", Role::Staff)
        .await
        .unwrap();
    let err = app
        .state
        .memberships
        .invite(&u, warehouse.id, "b@x.com", Role::Manager)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvitationAlreadyPending);
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_wrong_identity_cannot_accept() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let mallory = app.user("m", "m@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Staff)
        .await
        .unwrap();

    let err = app.state.memberships.accept(&mallory, invitation.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotYourInvitation);
}

#[tokio::test]
async fn test_concurrent_double_accept_creates_one_membership() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let a = app.user("a", "a@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Staff)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        app.state.memberships.accept(&a, invitation.id),
        app.state.memberships.accept(&a, invitation.id),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let members = app.state.memberships.list_members(&u, warehouse.id).await.unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn test_last_owner_is_protected() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let other = app.user("o", "o@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "o@x.com", Role::Owner)
        .await
        .unwrap();
    app.state.memberships.accept(&other, invitation.id).await.unwrap();

    // Two owners: demoting one is fine.
    app.state
        .memberships
        .change_role(&u, warehouse.id, other.id, Role::Manager)
        .await
        .unwrap();

    // Nobody can act on themself through the service, so the sole-owner
    // guarantee is enforced by the store.
    let err = app
        .state
        .memberships
        .change_role(&u, warehouse.id, u.id, Role::Staff)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CannotChangeSelf);

    let err = app
        .store
        .change_role(warehouse.id, u.id, Role::Staff, true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LastOwner);
    let err = app
        .store
        .remove_membership(warehouse.id, u.id, true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LastOwner);

    // With protection off the store applies the change.
    let membership = app
        .store
        .change_role(warehouse.id, u.id, Role::Staff, false)
        .await
        .unwrap();
    assert_eq!(membership.role, Role::Staff);
}

// ============================================================================
// Hierarchy
// ============================================================================

#[tokio::test]
async fn test_staff_cannot_create_store_but_can_create_product() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let staff = app.user("s", "s@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let store = app
        .state
        .hierarchy
        .create_store(&u, warehouse.id, NewStore::new("Aisle 1", StoreType::Plumbing))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "s@x.com", Role::Staff)
        .await
        .unwrap();
    app.state.memberships.accept(&staff, invitation.id).await.unwrap();

    let err = app
        .state
        .hierarchy
        .create_store(&staff, warehouse.id, NewStore::new("Aisle 2", StoreType::Chemical))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.denied_permission(), Some("stores:create"));

    let product = app
        .state
        .hierarchy
        .create_product(&staff, store.id, NewProduct::new("Pipe", "P-1", 12))
        .await
        .unwrap();
    assert_eq!(product.store_id, store.id);
}

#[tokio::test]
async fn test_warehouse_cascade_leaves_no_residue() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let a = app.user("a", "a@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    for s in 0..3 {
        let store = app
            .state
            .hierarchy
            .create_store(&u, warehouse.id, NewStore::new(format!("S{s}"), StoreType::Construction))
            .await
            .unwrap();
        for p in 0..4 {
            app.state
                .hierarchy
                .create_product(&u, store.id, NewProduct::new(format!("P{p}"), format!("SKU-{s}-{p}"), 1))
                .await
                .unwrap();
        }
    }
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Manager)
        .await
        .unwrap();
    app.state.memberships.accept(&a, invitation.id).await.unwrap();
    app.state
        .memberships
        .invite(&u, warehouse.id, "pending@x.com", Role::Staff)
        .await
        .unwrap();

    let report = app.state.hierarchy.delete_warehouse(&u, warehouse.id).await.unwrap();
    assert_eq!(report.warehouses, 1);
    assert_eq!(report.stores, 3);
    assert_eq!(report.products, 12);
    assert_eq!(report.memberships, 2);
    assert_eq!(report.invitations, 2);
    assert_eq!(app.store.residue_for_warehouse(warehouse.id), 0);

    assert!(app.state.fanout.my_warehouses(&a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_manager_cannot_delete_warehouse() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let a = app.user("a", "a@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Manager)
        .await
        .unwrap();
    app.state.memberships.accept(&a, invitation.id).await.unwrap();

    let err = app.state.hierarchy.delete_warehouse(&a, warehouse.id).await.unwrap_err();
    assert_eq!(err.denied_permission(), Some("warehouse:delete"));
    assert!(app.state.fanout.get_warehouse(&u, warehouse.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_product_writes_schedule_embeddings() {
    let mut app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let store = app
        .state
        .hierarchy
        .create_store(&u, warehouse.id, NewStore::new("S", StoreType::Electric))
        .await
        .unwrap();
    let product = app
        .state
        .hierarchy
        .create_product(&u, store.id, NewProduct::new("Cable", "C-1", 5))
        .await
        .unwrap();
    assert!(app.tasks.try_recv().is_some());

    // Quantity does not feed the embedding text.
    let update = ProductUpdate {
        quantity: Some(7),
        ..ProductUpdate::default()
    };
    app.state.hierarchy.update_product(&u, product.id, update).await.unwrap();
    assert!(app.tasks.try_recv().is_none());

    let update = ProductUpdate {
        description: Some("copper, 3 core".to_string()),
        ..ProductUpdate::default()
    };
    app.state.hierarchy.update_product(&u, product.id, update).await.unwrap();
    assert!(app.tasks.try_recv().is_some());
}

// ============================================================================
// Tenant isolation
// ============================================================================

#[tokio::test]
async fn test_tenant_isolation_across_fanout_and_by_id_reads() {
    let app = TestApp::new();
    let alice = app.user("alice", "alice@x.com").await;
    let bob = app.user("bob", "bob@x.com").await;

    let wa = app
        .state
        .hierarchy
        .create_warehouse(&alice, NewWarehouse::new("A", ""))
        .await
        .unwrap();
    let sa = app
        .state
        .hierarchy
        .create_store(&alice, wa.id, NewStore::new("SA", StoreType::Plumbing))
        .await
        .unwrap();
    app.state
        .hierarchy
        .create_product(&alice, sa.id, NewProduct::new("Valve", "V-1", 3))
        .await
        .unwrap();

    let wb = app
        .state
        .hierarchy
        .create_warehouse(&bob, NewWarehouse::new("B", ""))
        .await
        .unwrap();
    let sb = app
        .state
        .hierarchy
        .create_store(&bob, wb.id, NewStore::new("SB", StoreType::Chemical))
        .await
        .unwrap();
    let pb = app
        .state
        .hierarchy
        .create_product(&bob, sb.id, NewProduct::new("Solvent", "S-1", 2))
        .await
        .unwrap();

    let stores: HashSet<_> = app
        .state
        .fanout
        .my_stores(&alice)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.store.id)
        .collect();
    assert_eq!(stores, HashSet::from([sa.id]));

    let products = app.state.fanout.my_products(&alice).await.unwrap();
    assert_eq!(products.len(), 1);
    assert!(products.iter().all(|p| p.product.store_id == sa.id));

    assert!(app.state.fanout.get_store(&alice, sb.id).await.unwrap().is_none());
    assert!(app.state.fanout.get_product(&alice, pb.id).await.unwrap().is_none());
    assert!(app.state.fanout.get_warehouse(&alice, wb.id).await.unwrap().is_none());
    assert!(app.state.fanout.list_products(&alice, sb.id).await.unwrap().is_empty());

    let err = app
        .state
        .hierarchy
        .update_product(&alice, pb.id, ProductUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_user_deletion_removes_memberships() {
    let app = TestApp::new();
    let u = app.user("u", "u@x.com").await;
    let a = app.user("a", "a@x.com").await;
    let warehouse = app
        .state
        .hierarchy
        .create_warehouse(&u, NewWarehouse::new("W", ""))
        .await
        .unwrap();
    let invitation = app
        .state
        .memberships
        .invite(&u, warehouse.id, "a@x.com", Role::Staff)
        .await
        .unwrap();
    app.state.memberships.accept(&a, invitation.id).await.unwrap();

    let removal = app.state.identity.delete_user("a").await.unwrap().unwrap();
    assert_eq!(removal.memberships.len(), 1);

    let members = app.state.memberships.list_members(&u, warehouse.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert!(app.state.identity.resolve("a").await.is_err());
}
