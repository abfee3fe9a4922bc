//! PostgreSQL [`TenantStore`] built on sqlx.
//!
//! Uniqueness lives in the schema (`migrations/0001_init.sql`): constraint
//! violations surface through `From<sqlx::Error>` as `AlreadyMember`,
//! `InvitationAlreadyPending` or `DuplicateRecord`. Membership mutations lock
//! the warehouse row so the last-owner check cannot race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::{CascadeReport, TenantStore, UserRemoval, WarehouseTotals};
use crate::config::DatabaseConfig;
use crate::error::{Result, WarehubError};
use crate::models::{
    normalize_email, Acceptance, AlertThresholds, Invitation, InvitationId, InvitationStatus,
    Membership, Product, ProductId, Store, StoreId, User, UserId, UserProfile, Warehouse,
    WarehouseId,
};
use crate::rbac::Role;
use crate::storage::StorageRef;
use crate::telemetry::redact_connection_string;

const MEMBERSHIP_COLUMNS: &str = "id, warehouse_id, user_id, role, invited_by, joined_at";
const INVITATION_COLUMNS: &str =
    "id, warehouse_id, email, role, invited_by, status, invited_at";
const PRODUCT_COLUMNS: &str = "id, store_id, name, sku, description, quantity, unit, price, \
     image_ref, search_vector, low_stock, out_of_stock, reorder_point, critical_low, overstock, \
     created_at, updated_at";

/// PostgreSQL-backed tenant store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| WarehubError::configuration("database.url is required for postgres"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await
            .map_err(|err| {
                warn!(database = %redact_connection_string(url), error = %err, "postgres connection failed");
                err
            })?;

        info!(
            database = %redact_connection_string(url),
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_warehouse(tx: &mut Transaction<'_, Postgres>, id: WarehouseId) -> Result<bool> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM warehouses WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(row.is_some())
    }

    async fn lock_store(tx: &mut Transaction<'_, Postgres>, id: StoreId) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM stores WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    async fn owner_count(tx: &mut Transaction<'_, Postgres>, id: WarehouseId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE warehouse_id = $1 AND role = 'owner'",
        )
        .bind(id.0)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count)
    }

    async fn membership_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        warehouse_id: WarehouseId,
        user_id: UserId,
    ) -> Result<Option<Membership>> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE warehouse_id = $1 AND user_id = $2",
            MEMBERSHIP_COLUMNS
        );
        let row = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(warehouse_id.0)
            .bind(user_id.0)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(first_valid(row))
    }

    async fn delete_products_where(
        tx: &mut Transaction<'_, Postgres>,
        sql: &str,
        id: Uuid,
        report: &mut CascadeReport,
    ) -> Result<()> {
        let removed: Vec<(Uuid, Option<String>)> = sqlx::query_as(sql)
            .bind(id)
            .fetch_all(&mut **tx)
            .await?;
        for (product_id, image_ref) in removed {
            report.products += 1;
            report.product_ids.push(ProductId(product_id));
            if let Some(image) = image_ref {
                report.image_refs.push(StorageRef::new(image));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row types
// ═══════════════════════════════════════════════════════════════════════════════

/// A row that may fail to map onto its model (unknown enum text).
trait IntoModel {
    type Model;

    fn into_model(self) -> Result<Self::Model>;
}

/// Unreadable rows are skipped; a membership with an unknown role grants nothing.
fn keep_valid<R: IntoModel>(rows: Vec<R>) -> Vec<R::Model> {
    rows.into_iter()
        .filter_map(|row| match row.into_model() {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(error = %e, "skipping unreadable row");
                None
            }
        })
        .collect()
}

fn first_valid<R: IntoModel>(row: Option<R>) -> Option<R::Model> {
    row.map(|r| vec![r]).map(keep_valid).and_then(|mut v| v.pop())
}

fn parse_role(raw: &str) -> Result<Role> {
    raw.parse()
        .map_err(|e| WarehubError::internal(format!("stored role is invalid: {}", e)))
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    external_auth_id: String,
    name: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            external_auth_id: row.external_auth_id,
            name: row.name,
            email: row.email.unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid,
    name: String,
    description: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<WarehouseRow> for Warehouse {
    fn from(row: WarehouseRow) -> Self {
        Self {
            id: WarehouseId(row.id),
            name: row.name,
            description: row.description,
            created_by: UserId(row.created_by),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    warehouse_id: Uuid,
    user_id: Uuid,
    role: String,
    invited_by: Option<Uuid>,
    joined_at: DateTime<Utc>,
}

impl IntoModel for MembershipRow {
    type Model = Membership;

    fn into_model(self) -> Result<Membership> {
        Ok(Membership {
            id: self.id.into(),
            warehouse_id: WarehouseId(self.warehouse_id),
            user_id: UserId(self.user_id),
            role: parse_role(&self.role)?,
            invited_by: self.invited_by.map(UserId),
            joined_at: self.joined_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    id: Uuid,
    warehouse_id: Uuid,
    email: String,
    role: String,
    invited_by: Uuid,
    status: String,
    invited_at: DateTime<Utc>,
}

impl IntoModel for InvitationRow {
    type Model = Invitation;

    fn into_model(self) -> Result<Invitation> {
        Ok(Invitation {
            id: InvitationId(self.id),
            warehouse_id: WarehouseId(self.warehouse_id),
            email: self.email,
            role: parse_role(&self.role)?,
            invited_by: UserId(self.invited_by),
            status: self.status.parse()?,
            invited_at: self.invited_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    warehouse_id: Uuid,
    name: String,
    store_type: String,
    created_at: DateTime<Utc>,
}

impl IntoModel for StoreRow {
    type Model = Store;

    fn into_model(self) -> Result<Store> {
        Ok(Store {
            id: StoreId(self.id),
            warehouse_id: WarehouseId(self.warehouse_id),
            name: self.name,
            store_type: self.store_type.parse()?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    store_id: Uuid,
    name: String,
    sku: String,
    description: String,
    quantity: i64,
    unit: String,
    price: String,
    image_ref: Option<String>,
    search_vector: Option<Vec<f32>>,
    low_stock: i64,
    out_of_stock: i64,
    reorder_point: i64,
    critical_low: i64,
    overstock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId(row.id),
            store_id: StoreId(row.store_id),
            name: row.name,
            sku: row.sku,
            description: row.description,
            quantity: row.quantity,
            unit: row.unit,
            price: row.price,
            image_ref: row.image_ref.map(StorageRef::new),
            search_vector: row.search_vector,
            alert_thresholds: AlertThresholds {
                low_stock: row.low_stock,
                out_of_stock: row.out_of_stock,
                reorder_point: row.reorder_point,
                critical_low: row.critical_low,
                overstock: row.overstock,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TenantStore
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl TenantStore for PgStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, external_auth_id, name, email, created_at)
            VALUES ($1, $2, $3, NULLIF($4, ''), $5)
            ON CONFLICT (external_auth_id)
            DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email
            RETURNING id, external_auth_id, name, email, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&profile.external_auth_id)
        .bind(&profile.name)
        .bind(normalize_email(&profile.email))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn delete_user(&self, external_auth_id: &str) -> Result<Option<UserRemoval>> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, external_auth_id, name, email, created_at
            FROM users
            WHERE external_auth_id = $1
            FOR UPDATE
            "#,
        )
        .bind(external_auth_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user.map(User::from) else {
            tx.commit().await?;
            return Ok(None);
        };

        let sql = format!(
            "DELETE FROM memberships WHERE user_id = $1 RETURNING {}",
            MEMBERSHIP_COLUMNS
        );
        let memberships = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(user.id.0)
            .fetch_all(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(UserRemoval {
            user,
            memberships: keep_valid(memberships),
        }))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_auth_id, name, email, created_at FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_external_id(&self, external_auth_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_auth_id, name, email, created_at FROM users WHERE external_auth_id = $1",
        )
        .bind(external_auth_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_auth_id, name, email, created_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Warehouses
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_warehouse(&self, warehouse: &Warehouse, owner: &Membership) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO warehouses (id, name, description, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(warehouse.id.0)
        .bind(&warehouse.name)
        .bind(&warehouse.description)
        .bind(warehouse.created_by.0)
        .bind(warehouse.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (id, warehouse_id, user_id, role, invited_by, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(owner.id.0)
        .bind(owner.warehouse_id.0)
        .bind(owner.user_id.0)
        .bind(owner.role.as_str())
        .bind(owner.invited_by.map(|id| id.0))
        .bind(owner.joined_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        let row = sqlx::query_as::<_, WarehouseRow>(
            "SELECT id, name, description, created_by, created_at FROM warehouses WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Warehouse::from))
    }

    async fn update_warehouse(&self, warehouse: &Warehouse) -> Result<bool> {
        let result = sqlx::query("UPDATE warehouses SET name = $2, description = $3 WHERE id = $1")
            .bind(warehouse.id.0)
            .bind(&warehouse.name)
            .bind(&warehouse.description)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_warehouse_cascade(&self, id: WarehouseId) -> Result<CascadeReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = CascadeReport::default();

        // Child inserts take KEY SHARE on the warehouse row; holding FOR UPDATE
        // makes them wait for the cascade instead of slipping in under it.
        if !Self::lock_warehouse(&mut tx, id).await? {
            tx.commit().await?;
            return Ok(report);
        }

        report.memberships = sqlx::query("DELETE FROM memberships WHERE warehouse_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        report.invitations = sqlx::query("DELETE FROM invitations WHERE warehouse_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        Self::delete_products_where(
            &mut tx,
            r#"
            DELETE FROM products
            WHERE store_id IN (SELECT id FROM stores WHERE warehouse_id = $1)
            RETURNING id, image_ref
            "#,
            id.0,
            &mut report,
        )
        .await?;

        report.stores = sqlx::query("DELETE FROM stores WHERE warehouse_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        report.warehouses = sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_membership(&self, warehouse_id: WarehouseId, user_id: UserId) -> Result<Option<Membership>> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE warehouse_id = $1 AND user_id = $2",
            MEMBERSHIP_COLUMNS
        );
        let row = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(warehouse_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(first_valid(row))
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE user_id = $1 ORDER BY joined_at, id",
            MEMBERSHIP_COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(keep_valid(rows))
    }

    async fn memberships_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Membership>> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE warehouse_id = $1 ORDER BY joined_at, id",
            MEMBERSHIP_COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(warehouse_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(keep_valid(rows))
    }

    async fn change_role(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        role: Role,
        protect_last_owner: bool,
    ) -> Result<Membership> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_warehouse(&mut tx, warehouse_id).await? {
            return Err(WarehubError::membership_not_found(user_id));
        }
        let current = Self::membership_in_tx(&mut tx, warehouse_id, user_id)
            .await?
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;

        if protect_last_owner
            && current.role == Role::Owner
            && role != Role::Owner
            && Self::owner_count(&mut tx, warehouse_id).await? <= 1
        {
            return Err(WarehubError::last_owner(warehouse_id));
        }

        let sql = format!(
            "UPDATE memberships SET role = $2 WHERE id = $1 RETURNING {}",
            MEMBERSHIP_COLUMNS
        );
        let row = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(current.id.0)
            .bind(role.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.into_model()
    }

    async fn remove_membership(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        protect_last_owner: bool,
    ) -> Result<Membership> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_warehouse(&mut tx, warehouse_id).await? {
            return Err(WarehubError::membership_not_found(user_id));
        }
        let current = Self::membership_in_tx(&mut tx, warehouse_id, user_id)
            .await?
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;

        if protect_last_owner
            && current.role == Role::Owner
            && Self::owner_count(&mut tx, warehouse_id).await? <= 1
        {
            return Err(WarehubError::last_owner(warehouse_id));
        }

        sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(current.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(current)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invitations
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_invitation(&self, invitation: &Invitation) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM warehouses WHERE id = $1")
            .bind(invitation.warehouse_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(WarehubError::warehouse_not_found(invitation.warehouse_id));
        }

        let purged = sqlx::query(
            "DELETE FROM invitations WHERE email = $1 AND warehouse_id = $2 AND status <> 'pending'",
        )
        .bind(&invitation.email)
        .bind(invitation.warehouse_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO invitations (id, warehouse_id, email, role, invited_by, status, invited_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invitation.id.0)
        .bind(invitation.warehouse_id.0)
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(invitation.invited_by.0)
        .bind(invitation.status.as_str())
        .bind(invitation.invited_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(purged)
    }

    async fn get_invitation(&self, id: InvitationId) -> Result<Option<Invitation>> {
        let sql = format!("SELECT {} FROM invitations WHERE id = $1", INVITATION_COLUMNS);
        let row = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(first_valid(row))
    }

    async fn pending_invitations_for_email(&self, email: &str) -> Result<Vec<Invitation>> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE email = $1 AND status = 'pending' ORDER BY invited_at, id",
            INVITATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(normalize_email(email))
            .fetch_all(&self.pool)
            .await?;
        Ok(keep_valid(rows))
    }

    async fn invitations_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Invitation>> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE warehouse_id = $1 ORDER BY invited_at, id",
            INVITATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(warehouse_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(keep_valid(rows))
    }

    async fn accept_invitation(&self, acceptance: &Acceptance) -> Result<Membership> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM invitations WHERE id = $1 FOR UPDATE",
            INVITATION_COLUMNS
        );
        let invitation = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(acceptance.invitation_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WarehubError::invitation_not_found(acceptance.invitation_id))?
            .into_model()?;

        if invitation.status != InvitationStatus::Pending {
            return Err(WarehubError::invitation_not_pending(invitation.status));
        }

        let membership = Membership {
            id: acceptance.membership_id,
            warehouse_id: invitation.warehouse_id,
            user_id: acceptance.user_id,
            role: invitation.role,
            invited_by: Some(invitation.invited_by),
            joined_at: acceptance.joined_at,
        };

        sqlx::query(
            r#"
            INSERT INTO memberships (id, warehouse_id, user_id, role, invited_by, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.id.0)
        .bind(membership.warehouse_id.0)
        .bind(membership.user_id.0)
        .bind(membership.role.as_str())
        .bind(membership.invited_by.map(|id| id.0))
        .bind(membership.joined_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE invitations SET status = 'accepted' WHERE id = $1")
            .bind(invitation.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(membership)
    }

    async fn decline_invitation(&self, id: InvitationId) -> Result<Invitation> {
        let sql = format!(
            "UPDATE invitations SET status = 'declined' WHERE id = $1 AND status = 'pending' RETURNING {}",
            INVITATION_COLUMNS
        );
        let declined = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match declined {
            Some(row) => row.into_model(),
            None => match self.get_invitation(id).await? {
                Some(existing) => Err(WarehubError::invitation_not_pending(existing.status)),
                None => Err(WarehubError::invitation_not_found(id)),
            },
        }
    }

    async fn delete_invitation(&self, id: InvitationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM invitations WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stores
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_store(&self, store: &Store) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO stores (id, warehouse_id, name, store_type, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE EXISTS (SELECT 1 FROM warehouses WHERE id = $2)
            "#,
        )
        .bind(store.id.0)
        .bind(store.warehouse_id.0)
        .bind(&store.name)
        .bind(store.store_type.as_str())
        .bind(store.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WarehubError::warehouse_not_found(store.warehouse_id));
        }
        Ok(())
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        let row = sqlx::query_as::<_, StoreRow>(
            "SELECT id, warehouse_id, name, store_type, created_at FROM stores WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(first_valid(row))
    }

    async fn update_store(&self, store: &Store) -> Result<bool> {
        let result = sqlx::query("UPDATE stores SET name = $2, store_type = $3 WHERE id = $1")
            .bind(store.id.0)
            .bind(&store.name)
            .bind(store.store_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stores_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Store>> {
        let rows = sqlx::query_as::<_, StoreRow>(
            r#"
            SELECT id, warehouse_id, name, store_type, created_at
            FROM stores
            WHERE warehouse_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(warehouse_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(keep_valid(rows))
    }

    async fn delete_store_cascade(&self, id: StoreId) -> Result<CascadeReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = CascadeReport::default();

        if !Self::lock_store(&mut tx, id).await? {
            tx.commit().await?;
            return Ok(report);
        }

        Self::delete_products_where(
            &mut tx,
            "DELETE FROM products WHERE store_id = $1 RETURNING id, image_ref",
            id.0,
            &mut report,
        )
        .await?;

        report.stores = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let t = &product.alert_thresholds;
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, store_id, name, sku, description, quantity, unit, price,
                                  image_ref, search_vector, low_stock, out_of_stock, reorder_point,
                                  critical_low, overstock, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            WHERE EXISTS (SELECT 1 FROM stores WHERE id = $2)
            "#,
        )
        .bind(product.id.0)
        .bind(product.store_id.0)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.quantity)
        .bind(&product.unit)
        .bind(&product.price)
        .bind(product.image_ref.as_ref().map(|r| r.as_str()))
        .bind(product.search_vector.as_deref())
        .bind(t.low_stock)
        .bind(t.out_of_stock)
        .bind(t.reorder_point)
        .bind(t.critical_low)
        .bind(t.overstock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WarehubError::store_not_found(product.store_id));
        }
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        let t = &product.alert_thresholds;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, sku = $3, description = $4, quantity = $5, unit = $6, price = $7,
                image_ref = $8, low_stock = $9, out_of_stock = $10, reorder_point = $11,
                critical_low = $12, overstock = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(product.id.0)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.quantity)
        .bind(&product.unit)
        .bind(&product.price)
        .bind(product.image_ref.as_ref().map(|r| r.as_str()))
        .bind(t.low_stock)
        .bind(t.out_of_stock)
        .bind(t.reorder_point)
        .bind(t.critical_low)
        .bind(t.overstock)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn products_for_store(&self, store_id: StoreId) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE store_id = $1 ORDER BY created_at, id",
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("DELETE FROM products WHERE id = $1 RETURNING {}", PRODUCT_COLUMNS);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn set_product_vector(&self, id: ProductId, vector: &[f32]) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET search_vector = $2 WHERE id = $1")
            .bind(id.0)
            .bind(vector)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn products_missing_vector(&self, limit: usize) -> Result<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE search_vector IS NULL OR cardinality(search_vector) = 0
            ORDER BY created_at, id
            LIMIT $1
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn products_with_vector(&self, after: Option<ProductId>, limit: usize) -> Result<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE cardinality(search_vector) > 0
              AND ($1::uuid IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(after.map(|id| id.0))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    async fn warehouse_totals(&self, warehouse_id: WarehouseId) -> Result<WarehouseTotals> {
        let (store_count, product_count, total_items): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM stores WHERE warehouse_id = $1),
                COUNT(p.id),
                COALESCE(SUM(p.quantity), 0)::BIGINT
            FROM products p
            JOIN stores s ON s.id = p.store_id
            WHERE s.warehouse_id = $1
            "#,
        )
        .bind(warehouse_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(WarehouseTotals {
            store_count: store_count.max(0) as u64,
            product_count: product_count.max(0) as u64,
            total_items,
        })
    }

    async fn store_product_count(&self, store_id: StoreId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE store_id = $1")
            .bind(store_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
