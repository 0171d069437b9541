//! Postgres backend. Plain bind-parameter queries; the `(scheme, token)`
//! uniqueness invariant lives in a partial unique index over non-deleted
//! rows (see `migrations/`), so collision handling is detect-and-reject.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ban::{BanRecord, RequestEntry};
use crate::models::credential::{AttributeFilter, AttributePatch, CredentialRow};

use super::{Backend, Selector, StoreError};

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Owner filter as an optional text array bind; `None` disables the term.
fn owner_values(filter: &AttributeFilter) -> Option<Vec<String>> {
    filter.owner.as_ref().map(|selector| selector.values())
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl Backend for PgBackend {
    async fn insert_credential(&self, row: &CredentialRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO credentials (id, scheme, token, owner, is_global_admin, deleted, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(row.id)
        .bind(&row.scheme)
        .bind(&row.token)
        .bind(&row.owner)
        .bind(row.is_global_admin)
        .bind(row.deleted)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn credential_by_id(&self, id: Uuid) -> Result<Option<CredentialRow>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, scheme, token, owner, is_global_admin, deleted, created_at
             FROM credentials WHERE deleted = FALSE AND id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn credential_by_token(
        &self,
        scheme: &str,
        token: &str,
    ) -> Result<Option<CredentialRow>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, scheme, token, owner, is_global_admin, deleted, created_at
             FROM credentials WHERE deleted = FALSE AND scheme = $1 AND token = $2",
        )
        .bind(scheme)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_credentials(
        &self,
        filter: &AttributeFilter,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<CredentialRow>, StoreError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"SELECT id, scheme, token, owner, is_global_admin, deleted, created_at
               FROM credentials
               WHERE deleted = FALSE
                 AND ($1::TEXT[] IS NULL OR owner = ANY($1))
                 AND ($2::BOOLEAN IS NULL OR COALESCE(is_global_admin, FALSE) = $2)
                 AND ($3::UUID IS NULL OR id > $3)
               ORDER BY id ASC
               LIMIT $4"#,
        )
        .bind(owner_values(filter))
        .bind(filter.is_global_admin)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn patch_credentials(
        &self,
        selector: Selector<'_>,
        patch: &AttributePatch,
    ) -> Result<u64, StoreError> {
        // The WHERE clause excludes rows the patch would leave unchanged,
        // so rows_affected is the effective-change count. Missing
        // is_global_admin compares equal to FALSE.
        let changed = r#"(owner IS DISTINCT FROM COALESCE($1, owner)
               OR COALESCE(is_global_admin, FALSE)
                  IS DISTINCT FROM COALESCE($2, is_global_admin, FALSE))"#;

        let result = match selector {
            Selector::ById(id) => {
                sqlx::query(&format!(
                    r#"UPDATE credentials
                       SET owner = COALESCE($1, owner),
                           is_global_admin = COALESCE($2, is_global_admin),
                           updated_at = NOW()
                       WHERE deleted = FALSE AND id = $3 AND {changed}"#
                ))
                .bind(&patch.owner)
                .bind(patch.is_global_admin)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            Selector::ByAttributes(filter) => {
                sqlx::query(&format!(
                    r#"UPDATE credentials
                       SET owner = COALESCE($1, owner),
                           is_global_admin = COALESCE($2, is_global_admin),
                           updated_at = NOW()
                       WHERE deleted = FALSE
                         AND ($3::TEXT[] IS NULL OR owner = ANY($3))
                         AND ($4::BOOLEAN IS NULL OR COALESCE(is_global_admin, FALSE) = $4)
                         AND {changed}"#
                ))
                .bind(&patch.owner)
                .bind(patch.is_global_admin)
                .bind(owner_values(filter))
                .bind(filter.is_global_admin)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn revoke_credentials(&self, selector: Selector<'_>) -> Result<u64, StoreError> {
        let result = match selector {
            Selector::ById(id) => {
                sqlx::query(
                    "UPDATE credentials SET deleted = TRUE, updated_at = NOW()
                     WHERE deleted = FALSE AND id = $1",
                )
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            Selector::ByAttributes(filter) => {
                sqlx::query(
                    r#"UPDATE credentials SET deleted = TRUE, updated_at = NOW()
                       WHERE deleted = FALSE
                         AND ($1::TEXT[] IS NULL OR owner = ANY($1))
                         AND ($2::BOOLEAN IS NULL OR COALESCE(is_global_admin, FALSE) = $2)"#,
                )
                .bind(owner_values(filter))
                .bind(filter.is_global_admin)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn request_history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestEntry>, StoreError> {
        let rows = sqlx::query_as::<_, RequestEntry>(
            "SELECT header, ip, created_at FROM request_log WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BanRecord>("SELECT header, ip, banned_until FROM bans")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn replace_bans(&self, bans: &[BanRecord]) -> Result<(), StoreError> {
        // Single transaction: readers observe either the old list or the
        // new one, never a partially rebuilt set.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM bans").execute(&mut *tx).await?;
        for ban in bans {
            sqlx::query("INSERT INTO bans (header, ip, banned_until) VALUES ($1, $2, $3)")
                .bind(&ban.header)
                .bind(&ban.ip)
                .bind(ban.until)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
