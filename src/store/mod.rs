//! Persistence seam for the access-control core.
//!
//! The [`Backend`] trait is the full document-store surface the core
//! consumes: unique-constrained credential insert, filtered + paginated
//! find, patch-by-selector with affected count, the read-only request
//! history, and wholesale ban-list replacement.
//!
//! Soft deletion is structural at this seam: every read and update a
//! backend performs injects the "not deleted" predicate, so a revoked
//! credential is invisible to all callers by construction, never by
//! caller discipline.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ban::{BanRecord, RequestEntry};
use crate::models::credential::{AttributeFilter, AttributePatch, CredentialRow};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-index rejection on `(scheme, token)` among non-deleted rows.
    #[error("duplicate credential")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Which visible credentials an update targets.
#[derive(Debug, Clone)]
pub enum Selector<'a> {
    ById(Uuid),
    ByAttributes(&'a AttributeFilter),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Insert a fresh credential; `StoreError::Duplicate` when `(scheme,
    /// token)` collides with a non-deleted row. Not retried by callers.
    async fn insert_credential(&self, row: &CredentialRow) -> Result<(), StoreError>;

    async fn credential_by_id(&self, id: Uuid) -> Result<Option<CredentialRow>, StoreError>;

    async fn credential_by_token(
        &self,
        scheme: &str,
        token: &str,
    ) -> Result<Option<CredentialRow>, StoreError>;

    /// Filtered page, ascending by id, starting strictly after `after_id`.
    async fn find_credentials(
        &self,
        filter: &AttributeFilter,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<CredentialRow>, StoreError>;

    /// Apply `patch` to every visible credential matched by `selector`;
    /// returns the number of rows that actually changed.
    async fn patch_credentials(
        &self,
        selector: Selector<'_>,
        patch: &AttributePatch,
    ) -> Result<u64, StoreError>;

    /// Mark matched visible credentials deleted; returns the number of rows
    /// flipped. Already-deleted rows are never touched, which is what makes
    /// revocation idempotent.
    async fn revoke_credentials(&self, selector: Selector<'_>) -> Result<u64, StoreError>;

    /// Request-history entries created at or after `since`. Read-only.
    async fn request_history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestEntry>, StoreError>;

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError>;

    /// Replace the entire ban list in one shot.
    async fn replace_bans(&self, bans: &[BanRecord]) -> Result<(), StoreError>;
}
