//! Credential store: issuance, lookup, filtered find, attribute patching,
//! and revocation, over any [`Backend`].
//!
//! Payloads (attributes, filters, patches) are raw JSON as handed over by
//! admin route handlers; validation happens here so every caller gets the
//! same `Validation` failures.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::AccessError;
use crate::models::credential::{
    AttributeFilter, AttributePatch, Attributes, CredentialRow, PublicCredential,
};
use crate::scheme::{Canonical, DeriveInput, SchemeRegistry};
use crate::store::{Backend, Selector, StoreError};

/// Hard cap on one `find` page.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn Backend>,
    schemes: Arc<SchemeRegistry>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn Backend>, schemes: Arc<SchemeRegistry>) -> Self {
        Self { backend, schemes }
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    /// Issue a credential under the registry's default scheme.
    ///
    /// The token is freshly generated; a duplicate generated token is a
    /// `Collision` and is surfaced, not retried.
    pub async fn issue(&self, attributes: &Value) -> Result<PublicCredential, AccessError> {
        let attrs = Attributes::parse(attributes)?;
        let handler = self.schemes.default_handler()?;
        let row = CredentialRow::new(handler.name(), handler.generate_token(), attrs);

        match self.backend.insert_credential(&row).await {
            Ok(()) => {
                tracing::info!(id = %row.id, owner = %row.owner, scheme = %row.scheme, "credential issued");
                self.project(row)
            }
            Err(StoreError::Duplicate) => Err(AccessError::Collision),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<PublicCredential, AccessError> {
        match self.backend.credential_by_id(id).await? {
            Some(row) => self.project(row),
            None => Err(AccessError::NotFound),
        }
    }

    /// Exact lookup by `(scheme, structured token)`.
    ///
    /// Any failure here is `InvalidCredential`, deliberately distinct from
    /// `NotFound`, so callers cannot learn which half of the pair was wrong.
    pub async fn get_by_credential(
        &self,
        scheme: &str,
        token: &Value,
    ) -> Result<PublicCredential, AccessError> {
        let canonical = self
            .schemes
            .derive(DeriveInput::Structured { scheme, token }, None)?;
        match self.lookup(&canonical).await? {
            Some(row) => self.project(row),
            None => Err(AccessError::InvalidCredential("credential")),
        }
    }

    /// Filtered page, cursor-paginated ascending by id.
    pub async fn find(
        &self,
        filter: &Value,
        after_id: Option<Uuid>,
    ) -> Result<Vec<PublicCredential>, AccessError> {
        let filter = AttributeFilter::parse(filter)?;
        let rows = self
            .backend
            .find_credentials(&filter, after_id, MAX_PAGE_SIZE)
            .await?;
        rows.into_iter().map(|row| self.project(row)).collect()
    }

    /// Patch `owner` / `isGlobalAdmin` on one credential. Returns 1 when the
    /// record changed, 0 for an empty patch, no effective change, or an
    /// unknown/deleted id.
    pub async fn patch_by_id(&self, id: Uuid, patch: &Value) -> Result<u64, AccessError> {
        let patch = AttributePatch::parse(patch)?;
        if patch.is_empty() {
            return Ok(0);
        }
        Ok(self
            .backend
            .patch_credentials(Selector::ById(id), &patch)
            .await?)
    }

    /// Same patch across every match; an empty filter matches all.
    pub async fn patch_by_attributes(
        &self,
        filter: &Value,
        patch: &Value,
    ) -> Result<u64, AccessError> {
        let filter = AttributeFilter::parse(filter)?;
        let patch = AttributePatch::parse(patch)?;
        if patch.is_empty() {
            return Ok(0);
        }
        Ok(self
            .backend
            .patch_credentials(Selector::ByAttributes(&filter), &patch)
            .await?)
    }

    /// One-way, idempotent: 1 on the revoking call, 0 ever after.
    pub async fn revoke_by_id(&self, id: Uuid) -> Result<u64, AccessError> {
        let revoked = self
            .backend
            .revoke_credentials(Selector::ById(id))
            .await?;
        if revoked > 0 {
            tracing::info!(id = %id, "credential revoked");
        }
        Ok(revoked)
    }

    /// Bulk revocation. An empty filter is refused so a missing filter can
    /// never wipe the whole collection.
    pub async fn revoke_by_attributes(&self, filter: &Value) -> Result<u64, AccessError> {
        let filter = AttributeFilter::parse(filter)?;
        if filter.is_empty() {
            return Err(AccessError::Validation(
                "refusing to revoke with an empty filter".into(),
            ));
        }
        let revoked = self
            .backend
            .revoke_credentials(Selector::ByAttributes(&filter))
            .await?;
        tracing::info!(count = revoked, "credentials revoked by attributes");
        Ok(revoked)
    }

    /// Row lookup for the engine: canonical credential to visible record.
    pub(crate) async fn lookup(
        &self,
        canonical: &Canonical,
    ) -> Result<Option<CredentialRow>, AccessError> {
        Ok(self
            .backend
            .credential_by_token(&canonical.scheme, &canonical.token)
            .await?)
    }

    fn project(&self, row: CredentialRow) -> Result<PublicCredential, AccessError> {
        // A stored scheme without a handler means the registry was narrowed
        // after issuance; that is a deployment bug, not a client error.
        let handler = self.schemes.handler(&row.scheme).ok_or_else(|| {
            AccessError::Configuration(format!(
                "credential {} has unregistered scheme '{}'",
                row.id, row.scheme
            ))
        })?;
        Ok(PublicCredential {
            id: row.id,
            scheme: row.scheme.clone(),
            token: handler.public_token(&row.token),
            attributes: row.attributes(),
        })
    }
}
