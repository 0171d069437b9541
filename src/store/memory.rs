//! In-memory backend with the same visibility and uniqueness semantics as
//! the Postgres backend. Used by the test suites; also handy for embedders
//! that want the core without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ban::{BanRecord, RequestEntry};
use crate::models::credential::{AttributeFilter, AttributePatch, CredentialRow};

use super::{Backend, Selector, StoreError};

#[derive(Default)]
struct Inner {
    credentials: Vec<CredentialRow>,
    requests: Vec<RequestEntry>,
    bans: Vec<BanRecord>,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one request-history entry. The log is written by the request
    /// pipeline in production; tests populate it directly.
    pub fn push_request(&self, header: Option<&str>, ip: &str, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.requests.push(RequestEntry {
            header: header.map(str::to_string),
            ip: ip.to_string(),
            created_at,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store poisoned")
    }
}

fn selected<'a>(selector: &Selector<'_>, row: &'a CredentialRow) -> bool {
    match selector {
        Selector::ById(id) => row.id == *id,
        Selector::ByAttributes(filter) => filter.matches(&row.attributes()),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_credential(&self, row: &CredentialRow) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let collides = inner
            .credentials
            .iter()
            .any(|c| !c.deleted && c.scheme == row.scheme && c.token == row.token);
        if collides {
            return Err(StoreError::Duplicate);
        }
        inner.credentials.push(row.clone());
        Ok(())
    }

    async fn credential_by_id(&self, id: Uuid) -> Result<Option<CredentialRow>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .credentials
            .iter()
            .find(|c| !c.deleted && c.id == id)
            .cloned())
    }

    async fn credential_by_token(
        &self,
        scheme: &str,
        token: &str,
    ) -> Result<Option<CredentialRow>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .credentials
            .iter()
            .find(|c| !c.deleted && c.scheme == scheme && c.token == token)
            .cloned())
    }

    async fn find_credentials(
        &self,
        filter: &AttributeFilter,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<CredentialRow>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<CredentialRow> = inner
            .credentials
            .iter()
            .filter(|c| !c.deleted && filter.matches(&c.attributes()))
            .filter(|c| after_id.map_or(true, |after| c.id > after))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn patch_credentials(
        &self,
        selector: Selector<'_>,
        patch: &AttributePatch,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut changed = 0;
        for row in inner
            .credentials
            .iter_mut()
            .filter(|c| !c.deleted && selected(&selector, c))
        {
            if !patch.changes(&row.attributes()) {
                continue;
            }
            if let Some(owner) = &patch.owner {
                row.owner = owner.clone();
            }
            if let Some(flag) = patch.is_global_admin {
                row.is_global_admin = Some(flag);
            }
            changed += 1;
        }
        Ok(changed)
    }

    async fn revoke_credentials(&self, selector: Selector<'_>) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut revoked = 0;
        for row in inner
            .credentials
            .iter_mut()
            .filter(|c| !c.deleted && selected(&selector, c))
        {
            row.deleted = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn request_history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestEntry>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .requests
            .iter()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect())
    }

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        Ok(self.lock().bans.clone())
    }

    async fn replace_bans(&self, bans: &[BanRecord]) -> Result<(), StoreError> {
        self.lock().bans = bans.to_vec();
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────
