//! Ban records and request-history entries for the abuse engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One entry of the request-history log, populated by the (external)
/// request pipeline. `header` is the raw credential header when one was
/// presented, `ip` the network origin.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestEntry {
    pub header: Option<String>,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

/// A temporary denial of service for one identity.
///
/// Identity is the `(ip, header)` pair; a record carries whichever axis
/// applies and leaves the other unset. The abuse engine guarantees at most
/// one live record per identity after each sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BanRecord {
    pub header: Option<String>,
    pub ip: Option<String>,
    #[sqlx(rename = "banned_until")]
    pub until: DateTime<Utc>,
}

impl BanRecord {
    pub fn for_header(header: &str, until: DateTime<Utc>) -> Self {
        Self {
            header: Some(header.to_string()),
            ip: None,
            until,
        }
    }

    pub fn for_ip(ip: &str, until: DateTime<Utc>) -> Self {
        Self {
            header: None,
            ip: Some(ip.to_string()),
            until,
        }
    }

    /// Whether this ban is still in force at `now`.
    pub fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }

    pub fn identity(&self) -> (Option<&str>, Option<&str>) {
        (self.ip.as_deref(), self.header.as_deref())
    }
}
