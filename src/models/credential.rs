//! Credential records, their owner attributes, and the filter/patch
//! payloads accepted by the credential store.
//!
//! Attributes, filters, and patches arrive from route handlers as raw JSON;
//! they are validated here with serde (`deny_unknown_fields`) plus explicit
//! non-empty checks, so every malformed payload fails the same way no matter
//! which operation received it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AccessError;

/// Owner metadata carried by every credential.
///
/// `owner` is required and non-empty; `isGlobalAdmin` is optional and
/// treated as `false` when absent. No other keys are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Attributes {
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_global_admin: Option<bool>,
}

impl Attributes {
    pub fn parse(value: &Value) -> Result<Self, AccessError> {
        let attrs: Attributes = serde_json::from_value(value.clone())
            .map_err(|e| AccessError::Validation(format!("malformed attributes: {e}")))?;
        if attrs.owner.is_empty() {
            return Err(AccessError::Validation("owner must be non-empty".into()));
        }
        Ok(attrs)
    }

    /// Missing `isGlobalAdmin` is equivalent to `false`.
    pub fn is_global_admin(&self) -> bool {
        self.is_global_admin.unwrap_or(false)
    }
}

/// `owner` filter term: a single value or a set of values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OwnerSelector {
    One(String),
    Any(Vec<String>),
}

impl OwnerSelector {
    pub fn values(&self) -> Vec<String> {
        match self {
            OwnerSelector::One(v) => vec![v.clone()],
            OwnerSelector::Any(vs) => vs.clone(),
        }
    }

    fn matches(&self, owner: &str) -> bool {
        match self {
            OwnerSelector::One(v) => v == owner,
            OwnerSelector::Any(vs) => vs.iter().any(|v| v == owner),
        }
    }
}

/// Attribute filter used by `find`, `patch_by_attributes`, and
/// `revoke_by_attributes`. An empty filter matches every visible record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AttributeFilter {
    #[serde(default)]
    pub owner: Option<OwnerSelector>,
    #[serde(default)]
    pub is_global_admin: Option<bool>,
}

impl AttributeFilter {
    pub fn parse(value: &Value) -> Result<Self, AccessError> {
        let filter: AttributeFilter = serde_json::from_value(value.clone())
            .map_err(|e| AccessError::Validation(format!("malformed filter: {e}")))?;
        if let Some(selector) = &filter.owner {
            if selector.values().iter().any(|v| v.is_empty()) {
                return Err(AccessError::Validation(
                    "owner filter values must be non-empty".into(),
                ));
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.is_global_admin.is_none()
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        if let Some(selector) = &self.owner {
            if !selector.matches(&attributes.owner) {
                return false;
            }
        }
        if let Some(want) = self.is_global_admin {
            if attributes.is_global_admin() != want {
                return false;
            }
        }
        true
    }
}

/// Partial attribute patch. Only `owner` and `isGlobalAdmin` may change;
/// scheme and token are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AttributePatch {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub is_global_admin: Option<bool>,
}

impl AttributePatch {
    pub fn parse(value: &Value) -> Result<Self, AccessError> {
        let patch: AttributePatch = serde_json::from_value(value.clone())
            .map_err(|e| AccessError::Validation(format!("malformed patch: {e}")))?;
        if matches!(&patch.owner, Some(o) if o.is_empty()) {
            return Err(AccessError::Validation("owner must be non-empty".into()));
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.is_global_admin.is_none()
    }

    /// Whether applying this patch to `attributes` would change anything.
    /// Setting `isGlobalAdmin: false` on a record without the flag is not
    /// an effective change.
    pub fn changes(&self, attributes: &Attributes) -> bool {
        if matches!(&self.owner, Some(o) if *o != attributes.owner) {
            return true;
        }
        matches!(self.is_global_admin, Some(v) if v != attributes.is_global_admin())
    }
}

/// Internal credential record as persisted by a backend. The `deleted`
/// flag never leaves the store layer; see [`PublicCredential`].
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CredentialRow {
    pub id: Uuid,
    pub scheme: String,
    pub token: String,
    pub owner: String,
    pub is_global_admin: Option<bool>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl CredentialRow {
    pub fn new(scheme: &str, token: String, attributes: Attributes) -> Self {
        Self {
            id: Uuid::new_v4(),
            scheme: scheme.to_string(),
            token,
            owner: attributes.owner,
            is_global_admin: attributes.is_global_admin,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    pub fn attributes(&self) -> Attributes {
        Attributes {
            owner: self.owner.clone(),
            is_global_admin: self.is_global_admin,
        }
    }
}

/// Public projection of a credential: `id`, `attributes`, `scheme`, and the
/// scheme-shaped token object (e.g. `{"bearer": "..."}`). Never exposes the
/// `deleted` flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCredential {
    pub id: Uuid,
    pub scheme: String,
    pub token: Value,
    pub attributes: Attributes,
}

// ── Tests ───────────────────────────────────────────────────────
