//! Scheme codec: translates a raw credential header or a structured token
//! value into a canonical `{scheme, token}` pair.
//!
//! Each scheme is one [`SchemeHandler`] entry in a [`SchemeRegistry`]. The
//! registry is built once and injected wherever derivation is needed, so
//! tests construct isolated instances and adding a scheme touches neither
//! the credential store nor the engine. Only `bearer` ships today.

use std::collections::HashMap;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

use crate::errors::AccessError;

/// Upper bound on accepted header length. Anything longer is rejected as a
/// malformed auth string before any parsing happens.
pub const MAX_HEADER_LEN: usize = 8192;

const BEARER_TOKEN_LEN: usize = 48;

/// Canonical form of a derived credential: lowercase scheme name plus the
/// scheme-specific secret string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub scheme: String,
    pub token: String,
}

/// Input to [`SchemeRegistry::derive`]. The two forms are mutually
/// exclusive by construction.
#[derive(Debug, Clone, Copy)]
pub enum DeriveInput<'a> {
    /// Raw header string, `"<scheme> <payload>"`.
    Header(&'a str),
    /// Structured form: scheme name plus a scheme-shaped token object.
    Structured { scheme: &'a str, token: &'a Value },
}

/// One credential scheme. Implementations are pure: parsing, generation,
/// and projection, no I/O.
pub trait SchemeHandler: Send + Sync {
    /// Canonical (lowercase) scheme name.
    fn name(&self) -> &'static str;

    /// Validate the space-split payload segments that followed the scheme
    /// token in a header string; returns the canonical secret.
    fn parse_header(&self, segments: &[&str]) -> Result<String, AccessError>;

    /// Validate a structured token object; returns the canonical secret.
    fn parse_structured(&self, token: &Value) -> Result<String, AccessError>;

    /// Generate a fresh secret for `issue`.
    fn generate_token(&self) -> String;

    /// Scheme-shaped token object for the public credential projection.
    fn public_token(&self, token: &str) -> Value;
}

/// Bearer tokens: one opaque high-entropy string.
struct BearerScheme;

impl SchemeHandler for BearerScheme {
    fn name(&self) -> &'static str {
        "bearer"
    }

    fn parse_header(&self, segments: &[&str]) -> Result<String, AccessError> {
        // Exactly one payload segment, and not an HTTP comma-joined list.
        let [token] = segments else {
            return Err(AccessError::InvalidCredential("token syntax"));
        };
        if token.is_empty() || token.contains(',') {
            return Err(AccessError::InvalidCredential("token syntax"));
        }
        Ok((*token).to_string())
    }

    fn parse_structured(&self, token: &Value) -> Result<String, AccessError> {
        let obj = token
            .as_object()
            .ok_or(AccessError::InvalidCredential("token syntax"))?;
        if obj.len() != 1 {
            return Err(AccessError::InvalidCredential("token syntax"));
        }
        match obj.get("bearer").and_then(Value::as_str) {
            Some(secret) if !secret.is_empty() => Ok(secret.to_string()),
            _ => Err(AccessError::InvalidCredential("token syntax")),
        }
    }

    fn generate_token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BEARER_TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    fn public_token(&self, token: &str) -> Value {
        json!({ "bearer": token })
    }
}

/// Closed strategy table keyed by scheme name.
pub struct SchemeRegistry {
    handlers: HashMap<&'static str, Arc<dyn SchemeHandler>>,
    default_scheme: &'static str,
}

impl SchemeRegistry {
    /// Registry with the built-in schemes; `bearer` is the default used by
    /// token issuance.
    pub fn builtin() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            default_scheme: "bearer",
        };
        registry.register(Arc::new(BearerScheme));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn SchemeHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn handler(&self, scheme: &str) -> Option<&Arc<dyn SchemeHandler>> {
        self.handlers.get(scheme.to_ascii_lowercase().as_str())
    }

    pub fn default_handler(&self) -> Result<&Arc<dyn SchemeHandler>, AccessError> {
        self.handlers.get(self.default_scheme).ok_or_else(|| {
            AccessError::Configuration(format!(
                "default scheme '{}' has no registered handler",
                self.default_scheme
            ))
        })
    }

    /// Derive the canonical credential from either input form.
    ///
    /// `allowed` restricts which schemes are acceptable (case-insensitive);
    /// `None` allows every registered scheme. An allowed scheme with no
    /// registered handler is a deployment bug and fails `Configuration`,
    /// deliberately distinct from a disallowed scheme.
    pub fn derive(
        &self,
        input: DeriveInput<'_>,
        allowed: Option<&[String]>,
    ) -> Result<Canonical, AccessError> {
        match input {
            DeriveInput::Header(header) => self.derive_header(header, allowed),
            DeriveInput::Structured { scheme, token } => {
                let handler = self.resolve(scheme, allowed)?;
                let secret = handler.parse_structured(token)?;
                Ok(Canonical {
                    scheme: handler.name().to_string(),
                    token: secret,
                })
            }
        }
    }

    fn derive_header(
        &self,
        header: &str,
        allowed: Option<&[String]>,
    ) -> Result<Canonical, AccessError> {
        if header.is_empty() || header.len() > MAX_HEADER_LEN {
            return Err(AccessError::InvalidCredential("auth string"));
        }

        let mut parts = header.split(' ');
        let scheme = parts.next().unwrap_or_default();
        let segments: Vec<&str> = parts.collect();
        if scheme.is_empty() || segments.is_empty() {
            return Err(AccessError::InvalidCredential("auth string"));
        }

        let handler = self.resolve(scheme, allowed)?;
        let secret = handler.parse_header(&segments)?;
        Ok(Canonical {
            scheme: handler.name().to_string(),
            token: secret,
        })
    }

    fn resolve(
        &self,
        scheme: &str,
        allowed: Option<&[String]>,
    ) -> Result<&Arc<dyn SchemeHandler>, AccessError> {
        let explicitly_allowed = match allowed {
            Some(list) => {
                if !list.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
                    return Err(AccessError::InvalidCredential("scheme"));
                }
                true
            }
            None => false,
        };

        match self.handler(scheme) {
            Some(handler) => Ok(handler),
            // Allowed but unimplemented: loud, not a client error.
            None if explicitly_allowed => Err(AccessError::Configuration(format!(
                "no handler registered for allowed scheme '{}'",
                scheme.to_ascii_lowercase()
            ))),
            None => Err(AccessError::InvalidCredential("scheme")),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
