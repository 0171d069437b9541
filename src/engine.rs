//! Authentication & authorization engine.
//!
//! Both entry points take the raw credential header as presented by the
//! request and answer with a plain bool. Ordinary bad-credential conditions
//! (malformed header, unknown scheme, no matching record, revoked record)
//! all collapse to `false` so they are indistinguishable from outside.
//! Configuration-class errors (duplicate or unknown constraints, an
//! allowed scheme with no handler) always propagate: those are caller or
//! deployment bugs and must never look like a client failure.

use std::collections::HashMap;

use crate::credentials::CredentialStore;
use crate::errors::AccessError;
use crate::models::credential::{Attributes, CredentialRow};
use crate::scheme::DeriveInput;

pub type ConstraintFn = fn(&Attributes) -> bool;

/// Named constraint evaluators, injected at engine construction so tests
/// build isolated instances. `isGlobalAdmin` is built in.
pub struct ConstraintRegistry {
    evaluators: HashMap<&'static str, ConstraintFn>,
}

impl ConstraintRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            evaluators: HashMap::new(),
        };
        registry.register("isGlobalAdmin", Attributes::is_global_admin);
        registry
    }

    pub fn register(&mut self, name: &'static str, evaluator: ConstraintFn) {
        self.evaluators.insert(name, evaluator);
    }

    fn get(&self, name: &str) -> Option<&ConstraintFn> {
        self.evaluators.get(name)
    }
}

pub struct AccessEngine {
    store: CredentialStore,
    constraints: ConstraintRegistry,
}

impl AccessEngine {
    pub fn new(store: CredentialStore, constraints: ConstraintRegistry) -> Self {
        Self { store, constraints }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Is the header a recognized, non-revoked credential?
    pub async fn authenticate(
        &self,
        header: &str,
        allowed_schemes: Option<&[String]>,
    ) -> Result<bool, AccessError> {
        match self.resolve(header, allowed_schemes).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) if e.is_credential_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Does the header's credential satisfy every named constraint?
    ///
    /// The constraint list is validated before any lookup, so a duplicate
    /// or unknown constraint fails even for a nonexistent header. With no
    /// constraints the result is vacuously true when the credential exists.
    pub async fn authorize(
        &self,
        header: &str,
        constraints: &[&str],
    ) -> Result<bool, AccessError> {
        let evaluators = self.validate_constraints(constraints)?;

        let row = match self.resolve(header, None).await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(false),
            Err(e) if e.is_credential_failure() => return Ok(false),
            Err(e) => return Err(e),
        };

        let attributes = row.attributes();
        let authorized = evaluators.iter().all(|eval| eval(&attributes));
        if !authorized {
            tracing::debug!(id = %row.id, "constraint check failed");
        }
        Ok(authorized)
    }

    fn validate_constraints(
        &self,
        constraints: &[&str],
    ) -> Result<Vec<ConstraintFn>, AccessError> {
        let mut seen: Vec<&str> = Vec::with_capacity(constraints.len());
        let mut evaluators = Vec::with_capacity(constraints.len());
        for &name in constraints {
            if seen.contains(&name) {
                return Err(AccessError::Configuration(format!(
                    "duplicate constraint '{name}'"
                )));
            }
            seen.push(name);
            match self.constraints.get(name) {
                Some(eval) => evaluators.push(*eval),
                None => {
                    return Err(AccessError::Configuration(format!(
                        "unknown constraint '{name}'"
                    )))
                }
            }
        }
        Ok(evaluators)
    }

    async fn resolve(
        &self,
        header: &str,
        allowed_schemes: Option<&[String]>,
    ) -> Result<Option<CredentialRow>, AccessError> {
        let canonical = self
            .store
            .schemes()
            .derive(DeriveInput::Header(header), allowed_schemes)?;
        self.store.lookup(&canonical).await
    }
}
