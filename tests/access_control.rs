//! Integration tests for the credential store and the authn/authz engine,
//! run against the in-memory backend.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use warden::credentials::CredentialStore;
use warden::engine::{AccessEngine, ConstraintRegistry};
use warden::errors::AccessError;
use warden::scheme::SchemeRegistry;
use warden::store::memory::MemoryBackend;

fn setup() -> (CredentialStore, AccessEngine) {
    let backend = Arc::new(MemoryBackend::new());
    let store = CredentialStore::new(backend, Arc::new(SchemeRegistry::builtin()));
    let engine = AccessEngine::new(store.clone(), ConstraintRegistry::builtin());
    (store, engine)
}

fn bearer_secret(token: &Value) -> &str {
    token["bearer"].as_str().expect("bearer token")
}

// ── Credential store lifecycle ──────────────────────────────────

#[tokio::test]
async fn issue_then_get_by_id_round_trips() {
    let (store, _) = setup();
    let issued = store
        .issue(&json!({"owner": "alice", "isGlobalAdmin": true}))
        .await
        .unwrap();

    assert_eq!(issued.scheme, "bearer");
    let secret = bearer_secret(&issued.token);
    assert_eq!(secret.len(), 48);

    let fetched = store.get_by_id(issued.id).await.unwrap();
    assert_eq!(fetched.attributes, issued.attributes);
    assert_eq!(fetched.attributes.owner, "alice");
    assert_eq!(fetched.attributes.is_global_admin, Some(true));
    assert_eq!(bearer_secret(&fetched.token), secret);
}

#[tokio::test]
async fn issue_rejects_malformed_attributes() {
    let (store, _) = setup();
    for attrs in [
        json!({}),
        json!({"owner": ""}),
        json!({"owner": 5}),
        json!({"owner": "a", "role": "admin"}),
    ] {
        assert!(matches!(
            store.issue(&attrs).await,
            Err(AccessError::Validation(_))
        ));
    }
}

#[tokio::test]
async fn revoke_is_one_way_and_idempotent() {
    let (store, _) = setup();
    let cred = store.issue(&json!({"owner": "bob"})).await.unwrap();

    assert_eq!(store.revoke_by_id(cred.id).await.unwrap(), 1);
    assert_eq!(store.revoke_by_id(cred.id).await.unwrap(), 0);
    assert!(matches!(
        store.get_by_id(cred.id).await,
        Err(AccessError::NotFound)
    ));
    // A revoked credential is invisible to patching too.
    assert_eq!(
        store
            .patch_by_id(cred.id, &json!({"owner": "carol"}))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn get_by_credential_never_says_which_half_was_wrong() {
    let (store, _) = setup();
    let cred = store.issue(&json!({"owner": "bob"})).await.unwrap();
    let secret = bearer_secret(&cred.token).to_string();

    let ok = store
        .get_by_credential("bearer", &json!({"bearer": secret}))
        .await
        .unwrap();
    assert_eq!(ok.id, cred.id);

    // Wrong token and wrong scheme fail identically.
    let wrong_token = store
        .get_by_credential("bearer", &json!({"bearer": "nope"}))
        .await;
    assert!(matches!(
        wrong_token,
        Err(AccessError::InvalidCredential(_))
    ));

    store.revoke_by_id(cred.id).await.unwrap();
    let revoked = store
        .get_by_credential("bearer", &json!({"bearer": secret}))
        .await;
    assert!(matches!(revoked, Err(AccessError::InvalidCredential(_))));
}

#[tokio::test]
async fn find_validates_filters_and_orders_ascending() {
    let (store, _) = setup();
    for i in 0..4 {
        let owner = if i % 2 == 0 { "even" } else { "odd" };
        store.issue(&json!({"owner": owner})).await.unwrap();
    }

    assert!(matches!(
        store.find(&json!({"owner": 5}), None).await,
        Err(AccessError::Validation(_))
    ));
    assert!(matches!(
        store.find(&json!({"extra": "x"}), None).await,
        Err(AccessError::Validation(_))
    ));

    let all = store.find(&json!({}), None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].id < w[1].id));

    let evens = store.find(&json!({"owner": "even"}), None).await.unwrap();
    assert_eq!(evens.len(), 2);

    let both = store
        .find(&json!({"owner": ["even", "odd"]}), None)
        .await
        .unwrap();
    assert_eq!(both.len(), 4);
}

#[tokio::test]
async fn find_paginates_with_cursor() {
    let (store, _) = setup();
    for _ in 0..5 {
        store.issue(&json!({"owner": "page"})).await.unwrap();
    }
    let all = store.find(&json!({}), None).await.unwrap();
    let rest = store.find(&json!({}), Some(all[1].id)).await.unwrap();
    assert_eq!(rest.len(), 3);
    assert!(rest.iter().all(|c| c.id > all[1].id));
}

#[tokio::test]
async fn patch_counts_only_effective_changes() {
    let (store, _) = setup();
    let cred = store.issue(&json!({"owner": "dora"})).await.unwrap();

    assert_eq!(store.patch_by_id(cred.id, &json!({})).await.unwrap(), 0);
    // Missing flag is equivalent to false, so this is a no-op.
    assert_eq!(
        store
            .patch_by_id(cred.id, &json!({"isGlobalAdmin": false}))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        store
            .patch_by_id(cred.id, &json!({"isGlobalAdmin": true}))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .patch_by_id(cred.id, &json!({"owner": "dora"}))
            .await
            .unwrap(),
        0
    );

    assert!(matches!(
        store.patch_by_id(cred.id, &json!({"owner": ""})).await,
        Err(AccessError::Validation(_))
    ));
    assert!(matches!(
        store
            .patch_by_id(cred.id, &json!({"scheme": "basic"}))
            .await,
        Err(AccessError::Validation(_))
    ));

    let fetched = store.get_by_id(cred.id).await.unwrap();
    assert_eq!(fetched.attributes.is_global_admin, Some(true));
    assert_eq!(fetched.attributes.owner, "dora");
}

#[tokio::test]
async fn patch_by_attributes_spans_matches_and_empty_filter_matches_all() {
    let (store, _) = setup();
    store.issue(&json!({"owner": "t1"})).await.unwrap();
    store.issue(&json!({"owner": "t1"})).await.unwrap();
    store.issue(&json!({"owner": "t2"})).await.unwrap();

    let count = store
        .patch_by_attributes(&json!({"owner": "t1"}), &json!({"isGlobalAdmin": true}))
        .await
        .unwrap();
    assert_eq!(count, 2);

    // Empty filter matches everything; only t2 still changes.
    let count = store
        .patch_by_attributes(&json!({}), &json!({"isGlobalAdmin": true}))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn revoke_by_attributes_refuses_empty_filter() {
    let (store, _) = setup();
    store.issue(&json!({"owner": "safe"})).await.unwrap();

    assert!(matches!(
        store.revoke_by_attributes(&json!({})).await,
        Err(AccessError::Validation(_))
    ));

    store.issue(&json!({"owner": "gone"})).await.unwrap();
    store.issue(&json!({"owner": "gone"})).await.unwrap();
    assert_eq!(
        store
            .revoke_by_attributes(&json!({"owner": "gone"}))
            .await
            .unwrap(),
        2
    );
    assert_eq!(store.find(&json!({}), None).await.unwrap().len(), 1);
}

// ── Authentication ──────────────────────────────────────────────

#[tokio::test]
async fn authenticate_tracks_record_existence() {
    let (store, engine) = setup();
    let cred = store.issue(&json!({"owner": "eve"})).await.unwrap();
    let secret = bearer_secret(&cred.token).to_string();
    let header = format!("bearer {secret}");

    assert!(engine.authenticate(&header, None).await.unwrap());
    // Scheme matching is case-insensitive.
    assert!(engine
        .authenticate(&format!("Bearer {secret}"), None)
        .await
        .unwrap());

    assert!(!engine.authenticate("bearer unknown", None).await.unwrap());
    assert!(!engine.authenticate("", None).await.unwrap());
    assert!(!engine.authenticate("bearer a b", None).await.unwrap());
    assert!(!engine.authenticate("digest abc", None).await.unwrap());

    store.revoke_by_id(cred.id).await.unwrap();
    assert!(!engine.authenticate(&header, None).await.unwrap());
}

#[tokio::test]
async fn authenticate_honors_allowed_schemes() {
    let (store, engine) = setup();
    let cred = store.issue(&json!({"owner": "eve"})).await.unwrap();
    let header = format!("bearer {}", bearer_secret(&cred.token));

    let allowed = vec!["BEARER".to_string()];
    assert!(engine.authenticate(&header, Some(&allowed)).await.unwrap());

    let disallowed = vec!["basic".to_string()];
    assert!(!engine
        .authenticate(&header, Some(&disallowed))
        .await
        .unwrap());

    // Allowed but unimplemented scheme is loud, not a quiet false.
    let misconfigured = vec!["hmac".to_string()];
    assert!(matches!(
        engine.authenticate("hmac sig", Some(&misconfigured)).await,
        Err(AccessError::Configuration(_))
    ));
}

// ── Authorization ───────────────────────────────────────────────

#[tokio::test]
async fn authorize_without_constraints_is_authentication() {
    let (store, engine) = setup();
    let cred = store.issue(&json!({"owner": "frank"})).await.unwrap();
    let header = format!("bearer {}", bearer_secret(&cred.token));

    assert!(engine.authorize(&header, &[]).await.unwrap());
    assert!(!engine.authorize("bearer unknown", &[]).await.unwrap());
}

#[tokio::test]
async fn authorize_global_admin_constraint() {
    let (store, engine) = setup();
    let admin = store
        .issue(&json!({"owner": "root", "isGlobalAdmin": true}))
        .await
        .unwrap();
    let plain = store.issue(&json!({"owner": "user"})).await.unwrap();

    let admin_header = format!("bearer {}", bearer_secret(&admin.token));
    let plain_header = format!("bearer {}", bearer_secret(&plain.token));

    assert!(engine
        .authorize(&admin_header, &["isGlobalAdmin"])
        .await
        .unwrap());
    assert!(!engine
        .authorize(&plain_header, &["isGlobalAdmin"])
        .await
        .unwrap());
    assert!(!engine
        .authorize("bearer unknown", &["isGlobalAdmin"])
        .await
        .unwrap());
}

#[tokio::test]
async fn duplicate_constraint_always_propagates() {
    let (_, engine) = setup();
    // Even for a header that resolves to nothing.
    let err = engine
        .authorize("bearer nonexistent", &["isGlobalAdmin", "isGlobalAdmin"])
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Configuration(_)));

    let err = engine
        .authorize("garbage", &["isGlobalAdmin", "isGlobalAdmin"])
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Configuration(_)));
}

#[tokio::test]
async fn unknown_constraint_always_propagates() {
    let (store, engine) = setup();
    let cred = store.issue(&json!({"owner": "g"})).await.unwrap();
    let header = format!("bearer {}", bearer_secret(&cred.token));

    assert!(matches!(
        engine.authorize(&header, &["isOwner"]).await,
        Err(AccessError::Configuration(_))
    ));
    assert!(matches!(
        engine.authorize("bearer unknown", &["isOwner"]).await,
        Err(AccessError::Configuration(_))
    ));
}

#[tokio::test]
async fn unknown_ids_fail_not_found() {
    let (store, _) = setup();
    assert!(matches!(
        store.get_by_id(Uuid::new_v4()).await,
        Err(AccessError::NotFound)
    ));
}
