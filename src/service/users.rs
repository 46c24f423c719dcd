//! Request orchestration for the users resource
//!
//! Sequences the pipeline per operation: authorize → sanitize → validate
//! login → hash → persist → redact. Any stage failure short-circuits to the
//! caller with no further stage invoked; the backend is the only place
//! side effects can already have happened.

use serde_json::Value;
use std::sync::Arc;

use crate::auth::guard::{authorize, GuardPolicy, Operation};
use crate::auth::{self, password, RequestContext};
use crate::db::DocumentStore;
use crate::login::{self, LoginPolicy};
use crate::sanitize::{self, ExtractedPassword, SanitizedPayload};
use crate::types::{Error, Result};

/// HTTP-style response handed back to the transport.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    /// HTTP-style status code.
    pub code: u16,
    /// Record or record sequence.
    pub answer: Value,
}

impl HandlerResponse {
    fn ok(answer: Value) -> Self {
        Self { code: 200, answer }
    }
}

/// Orchestrates the five operations over the document backend.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
    guard_policy: GuardPolicy,
    login_policy: LoginPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        guard_policy: GuardPolicy,
        login_policy: LoginPolicy,
    ) -> Self {
        Self {
            store,
            guard_policy,
            login_policy,
        }
    }

    fn target<'a>(ctx: &'a RequestContext) -> Result<&'a str> {
        ctx.target
            .as_deref()
            .ok_or_else(|| Error::Validation("missing target login".to_string()))
    }

    /// GET a single record by target login.
    pub async fn get(&self, ctx: &RequestContext) -> Result<HandlerResponse> {
        let target = Self::target(ctx)?;
        let redact = authorize(
            Operation::Get,
            ctx.credentials.as_ref(),
            Some(target),
            &self.guard_policy,
        )
        .into_result()?;

        let mut record = self.store.get(&login::normalize(target)).await?;
        if redact {
            auth::redact(&mut record);
        }

        Ok(HandlerResponse::ok(record))
    }

    /// POST a new record: uniqueness-checked login, hashed password.
    pub async fn create(&self, payload: Value, ctx: &RequestContext) -> Result<HandlerResponse> {
        let redact = authorize(
            Operation::Create,
            ctx.credentials.as_ref(),
            None,
            &self.guard_policy,
        )
        .into_result()?;

        let mut sanitized = sanitize::sanitize(payload, true)?;

        let Some(new_login) = sanitized.login.clone() else {
            return Err(Error::Validation("login is required".to_string()));
        };
        login::validate(&new_login, &self.login_policy)?;
        login::ensure_unique(self.store.as_ref(), &new_login).await?;

        let Some(extracted) = sanitized.take_password() else {
            return Err(Error::Validation("password is required".to_string()));
        };
        self.splice_hash(&mut sanitized, extracted).await?;

        let mut record = self.store.create(sanitized.into_document()).await?;
        if redact {
            auth::redact(&mut record);
        }

        Ok(HandlerResponse::ok(record))
    }

    /// PUT a whole-document or operator-style update onto the target record.
    pub async fn update(&self, payload: Value, ctx: &RequestContext) -> Result<HandlerResponse> {
        let target = Self::target(ctx)?;
        let redact = authorize(
            Operation::Update,
            ctx.credentials.as_ref(),
            Some(target),
            &self.guard_policy,
        )
        .into_result()?;

        let mut sanitized = sanitize::sanitize(payload, false)?;

        // A login equal to the target's canonical form is not a change and
        // must not conflict with the record itself.
        if let Some(new_login) = sanitized.login.clone() {
            if new_login != login::normalize(target) {
                login::validate(&new_login, &self.login_policy)?;
                login::ensure_unique(self.store.as_ref(), &new_login).await?;
            }
        }

        if let Some(extracted) = sanitized.take_password() {
            self.splice_hash(&mut sanitized, extracted).await?;
        }

        let mut record = self
            .store
            .update(&login::normalize(target), sanitized.into_document())
            .await?;
        if redact {
            auth::redact(&mut record);
        }

        Ok(HandlerResponse::ok(record))
    }

    /// SEARCH records by filter; every record of the result is redacted.
    pub async fn search(&self, filter: Value, ctx: &RequestContext) -> Result<HandlerResponse> {
        let redact = authorize(
            Operation::Search,
            ctx.credentials.as_ref(),
            None,
            &self.guard_policy,
        )
        .into_result()?;

        let mut records = self.store.find(filter).await?;
        if redact {
            for record in &mut records {
                auth::redact(record);
            }
        }

        Ok(HandlerResponse::ok(Value::Array(records)))
    }

    /// DELETE the target record. Authorization belongs to the backend; the
    /// echoed record still goes through redaction.
    pub async fn delete(&self, ctx: &RequestContext) -> Result<HandlerResponse> {
        let target = Self::target(ctx)?;
        let redact = authorize(
            Operation::Delete,
            ctx.credentials.as_ref(),
            Some(target),
            &self.guard_policy,
        )
        .into_result()?;

        let mut record = self.store.delete(&login::normalize(target)).await?;
        if redact {
            auth::redact(&mut record);
        }

        Ok(HandlerResponse::ok(record))
    }

    /// Derive hash material off the async workers and splice it back at the
    /// site the password was extracted from.
    async fn splice_hash(
        &self,
        sanitized: &mut SanitizedPayload,
        extracted: ExtractedPassword,
    ) -> Result<()> {
        let ExtractedPassword { plaintext, site } = extracted;
        let material = password::hash_password_task(plaintext).await?;
        sanitized.insert_hash(&site, &material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory double of the document backend. Counts calls so tests can
    /// assert that denied requests never reach storage.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, Value>>,
        calls: AtomicUsize,
    }

    impl MemoryStore {
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn record(&self, login: &str) -> Option<Value> {
            self.records.lock().unwrap().get(login).cloned()
        }

        fn matches(record: &Value, filter: &Value) -> bool {
            filter
                .as_object()
                .map(|f| f.iter().all(|(key, value)| record.get(key) == Some(value)))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn create(&self, doc: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let login = doc["login"]
                .as_str()
                .ok_or_else(|| Error::Validation("login is required".to_string()))?
                .to_string();

            let mut records = self.records.lock().unwrap();
            if records.contains_key(&login) {
                return Err(Error::Conflict("login already taken".to_string()));
            }
            records.insert(login, doc.clone());
            Ok(doc)
        }

        async fn get(&self, login: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.record(login).ok_or(Error::NotFound)
        }

        async fn update(&self, login: &str, update: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let record = records.get_mut(login).ok_or(Error::NotFound)?;

            match update.get("$set").and_then(Value::as_object).cloned() {
                Some(set) => {
                    let fields = record.as_object_mut().unwrap();
                    for (key, value) in set {
                        fields.insert(key, value);
                    }
                }
                None => *record = update,
            }

            let updated = record.clone();
            let new_login = updated["login"].as_str().unwrap_or(login).to_string();
            if new_login != login {
                let moved = records.remove(login).unwrap();
                records.insert(new_login, moved);
            }
            Ok(updated)
        }

        async fn delete(&self, login: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records
                .lock()
                .unwrap()
                .remove(login)
                .ok_or(Error::NotFound)
        }

        async fn find(&self, filter: Value) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let records: Vec<Value> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|record| Self::matches(record, &filter))
                .cloned()
                .collect();
            if records.is_empty() {
                Err(Error::NotFound)
            } else {
                Ok(records)
            }
        }
    }

    fn service(store: Arc<MemoryStore>) -> UserService {
        UserService::new(
            store,
            GuardPolicy {
                admin_role: "admin".to_string(),
                restricted_search: false,
            },
            LoginPolicy {
                min_len: 3,
                max_len: 64,
            },
        )
    }

    fn restricted_service(store: Arc<MemoryStore>) -> UserService {
        UserService::new(
            store,
            GuardPolicy {
                admin_role: "admin".to_string(),
                restricted_search: true,
            },
            LoginPolicy {
                min_len: 3,
                max_len: 64,
            },
        )
    }

    fn admin_ctx() -> RequestContext {
        RequestContext::internal().with_credentials(Credentials {
            username: Some("root".to_string()),
            role: Some("admin".to_string()),
            authorized_methods: Default::default(),
        })
    }

    fn user_ctx(username: &str) -> RequestContext {
        RequestContext::internal().with_credentials(Credentials {
            username: Some(username.to_string()),
            role: Some("user".to_string()),
            authorized_methods: Default::default(),
        })
    }

    async fn seed_user(users: &UserService, login: &str) {
        users
            .create(
                json!({"login": login, "password": "p1", "role": "user"}),
                &RequestContext::internal(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_canonicalizes_and_hashes() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store.clone());

        let response = users
            .create(
                json!({"login": "User", "password": "p1", "role": "user"}),
                &admin_ctx(),
            )
            .await
            .unwrap();

        // Stored record: canonical login, no plaintext, 512-bit derived key.
        let stored = store.record("user").unwrap();
        assert_eq!(stored["login"], "user");
        assert!(stored.get("password").is_none());
        assert_eq!(stored["hash"]["keylen"], 512);
        assert_eq!(stored["hash"]["digest"], "sha512");
        assert_eq!(stored["hash"]["hash"].as_str().unwrap().len(), 128);

        // Response to the authenticated caller omits the hash.
        assert_eq!(response.code, 200);
        assert!(response.answer.get("hash").is_none());
        assert_eq!(response.answer["login"], "user");
    }

    #[tokio::test]
    async fn test_create_requires_privileged_caller() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store.clone());

        let err = users
            .create(
                json!({"login": "user", "password": "p1"}),
                &user_ctx("alice"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AccessViolation(_)));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_requires_password() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);

        let err = users
            .create(json!({"login": "user"}), &admin_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_taken_login() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "user").await;

        let err = users
            .create(json!({"login": "User", "password": "p2"}), &admin_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_internal_caller_sees_hash() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "user").await;

        let ctx = RequestContext::internal().with_target("user");
        let response = users.get(&ctx).await.unwrap();
        assert!(response.answer.get("hash").is_some());
    }

    #[tokio::test]
    async fn test_hash_never_leaks_to_authenticated_callers() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "user").await;

        let ctx = user_ctx("user").with_target("user");
        let response = users.get(&ctx).await.unwrap();
        assert!(response.answer.get("hash").is_none());

        let ctx = admin_ctx().with_target("user");
        let response = users.get(&ctx).await.unwrap();
        assert!(response.answer.get("hash").is_none());
    }

    #[tokio::test]
    async fn test_ownership_enforced_for_get_and_put() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store.clone());
        seed_user(&users, "bob").await;
        let before = store.call_count();

        let ctx = user_ctx("alice").with_target("bob");
        assert!(matches!(
            users.get(&ctx).await.unwrap_err(),
            Error::AccessViolation(_)
        ));
        assert!(matches!(
            users.update(json!({"name": "x"}), &ctx).await.unwrap_err(),
            Error::AccessViolation(_)
        ));

        // Denied before any backend call.
        assert_eq!(store.call_count(), before);
    }

    #[tokio::test]
    async fn test_owner_get_is_case_insensitive() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "alice").await;

        let ctx = user_ctx("Alice").with_target("ALICE");
        let response = users.get(&ctx).await.unwrap();
        assert_eq!(response.answer["login"], "alice");
    }

    #[tokio::test]
    async fn test_search_capability_grants_get() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "bob").await;

        let mut credentials = Credentials::default();
        credentials.authorized_methods.insert("search".to_string());
        let ctx = RequestContext::internal()
            .with_credentials(credentials)
            .with_target("bob");

        let response = users.get(&ctx).await.unwrap();
        // Capability callers are still redacted.
        assert!(response.answer.get("hash").is_none());
    }

    #[tokio::test]
    async fn test_update_hash_tamper_makes_no_backend_call() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store.clone());
        seed_user(&users, "user").await;
        let before = store.call_count();

        let ctx = RequestContext::internal().with_target("user");
        let err = users
            .update(json!({"$set": {"hash": "x"}}), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AccessViolation(ref msg)
            if msg == "no right to replace hash field"));
        assert_eq!(store.call_count(), before);
    }

    #[tokio::test]
    async fn test_update_rehashes_password_under_operator() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store.clone());
        seed_user(&users, "user").await;
        let old_hash = store.record("user").unwrap()["hash"].clone();

        let ctx = user_ctx("user").with_target("user");
        let response = users
            .update(json!({"$set": {"password": "changed"}}), &ctx)
            .await
            .unwrap();

        let stored = store.record("user").unwrap();
        assert!(stored.get("password").is_none());
        assert_ne!(stored["hash"], old_hash);
        assert!(response.answer.get("hash").is_none());
    }

    #[tokio::test]
    async fn test_update_keeping_same_login_does_not_conflict() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "alice").await;

        let ctx = user_ctx("alice").with_target("alice");
        let response = users
            .update(json!({"$set": {"login": "Alice"}}), &ctx)
            .await
            .unwrap();
        assert_eq!(response.answer["login"], "alice");
    }

    #[tokio::test]
    async fn test_update_to_taken_login_conflicts() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "alice").await;
        seed_user(&users, "bob").await;

        let ctx = user_ctx("alice").with_target("alice");
        let err = users
            .update(json!({"$set": {"login": "Bob"}}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_search_redacts_every_record() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "alice").await;
        seed_user(&users, "bob").await;

        let ctx = user_ctx("alice");
        let response = users.search(json!({"role": "user"}), &ctx).await.unwrap();

        let records = response.answer.as_array().unwrap();
        assert_eq!(records.len(), 2);
        for record in records {
            assert!(record.get("hash").is_none());
        }
    }

    #[tokio::test]
    async fn test_restricted_search_denies_non_admin() {
        let store = Arc::new(MemoryStore::default());
        let users = restricted_service(store.clone());
        seed_user(&users, "user").await;
        let before = store.call_count();

        let err = users
            .search(json!({"login": "user"}), &user_ctx("user"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessViolation(_)));
        assert_eq!(store.call_count(), before);

        assert!(users
            .search(json!({"login": "user"}), &admin_ctx())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_search_miss_surfaces_not_found() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "user").await;

        let err = users
            .search(json!({"login": "ghost"}), &RequestContext::internal())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn test_get_after_delete_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "user").await;

        let ctx = RequestContext::internal().with_target("user");
        users.delete(&ctx).await.unwrap();

        assert!(matches!(users.get(&ctx).await.unwrap_err(), Error::NotFound));
    }

    #[tokio::test]
    async fn test_delete_echo_is_redacted_for_authenticated_callers() {
        let store = Arc::new(MemoryStore::default());
        let users = service(store);
        seed_user(&users, "alice").await;

        let ctx = admin_ctx().with_target("alice");
        let response = users.delete(&ctx).await.unwrap();
        assert_eq!(response.answer["login"], "alice");
        assert!(response.answer.get("hash").is_none());
    }
}
