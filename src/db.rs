use crate::error::GatewayError;
use crate::models::User;
use async_trait::async_trait;
use bcrypt::{non_truncating_hash, non_truncating_verify};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::task;

/// Longest password bcrypt can hash without truncating it; the NUL
/// terminator takes the 72nd byte.
pub const MAX_PASSWORD_BYTES: usize = 71;

/// Username/password table consulted by login and written by registration.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// True iff the user exists and the password matches exactly.
    async fn authenticate(&self, username: &str, password: &str) -> bool;

    /// Fails with [`GatewayError::DuplicateRegistration`] if the name is taken.
    async fn register(&self, username: &str, password: &str) -> Result<(), GatewayError>;

    async fn contains(&self, username: &str) -> bool;

    async fn len(&self) -> usize;
}

/// In-process store. Passwords are kept as bcrypt hashes.
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
    cost: u32,
}

impl InMemoryCredentialStore {
    pub fn new(cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            cost,
        }
    }

    /// Builds a store preloaded with `seed`. Later duplicates in `seed` are ignored.
    pub fn with_users<'a, I>(cost: u32, seed: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut users: HashMap<String, User> = HashMap::new();
        for (username, password) in seed {
            if users.contains_key(username) {
                continue;
            }
            let password_hash = non_truncating_hash(password, cost).map_err(|e| {
                GatewayError::Internal(format!("cannot hash seed password for {username}: {e}"))
            })?;
            users.insert(
                username.to_string(),
                User {
                    username: username.to_string(),
                    password_hash,
                },
            );
        }

        Ok(Self {
            users: RwLock::new(users),
            cost,
        })
    }
}

async fn hash_password(password: &str, cost: u32) -> Result<String, GatewayError> {
    let password = password.to_owned();
    task::spawn_blocking(move || non_truncating_hash(password, cost))
        .await
        .map_err(|e| GatewayError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| GatewayError::Internal(format!("cannot hash password: {e}")))
}

async fn verify_password(password: &str, stored: String) -> bool {
    let password = password.to_owned();
    task::spawn_blocking(move || non_truncating_verify(password, &stored))
        .await
        .is_ok_and(|verified| verified.unwrap_or(false))
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> bool {
        let stored = {
            let users = self.users.read().await;
            match users.get(username) {
                Some(user) => user.password_hash.clone(),
                None => return false,
            }
        };
        verify_password(password, stored).await
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), GatewayError> {
        if self.contains(username).await {
            return Err(GatewayError::DuplicateRegistration);
        }

        if password.len() > MAX_PASSWORD_BYTES {
            return Err(GatewayError::BadRequest(format!(
                "password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }

        // Hash off the worker and outside the lock; the entry check below is
        // the authoritative one.
        let password_hash = hash_password(password, self.cost).await?;

        let mut users = self.users.write().await;
        match users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(GatewayError::DuplicateRegistration),
            Entry::Vacant(slot) => {
                slot.insert(User {
                    username: username.to_string(),
                    password_hash,
                });
                Ok(())
            }
        }
    }

    async fn contains(&self, username: &str) -> bool {
        self.users.read().await.contains_key(username)
    }

    async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TEST_COST: u32 = 4;

    fn seeded() -> InMemoryCredentialStore {
        InMemoryCredentialStore::with_users(TEST_COST, [("admin", "admin123"), ("user", "user123")])
            .unwrap()
    }

    #[tokio::test]
    async fn authenticate_requires_exact_password() {
        let store = seeded();
        assert!(store.authenticate("admin", "admin123").await);
        assert!(!store.authenticate("admin", "admin124").await);
        assert!(!store.authenticate("admin", "ADMIN123").await);
        assert!(!store.authenticate("nobody", "admin123").await);
    }

    #[tokio::test]
    async fn passwords_are_not_stored_in_plaintext() {
        let store = seeded();
        let users = store.users.read().await;
        assert_ne!(users["admin"].password_hash, "admin123");
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = seeded();
        store.register("carol", "pw").await.unwrap();
        assert!(store.authenticate("carol", "pw").await);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn register_existing_name_is_rejected() {
        let store = seeded();
        let err = store.register("admin", "other").await.unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateRegistration));
        // Original password still works.
        assert!(store.authenticate("admin", "admin123").await);
    }

    #[tokio::test]
    async fn passwords_sharing_a_long_prefix_stay_distinct() {
        let store = InMemoryCredentialStore::new(TEST_COST);
        let prefix = "a".repeat(70);

        store.register("frank", &format!("{prefix}x")).await.unwrap();
        assert!(store.authenticate("frank", &format!("{prefix}x")).await);
        assert!(!store.authenticate("frank", &format!("{prefix}y")).await);
        assert!(!store.authenticate("frank", &format!("{prefix}xz")).await);
        assert!(!store.authenticate("frank", &prefix).await);
    }

    #[tokio::test]
    async fn password_beyond_bcrypt_limit_is_rejected() {
        let store = InMemoryCredentialStore::new(TEST_COST);
        let long = format!("{}correct", "a".repeat(72));

        let err = store.register("grace", &long).await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert!(!store.contains("grace").await);

        let max = "b".repeat(MAX_PASSWORD_BYTES);
        store.register("heidi", &max).await.unwrap();
        assert!(store.authenticate("heidi", &max).await);
        assert!(!store.authenticate("heidi", &format!("{max}b")).await);
    }

    #[test]
    fn long_seed_password_fails_at_startup() {
        let long = "s".repeat(80);
        let result = InMemoryCredentialStore::with_users(TEST_COST, [("root", long.as_str())]);
        assert!(matches!(result, Err(GatewayError::Internal(_))));
    }

    #[tokio::test]
    async fn out_of_range_cost_is_a_server_error() {
        let store = InMemoryCredentialStore::new(40);
        let err = store.register("ivan", "pw").await.unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
    }

    #[tokio::test]
    async fn empty_password_is_accepted() {
        let store = InMemoryCredentialStore::new(TEST_COST);
        store.register("dave", "").await.unwrap();
        assert!(store.authenticate("dave", "").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_name_registers_once() {
        let store = Arc::new(InMemoryCredentialStore::new(TEST_COST));

        let a = tokio::spawn({
            let store = store.clone();
            async move { store.register("eve", "first").await }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.register("eve", "second").await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(GatewayError::DuplicateRegistration)))
            .count();
        assert_eq!((ok, dup), (1, 1));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_names_all_register() {
        let store = Arc::new(InMemoryCredentialStore::new(TEST_COST));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.register(&format!("user{i}"), "pw").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 8);
    }
}
