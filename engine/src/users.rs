//! User registry and the persisted login session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use fxdesk_common::{Timestamp, UserId};
use fxdesk_crypto::credentials::{generate_salt, hash_password, verify_password};
use fxdesk_store::{DocumentKey, DocumentStore, StoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{UserError, UserResult};
use crate::portfolio::{Portfolio, PortfolioBook};

pub const USERS_DOCUMENT: &str = "users";
pub const SESSION_DOCUMENT: &str = "session";

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Stored form of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub credential_hash: String,
    pub salt: String,
    pub registered_at: Timestamp,
}

/// The `users` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersDocument {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserRecord>,
}

impl UsersDocument {
    fn find(&self, username: &str) -> Option<(UserId, &UserRecord)> {
        self.users
            .iter()
            .find(|(_, record)| record.username.eq_ignore_ascii_case(username))
            .map(|(id, record)| (*id, record))
    }

    fn next_id(&self) -> UserId {
        self.users
            .keys()
            .next_back()
            .map(UserId::next)
            .unwrap_or_else(|| UserId::new(1))
    }
}

/// Public view of a registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub registered_at: Timestamp,
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub logged_in_at: Timestamp,
}

/// The `session` document; survives between CLI invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub user: Option<Session>,
}

/// Registration, authentication and session tracking.
#[derive(Debug, Clone)]
pub struct UserRegistry {
    store: Arc<DocumentStore>,
    users_key: DocumentKey,
    session_key: DocumentKey,
    book: PortfolioBook,
    base: String,
    initial_balance: Decimal,
}

impl UserRegistry {
    /// New users start with `initial_balance` of `base`.
    pub fn new(
        store: Arc<DocumentStore>,
        book: PortfolioBook,
        base: impl Into<String>,
        initial_balance: Decimal,
    ) -> StoreResult<Self> {
        Ok(Self {
            store,
            users_key: DocumentKey::new(USERS_DOCUMENT)?,
            session_key: DocumentKey::new(SESSION_DOCUMENT)?,
            book,
            base: base.into(),
            initial_balance,
        })
    }

    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> UserResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserError::EmptyUsername);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let salt = generate_salt();
        let credential_hash = hash_password(password, &salt)?;
        let record = UserRecord {
            username: username.to_string(),
            credential_hash,
            salt,
            registered_at: Utc::now(),
        };

        let id = self
            .store
            .update(&self.users_key, |doc: &mut UsersDocument| {
                if doc.find(username).is_some() {
                    return Err(UserError::UsernameTaken(username.to_string()));
                }
                let id = doc.next_id();
                doc.users.insert(id, record.clone());
                Ok(id)
            })?;

        self.open_portfolio(id)?;
        info!(user = %id, username, "User registered");

        Ok(User {
            id,
            username: record.username,
            registered_at: record.registered_at,
        })
    }

    /// Check credentials and record the session.
    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str) -> UserResult<Session> {
        let doc: UsersDocument = self.store.read(&self.users_key)?;
        let (id, record) = doc
            .find(username.trim())
            .ok_or_else(|| UserError::UserNotFound(username.trim().to_string()))?;

        if !verify_password(password, &record.salt, &record.credential_hash) {
            warn!(user = %id, "Login rejected");
            return Err(UserError::InvalidCredentials);
        }

        // Registration writes two documents; repair a missing portfolio here.
        if self.open_portfolio(id)? {
            warn!(user = %id, "Portfolio was missing and has been opened");
        }

        let session = Session {
            user_id: id,
            username: record.username.clone(),
            logged_in_at: Utc::now(),
        };
        self.store.write(
            &self.session_key,
            &SessionDocument {
                user: Some(session.clone()),
            },
        )?;

        info!(user = %id, "Logged in");
        Ok(session)
    }

    /// Clear the session. Returns the user that was logged in, if any.
    pub fn logout(&self) -> UserResult<Option<Session>> {
        let previous = self
            .store
            .update(&self.session_key, |doc: &mut SessionDocument| {
                Ok::<_, UserError>(doc.user.take())
            })?;
        if let Some(session) = &previous {
            info!(user = %session.user_id, "Logged out");
        }
        Ok(previous)
    }

    pub fn current_user(&self) -> UserResult<Option<Session>> {
        let doc: SessionDocument = self.store.read(&self.session_key)?;
        Ok(doc.user)
    }

    fn open_portfolio(&self, id: UserId) -> StoreResult<bool> {
        self.book
            .open(id, Portfolio::with_balance(&self.base, self.initial_balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn registry() -> (UserRegistry, PortfolioBook, Arc<DocumentStore>) {
        let store = Arc::new(DocumentStore::in_memory());
        let book = PortfolioBook::new(store.clone()).unwrap();
        let registry = UserRegistry::new(store.clone(), book.clone(), "USD", dec!(1000)).unwrap();
        (registry, book, store)
    }

    #[test]
    fn test_register_assigns_ids_and_opens_portfolio() {
        let (registry, book, _) = registry();

        let alice = registry.register("alice", "secret").unwrap();
        let bob = registry.register("bob", "hunter2").unwrap();

        assert_eq!(alice.id, UserId::new(1));
        assert_eq!(bob.id, UserId::new(2));
        assert_eq!(book.get(alice.id).unwrap().balance("USD"), dec!(1000));
    }

    #[test]
    fn test_register_validation() {
        let (registry, _, _) = registry();
        registry.register("Alice", "secret").unwrap();

        assert!(matches!(
            registry.register("ALICE", "secret"),
            Err(UserError::UsernameTaken(_))
        ));
        assert!(matches!(registry.register("  ", "secret"), Err(UserError::EmptyUsername)));
        assert!(matches!(
            registry.register("carol", "abc"),
            Err(UserError::WeakPassword { min: 4 })
        ));
    }

    #[test]
    fn test_password_is_salted_not_stored() {
        let (registry, _, store) = registry();
        registry.register("alice", "secret").unwrap();
        registry.register("bob", "secret").unwrap();

        let doc: UsersDocument = store.read(&DocumentKey::new(USERS_DOCUMENT).unwrap()).unwrap();
        let alice = &doc.users[&UserId::new(1)];
        let bob = &doc.users[&UserId::new(2)];

        assert_eq!(alice.salt.len(), 8);
        assert_ne!(alice.credential_hash, "secret");
        assert_ne!(alice.credential_hash, bob.credential_hash);
    }

    #[test]
    fn test_login_and_logout() {
        let (registry, _, _) = registry();
        let alice = registry.register("alice", "secret").unwrap();

        assert!(matches!(
            registry.login("alice", "wrong"),
            Err(UserError::InvalidCredentials)
        ));
        assert!(matches!(
            registry.login("mallory", "secret"),
            Err(UserError::UserNotFound(_))
        ));
        assert_eq!(registry.current_user().unwrap(), None);

        let session = registry.login("ALICE", "secret").unwrap();
        assert_eq!(session.user_id, alice.id);
        assert_eq!(session.username, "alice");
        assert_eq!(registry.current_user().unwrap(), Some(session.clone()));

        assert_eq!(registry.logout().unwrap(), Some(session));
        assert_eq!(registry.current_user().unwrap(), None);
        assert_eq!(registry.logout().unwrap(), None);
    }

    #[test]
    fn test_login_repairs_missing_portfolio() {
        let (registry, book, store) = registry();
        let alice = registry.register("alice", "secret").unwrap();
        store
            .write(
                &DocumentKey::new(crate::portfolio::PORTFOLIOS_DOCUMENT).unwrap(),
                &crate::portfolio::PortfoliosDocument::default(),
            )
            .unwrap();

        registry.login("alice", "secret").unwrap();

        assert_eq!(book.get(alice.id).unwrap().balance("USD"), dec!(1000));
    }
}
