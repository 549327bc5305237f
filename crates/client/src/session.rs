//! Signed-in user and bearer token.

use serde::{Deserialize, Serialize};
use trashtocash_domain::Role;

use crate::storage::SnapshotStore;

const SESSION_KEY: &str = "session";

/// The account fields the shell needs, as returned by `/api/auth/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionState {
    token: String,
    user: SessionUser,
}

pub struct Session<S> {
    state: Option<SessionState>,
    store: S,
}

impl<S: SnapshotStore> Session<S> {
    pub fn open(mut store: S) -> Self {
        let state = match store.load(SESSION_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!("Discarding unreadable session: {e}");
                    if let Err(e) = store.remove(SESSION_KEY) {
                        tracing::warn!("Failed to discard unreadable session: {e}");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read session: {e}");
                None
            }
        };
        Self { state, store }
    }

    pub fn sign_in(&mut self, token: String, user: SessionUser) {
        let state = SessionState { token, user };
        match serde_json::to_string(&state) {
            Ok(raw) => {
                if let Err(e) = self.store.save(SESSION_KEY, &raw) {
                    tracing::warn!("Failed to save session: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to encode session: {e}"),
        }
        self.state = Some(state);
    }

    /// Replaces the cached user after a profile edit, keeping the token.
    pub fn update_user(&mut self, user: SessionUser) {
        if let Some(state) = self.state.take() {
            self.sign_in(state.token, user);
        }
    }

    pub fn sign_out(&mut self) {
        self.state = None;
        if let Err(e) = self.store.remove(SESSION_KEY) {
            tracing::warn!("Failed to remove session: {e}");
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.state.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.role.is_admin())
    }

    /// Value for the `Authorization` header of API requests.
    pub fn bearer_header(&self) -> Option<String> {
        self.token().map(|t| format!("Bearer {t}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoreError};

    fn admin() -> SessionUser {
        SessionUser {
            id: "u1".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            email: "asha@example.com".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn sign_in_persists_and_restores() {
        let mut session = Session::open(MemoryStore::new());
        assert!(!session.is_authenticated());

        session.sign_in("tok".to_string(), admin());
        assert!(session.is_admin());
        assert_eq!(session.bearer_header().as_deref(), Some("Bearer tok"));

        let restored = Session::open(session.store.clone());
        assert_eq!(restored.user(), Some(&admin()));
    }

    #[test]
    fn sign_out_forgets_everything() {
        let mut session = Session::open(MemoryStore::new());
        session.sign_in("tok".to_string(), admin());
        session.sign_out();

        assert!(!session.is_authenticated());
        assert!(!session.is_admin());
        assert_eq!(session.store.get(SESSION_KEY), None);
    }

    /// Holds a corrupt session and refuses every removal.
    struct StuckStore;

    impl SnapshotStore for StuckStore {
        fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(Some("{not json".to_string()))
        }

        fn save(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidKey(key.to_string()))
        }
    }

    #[test]
    fn unreadable_session_opens_signed_out_even_if_discard_fails() {
        let session = Session::open(StuckStore);
        assert!(!session.is_authenticated());
        assert_eq!(session.user(), None);
    }

    #[test]
    fn update_user_keeps_token() {
        let mut session = Session::open(MemoryStore::new());
        session.update_user(admin());
        assert!(!session.is_authenticated());

        session.sign_in("tok".to_string(), admin());
        let mut demoted = admin();
        demoted.role = Role::Customer;
        session.update_user(demoted);

        assert_eq!(session.token(), Some("tok"));
        assert!(!session.is_admin());
    }
}
