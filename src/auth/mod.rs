// src/auth/mod.rs
// Opaque bearer tokens mapped to user ids. Tokens double as the WebSocket
// query-parameter credential, where the Authorization header is unavailable.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, Uuid>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token for the user. Repeated calls issue independent
    /// tokens; none invalidates the others.
    pub fn issue(&self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.lock().unwrap().insert(token.clone(), user_id);
        token
    }

    pub fn verify(&self, token: &str) -> Option<Uuid> {
        self.tokens.lock().unwrap().get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_to_their_user() {
        let store = TokenStore::new();
        let user = Uuid::new_v4();
        let token = store.issue(user);

        assert_eq!(store.verify(&token), Some(user));
        assert_eq!(store.verify("bogus"), None);
    }

    #[test]
    fn multiple_tokens_per_user_coexist() {
        let store = TokenStore::new();
        let user = Uuid::new_v4();
        let first = store.issue(user);
        let second = store.issue(user);

        assert_ne!(first, second);
        assert_eq!(store.verify(&first), Some(user));
        assert_eq!(store.verify(&second), Some(user));
    }
}
