use std::collections::HashMap;

use crate::{
    error::{LedgerError, LedgerResult},
    schemas::UserNick,
};

/// In-memory bijection between live auth tokens and user ids.
///
/// A user holds at most one live token; logging in again revokes the
/// previous one. Nothing here is persisted.
#[derive(Debug, Default)]
pub struct SessionManager {
    token_to_user: HashMap<String, UserNick>,
    user_to_token: HashMap<UserNick, String>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&mut self, token: String, user_id: &str) {
        if let Some(previous) = self.user_to_token.remove(user_id) {
            self.token_to_user.remove(&previous);
        }
        self.token_to_user.insert(token.clone(), user_id.to_owned());
        self.user_to_token.insert(user_id.to_owned(), token);
    }

    /// Revokes `token`. Unknown tokens are ignored.
    pub fn logout(&mut self, token: &str) {
        if let Some(user_id) = self.token_to_user.remove(token) {
            self.user_to_token.remove(&user_id);
        }
    }

    pub fn resolve(&self, token: &str) -> LedgerResult<&str> {
        self.token_to_user
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| LedgerError::unauthorized("The auth token is not valid"))
    }

    pub fn active_sessions(&self) -> usize {
        self.token_to_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_login_revokes_first_token() {
        let mut sessions = SessionManager::new();
        sessions.login("t1".to_owned(), "alice");
        sessions.login("t2".to_owned(), "alice");

        assert!(matches!(
            sessions.resolve("t1"),
            Err(LedgerError::Unauthorized(_))
        ));
        assert_eq!(sessions.resolve("t2").unwrap(), "alice");
        assert_eq!(sessions.active_sessions(), 1);
    }

    #[test]
    fn logout_removes_both_directions() {
        let mut sessions = SessionManager::new();
        sessions.login("t1".to_owned(), "alice");
        sessions.logout("t1");

        assert!(sessions.resolve("t1").is_err());
        sessions.login("t2".to_owned(), "alice");
        assert_eq!(sessions.active_sessions(), 1);
    }

    #[test]
    fn logout_of_unknown_token_is_a_no_op() {
        let mut sessions = SessionManager::new();
        sessions.login("t1".to_owned(), "alice");
        sessions.logout("nope");

        assert_eq!(sessions.resolve("t1").unwrap(), "alice");
    }

    #[test]
    fn sessions_of_different_users_are_independent() {
        let mut sessions = SessionManager::new();
        sessions.login("a".to_owned(), "alice");
        sessions.login("b".to_owned(), "bob");

        assert_eq!(sessions.resolve("a").unwrap(), "alice");
        assert_eq!(sessions.resolve("b").unwrap(), "bob");
    }
}
