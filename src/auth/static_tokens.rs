use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AuthenticatedUser, Authenticator};
use crate::error::AuthError;

/// Fixed token table for tests
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: Arc<RwLock<HashMap<String, AuthenticatedUser>>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.users.write().insert(token.into(), user);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        self.users
            .read()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
