pub mod identity_toolkit;
#[cfg(test)]
pub mod static_tokens;

pub use identity_toolkit::IdentityToolkitAuthenticator;
#[cfg(test)]
pub use static_tokens::StaticAuthenticator;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::error::AuthError;

/// Identity resolved from a verified bearer credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[cfg(test)]
impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// Turns a bearer credential into a stable user identifier
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Extract the credential from an `Authorization: Bearer <token>` header.
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredential)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredential);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers("bearer  xyz ")).unwrap(), "xyz");
    }

    #[test]
    fn test_bearer_token_rejections() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingCredential)));
        assert!(matches!(bearer_token(&headers("Basic abc")), Err(AuthError::MissingCredential)));
        assert!(matches!(bearer_token(&headers("Bearer")), Err(AuthError::MissingCredential)));
        assert!(matches!(bearer_token(&headers("Bearer   ")), Err(AuthError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_static_authenticator() {
        let auth = StaticAuthenticator::new().with_user("good", AuthenticatedUser::new("user-1"));

        assert_eq!(auth.verify("good").await.unwrap().user_id, "user-1");
        assert!(matches!(auth.verify("bad").await, Err(AuthError::InvalidToken)));
    }
}
