use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthenticatedUser, Authenticator};
use crate::error::AuthError;

const LOGGED_BODY_LIMIT: usize = 300;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
}

/// Verifies identity-provider ID tokens through the account lookup endpoint
pub struct IdentityToolkitAuthenticator {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IdentityToolkitAuthenticator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Authenticator for IdentityToolkitAuthenticator {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let url = format!("{}/v1/accounts:lookup", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&LookupRequest { id_token: token })
            .send()
            .await
            .map_err(|e| {
                warn!("Identity lookup failed: {}", e);
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                status = status.as_u16(),
                body = %body.chars().take(LOGGED_BODY_LIMIT).collect::<String>(),
                "identity token rejected"
            );
            return Err(AuthError::InvalidToken);
        }

        let lookup: LookupResponse = response.json().await.map_err(|e| {
            warn!("Malformed identity lookup response: {}", e);
            AuthError::Unavailable(format!("malformed lookup response: {}", e))
        })?;

        let user = lookup
            .users
            .into_iter()
            .next()
            .filter(|u| !u.local_id.is_empty())
            .ok_or(AuthError::InvalidToken)?;

        Ok(AuthenticatedUser {
            user_id: user.local_id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn lookup(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if params.get("key").map(String::as_str) != Some("api-key") {
            return (StatusCode::FORBIDDEN, Json(json!({ "error": "bad key" })));
        }
        match body["idToken"].as_str() {
            Some("valid") => (
                StatusCode::OK,
                Json(json!({ "users": [{ "localId": "uid-42", "email": "buyer@example.com" }] })),
            ),
            Some("orphan") => (StatusCode::OK, Json(json!({ "users": [] }))),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "INVALID_ID_TOKEN" } })),
            ),
        }
    }

    async fn authenticator(key: &str) -> IdentityToolkitAuthenticator {
        // The colon in the lookup path would read as a route parameter
        let base = spawn_stub(Router::new().fallback(lookup)).await;
        IdentityToolkitAuthenticator::new(base, key, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let auth = authenticator("api-key").await;
        let user = auth.verify("valid").await.unwrap();

        assert_eq!(user.user_id, "uid-42");
        assert_eq!(user.email.as_deref(), Some("buyer@example.com"));
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let auth = authenticator("api-key").await;
        assert!(matches!(auth.verify("forged").await, Err(AuthError::InvalidToken)));
        assert!(matches!(auth.verify("orphan").await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let auth = IdentityToolkitAuthenticator::new(
            "http://127.0.0.1:1",
            "api-key",
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(matches!(auth.verify("valid").await, Err(AuthError::Unavailable(_))));
    }
}
