//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Bearer token extraction for authenticated routes."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use docqa_authz::Actor;
use tracing::debug;

use crate::error::ApiError;
use crate::ApiState;

/// Authenticated caller resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);
        let Some(token) = token else {
            state.metrics().inc_auth_failure();
            return Err(ApiError::unauthorized("missing bearer token"));
        };
        match state.identity().authenticate(token) {
            Ok(claims) => Ok(CurrentActor(claims.actor())),
            Err(err) => {
                state.metrics().inc_auth_failure();
                debug!(error = %err, "bearer authentication failed");
                Err(ApiError::unauthorized(err.to_string()))
            }
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::bearer_token;

    #[test]
    fn parses_bearer_scheme() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
