use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::claims::TokenKind;
use super::jwt::JwtKeys;
use super::repo::User;
use crate::{error::ApiError, state::AppState};

/// Extracts the bearer token and validates it as an access token, returning
/// the subject user id. Pure computation, no database access.
#[derive(Debug)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);

        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::token("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::token("Invalid Authorization header"))?;

        let claims = keys.verify_kind(token, TokenKind::Access)?;
        Ok(AuthUser(claims.sub))
    }
}

/// AuthUser plus the live user row. Rejects when the subject no longer
/// exists or the account is deactivated. Handlers must derive ownership
/// from this resolved id, never from ids supplied by the client.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;

        let user = User::find_by_id(&state.db, user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if !user.is_active {
            return Err(ApiError::forbidden("Account is deactivated"));
        }

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(auth_header: Option<&str>) -> Result<AuthUser, ApiError> {
        let state = AppState::fake();
        let mut builder = Request::builder().uri("/");
        if let Some(value) = auth_header {
            builder = builder.header(axum::http::header::AUTHORIZATION, value);
        }
        let request = builder.body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        AuthUser::from_request_parts(&mut parts, &state).await
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let err = extract(Some("Basic dXNlcjpwdw==")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_access_token_resolves_subject() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state).sign_access(33).expect("sign");
        let AuthUser(id) = extract(Some(&format!("Bearer {token}"))).await.expect("extract");
        assert_eq!(id, 33);
    }

    #[tokio::test]
    async fn refresh_token_cannot_authenticate_requests() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state).sign_refresh(33).expect("sign");
        let err = extract(Some(&format!("Bearer {token}"))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
