use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use serde::{Deserialize, Serialize};

use crate::constants::{http_client, verify_url};
use crate::errors::ApiError;

/// Identity yielded by the external provider for a valid bearer token.
/// Admin status comes from a custom claim attached by the provider.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    user_id: String,
    #[serde(default)]
    claims: Claims,
}

#[derive(Deserialize, Default)]
struct Claims {
    #[serde(default)]
    admin: bool,
}

/// Ask the identity provider to validate `token`. A provider rejection is a
/// 403; an unreachable or misbehaving provider is a 500.
pub async fn verify_token(token: &str) -> Result<VerifiedUser, ApiError> {
    let response = http_client()
        .post(verify_url())
        .json(&VerifyRequest { token })
        .send()
        .await
        .map_err(|e| {
            log::error!("Identity provider unreachable: {e}");
            ApiError::Internal
        })?;

    if !response.status().is_success() {
        return Err(ApiError::InvalidToken);
    }

    let verified: VerifyResponse = response.json().await.map_err(|e| {
        log::error!("Identity provider returned malformed response: {e}");
        ApiError::Internal
    })?;

    Ok(VerifiedUser {
        user_id: verified.user_id,
        is_admin: verified.claims.admin,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::MissingToken)?;

        verify_token(token).await
    }
}
