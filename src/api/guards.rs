use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::errors::ApiError;
use crate::db::types::Role;
use crate::services::access::Caller;

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity forwarded by the authenticating gateway. The account id must be a positive
/// integer; a missing role is treated as an unknown, unprivileged one.
pub(crate) struct CurrentCaller(pub(crate) Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or(ApiError::Unauthorized("Caller identity is missing"))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Role::parse)
            .unwrap_or(Role::Unknown);

        Ok(CurrentCaller(Caller::new(account_id, role)))
    }
}
