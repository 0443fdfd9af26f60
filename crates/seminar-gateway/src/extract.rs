//! Request extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use seminar_session::Identity;

use crate::response::ApiError;
use crate::state::AppState;

/// The authenticated caller, resolved from the `Authorization: Bearer`
/// credential through the role authority.
///
/// Every route requires this; a missing or unrecognized credential is a
/// 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthenticated("missing bearer credential"))?;

        let identity = state
            .authority
            .resolve(credential)
            .await?
            .ok_or_else(|| ApiError::unauthenticated("credential not recognized"))?;

        Ok(Caller(identity))
    }
}
