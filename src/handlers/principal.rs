//! Caller identity extractors.
//!
//! Authentication happens upstream; the gateway forwards the resolved
//! principal id in `x-principal-id`. A missing header means anonymous.

use crate::{errors::AppError, models::principal::Principal};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// Required caller identity. Rejects with 401 when absent.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

/// Optional caller identity for read paths.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<Principal>);

fn principal_from_headers(headers: &HeaderMap) -> Result<Option<Principal>, AppError> {
    let Some(value) = headers.get(PRINCIPAL_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|id| Some(Principal(id)))
        .ok_or_else(|| AppError::bad_request(format!("malformed {PRINCIPAL_HEADER} header")))
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)?
            .map(Authenticated)
            .ok_or_else(|| AppError::unauthenticated("authentication required"))
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Viewer)
    }
}
