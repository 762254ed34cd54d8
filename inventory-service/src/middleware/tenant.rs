//! Tenant context extractor for multi-tenancy support.
//!
//! The gateway authenticates the caller and resolves their organization
//! before forwarding a request here; this service never performs
//! authentication itself. It only reads the resolved identity from the
//! forwarded headers and threads it through every operation, so a call
//! without a tenant cannot be expressed.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const ORG_ID_HEADER: &str = "X-Org-ID";
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Resolved caller identity: the tenant everything is scoped to, and the
/// user recorded as creator on ledger entries.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing {} header (required from gateway)", name))
        })?;

    Uuid::parse_str(value)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantContext {
            org_id: header_uuid(parts, ORG_ID_HEADER)?,
            user_id: header_uuid(parts, USER_ID_HEADER)?,
        })
    }
}
