// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated requests.
//!
//! Use `Auth` when the handler only needs the verified claims, and
//! `Account` when it needs the stored record:
//!
//! ```rust,ignore
//! async fn my_handler(Account(record): Account) -> impl IntoResponse {
//!     // record is the caller's UserRecord
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, SessionClaims};
use crate::custody::CustodyError;
use crate::state::AppState;
use crate::storage::UserRecord;

/// Verified session claims from `Authorization: Bearer <token>`.
pub struct Auth(pub SessionClaims);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let claims = state.custody.verify_session(token).inspect_err(|e| {
            tracing::debug!(error = %e, "session rejected");
        })?;

        Ok(Auth(claims))
    }
}

/// The caller's stored record. Rejects sessions whose account is gone.
pub struct Account(pub UserRecord);

impl FromRequestParts<AppState> for Account {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(claims) = Auth::from_request_parts(parts, state).await?;
        match state.custody.account_for_session(&claims) {
            Ok(record) => Ok(Account(record)),
            Err(CustodyError::Unauthorized) => Err(AuthError::AccountNotFound),
            Err(e) => Err(AuthError::InternalError(e.to_string())),
        }
    }
}
