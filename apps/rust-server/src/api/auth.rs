// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-up, sign-in and session introspection.
//!
//! Password hashing and key derivation are CPU-bound, so the custody calls
//! run on the blocking pool.

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::Account,
    custody::{CustodyError, SessionGrant},
    error::{ApiError, ErrorBody},
    models::{AuthResponse, CredentialsRequest, MeResponse},
    state::AppState,
};

async fn run_blocking<F>(f: F) -> Result<SessionGrant, ApiError>
where
    F: FnOnce() -> Result<SessionGrant, CustodyError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "custody task failed");
            ApiError::internal("Internal error")
        })?
        .map_err(ApiError::from)
}

fn grant_response(grant: SessionGrant) -> Json<AuthResponse> {
    Json(AuthResponse {
        access_token: grant.token,
        wallet_address: grant.address.to_checksum(None),
    })
}

/// Create an account with a freshly generated custodial key.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    tag = "Auth",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Missing email or password", body = ErrorBody),
        (status = 409, description = "Account already exists", body = ErrorBody)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let custody = state.custody.clone();
    let grant = run_blocking(move || custody.create_account(&body.email, &body.password)).await?;
    Ok((StatusCode::CREATED, grant_response(grant)))
}

/// Verify credentials and issue a session.
///
/// Legacy plaintext credentials are migrated on success.
#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    tag = "Auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Missing email or password", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 409, description = "Account has no custodial key and requires migration", body = ErrorBody)
    )
)]
pub async fn signin(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let custody = state.custody.clone();
    let grant = run_blocking(move || custody.authenticate(&body.email, &body.password)).await?;
    Ok(grant_response(grant))
}

/// The signed-in account.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current account", body = MeResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn me(Account(record): Account) -> Json<MeResponse> {
    Json(MeResponse {
        email: record.id,
        wallet_address: record.primary_address,
    })
}
