// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    models::{
        AddressResponse, AuthResponse, BalanceResponse, CredentialsRequest, MeResponse,
        SendRequest, SmartAccountResponse, SpendLimitResponse, SponsoredSendRequest,
        TransactionEntry, TransactionsResponse, TxHashResponse,
    },
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod middleware;
pub mod transfers;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/me", get(auth::me));

    let wallet_routes = Router::new()
        .route("/address", get(wallet::get_address))
        .route("/aa-address", get(wallet::get_smart_account_address))
        .route("/balance", get(wallet::get_balance))
        .route("/transactions", get(wallet::list_transactions))
        .route("/limits", get(wallet::get_limits))
        .route("/send", post(transfers::send))
        .route("/send-aa", post(transfers::send_aa))
        .route("/sponsor", post(transfers::sponsor))
        .route("/send-sponsored", post(transfers::send_sponsored));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ]);

    // Later layers wrap earlier ones; the request id is set first so every
    // layer below (tracing included) sees it.
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1/auth", auth_routes)
        .nest("/v1/wallet", wallet_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        auth::signup,
        auth::signin,
        auth::me,
        wallet::get_address,
        wallet::get_smart_account_address,
        wallet::get_balance,
        wallet::list_transactions,
        wallet::get_limits,
        transfers::send,
        transfers::send_aa,
        transfers::sponsor,
        transfers::send_sponsored
    ),
    components(
        schemas(
            health::HealthResponse,
            ErrorBody,
            CredentialsRequest,
            AuthResponse,
            MeResponse,
            AddressResponse,
            SmartAccountResponse,
            BalanceResponse,
            TransactionEntry,
            TransactionsResponse,
            SpendLimitResponse,
            SendRequest,
            SponsoredSendRequest,
            TxHashResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and storage readiness"),
        (name = "Auth", description = "Account creation and sessions"),
        (name = "Wallet", description = "Addresses, balances and history"),
        (name = "Transfers", description = "Direct and sponsored transfers")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn signup(app: &Router, email: &str, password: &str) -> (String, String) {
        let (status, body) = call(
            app,
            Method::POST,
            "/v1/auth/signup",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["accessToken"].as_str().unwrap().to_string(),
            body["walletAddress"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn signup_then_signin_returns_same_wallet() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));

        let (_, address) = signup(&app, "alice@example.com", "correct horse").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/auth/signin",
            None,
            Some(json!({ "email": "alice@example.com", "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["walletAddress"], address);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/auth/signin",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        signup(&app, "bob@example.com", "pw").await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/auth/signup",
            None,
            Some(json!({ "email": "bob@example.com", "password": "other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/auth/signup",
            None,
            Some(json!({ "email": "carol@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn session_routes_require_a_token() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));

        let (status, _) = call(&app, Method::GET, "/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::GET, "/v1/wallet/address", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_and_address_reflect_the_account() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        let (token, address) = signup(&app, "dave@example.com", "pw").await;

        let (status, body) = call(&app, Method::GET, "/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "dave@example.com");
        assert_eq!(body["walletAddress"], address);

        let (status, body) = call(&app, Method::GET, "/v1/wallet/address", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], address);
    }

    #[tokio::test]
    async fn sponsored_routes_answer_501_without_bundler() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        let (token, _) = signup(&app, "erin@example.com", "pw").await;

        let (status, body) = call(&app, Method::GET, "/v1/wallet/aa-address", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["code"], "not_configured");

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/wallet/send-aa",
            Some(&token),
            Some(json!({ "to": "0x000000000000000000000000000000000000dEaD", "amount": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn retired_sponsorship_routes_are_gone() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));

        for uri in ["/v1/wallet/sponsor", "/v1/wallet/send-sponsored"] {
            let (status, body) = call(&app, Method::POST, uri, None, Some(json!({ "anything": 1 }))).await;
            assert_eq!(status, StatusCode::GONE);
            assert!(body["error"].as_str().unwrap().contains("/v1/wallet/send-aa"));

            let (status, _) = call(&app, Method::POST, uri, None, None).await;
            assert_eq!(status, StatusCode::GONE);
        }
    }

    #[tokio::test]
    async fn direct_send_validates_before_signing() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        let (token, _) = signup(&app, "frank@example.com", "pw").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/wallet/send",
            Some(&token),
            Some(json!({ "to": "0x000000000000000000000000000000000000dEaD" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing to/amount");

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/wallet/send",
            Some(&token),
            Some(json!({ "to": "not-an-address", "amount": "5" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/wallet/send",
            Some(&token),
            Some(json!({ "to": "0x000000000000000000000000000000000000dEaD", "amount": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn limits_start_at_zero_without_cap() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        let (token, _) = signup(&app, "grace@example.com", "pw").await;

        let (status, body) = call(&app, Method::GET, "/v1/wallet/limits", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["spent"], "0");
        assert!(body["limit"].is_null());
    }

    #[tokio::test]
    async fn unreachable_node_surfaces_as_failure() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));
        let (token, _) = signup(&app, "heidi@example.com", "pw").await;

        let (status, body) = call(&app, Method::GET, "/v1/wallet/balance", Some(&token), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "failed");
    }

    #[tokio::test]
    async fn responses_carry_request_id_and_security_headers() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers.contains_key("x-request-id"));
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
    }

    #[tokio::test]
    async fn excess_requests_are_rate_limited() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.rate_limit_per_minute = 2;
        let app = router(AppState::from_config(config).unwrap());

        for _ in 0..2 {
            let (status, _) = call(&app, Method::GET, "/health/live", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let response = app
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/v1/auth/signup",
            "/v1/wallet/send",
            "/v1/wallet/send-aa",
            "/v1/wallet/sponsor",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = &doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("bearer"));
    }
}
