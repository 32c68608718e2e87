// ABOUTME: Axum handlers for the OAuth2/OIDC HTTP surface
// ABOUTME: Authorize login form, token endpoint, revocation, discovery, and JWKS
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # OAuth 2.0 HTTP Routes
//!
//! Thin translation layer: extract parameters, call the orchestrator, render
//! the outcome. All user-echoed values in the login form are HTML-escaped.

use crate::audit::{self, AuditContext, AuditEvent};
use crate::auth::AuthDecision;
use crate::oauth2::endpoints::{AuthorizeRejection, ClientCredentials, ValidatedAuthorize};
use crate::oauth2::models::{
    AuthorizeParams, LoginForm, OAuth2Error, RevokeRequest, TokenRequest, TokenResponse,
};
use crate::server::ServerResources;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use url::Url;

/// OAuth2 and well-known routes
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/oauth/authorize", get(handle_authorize_page).post(handle_authorize_submit))
        .route("/oauth/token", post(handle_token))
        .route("/oauth/revoke", post(handle_revoke))
        .route("/oauth/userinfo", get(handle_userinfo))
        .route("/.well-known/openid-configuration", get(handle_discovery))
        .route("/.well-known/jwks.json", get(handle_jwks))
        .with_state(resources)
}

/// GET /oauth/authorize: validate the request and render the login form
async fn handle_authorize_page(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match resources.oauth2.validate_authorize(&params).await {
        Ok(authorize) => Html(render_login_form(&authorize, None)).into_response(),
        Err(rejection) => {
            audit_authorize_denied(&params, &headers, &rejection);
            render_rejection(rejection)
        }
    }
}

/// POST /oauth/authorize: authenticate and redirect back with a code
async fn handle_authorize_submit(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    // Re-validate everything: the form round-trip is untrusted input
    let params = AuthorizeParams {
        response_type: Some("code".to_string()),
        client_id: form.client_id.clone(),
        redirect_uri: form.redirect_uri.clone(),
        scope: form.scope.clone(),
        state: form.state.clone(),
        code_challenge: form.code_challenge.clone(),
        code_challenge_method: form.code_challenge_method.clone(),
        nonce: form.nonce.clone(),
    };

    let authorize = match resources.oauth2.validate_authorize(&params).await {
        Ok(authorize) => authorize,
        Err(rejection) => {
            audit_authorize_denied(&params, &headers, &rejection);
            return render_rejection(rejection);
        }
    };

    let (Some(email), Some(password)) = (form.email.as_deref(), form.password.as_deref()) else {
        return login_retry(&authorize);
    };

    let context = audit_context(&headers);
    match resources.auth.authenticate(email, password, &context).await {
        Ok(AuthDecision::Authenticated(user)) => {
            match resources
                .oauth2
                .issue_authorization_code(&authorize, user.id, &context)
                .await
            {
                Ok(code) => {
                    let mut target = match Url::parse(&authorize.redirect_uri) {
                        Ok(url) => url,
                        Err(_) => {
                            return error_json(&OAuth2Error::server_error("Invalid redirect URI"))
                        }
                    };
                    target.query_pairs_mut().append_pair("code", &code);
                    if let Some(state) = &authorize.state {
                        target.query_pairs_mut().append_pair("state", state);
                    }
                    Redirect::to(target.as_str()).into_response()
                }
                Err(error) => error_json(&error),
            }
        }
        // One generic message for unknown-user, wrong-password, and locked
        Ok(AuthDecision::Denied(_)) => login_retry(&authorize),
        Err(err) => {
            tracing::error!("Authentication failed internally: {err:#}");
            error_json(&OAuth2Error::server_error("Internal server error"))
        }
    }
}

/// POST /oauth/token
async fn handle_token(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let credentials = extract_client_credentials(&headers, &request);
    let context = audit_context(&headers);

    match resources.oauth2.token(&credentials, &request, &context).await {
        Ok(response) => token_json(&response),
        Err(error) => error_json(&error),
    }
}

/// POST /oauth/revoke: always 200 {} (RFC 7009)
async fn handle_revoke(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Form(request): Form<RevokeRequest>,
) -> Response {
    if let Some(token) = request.token.as_deref().filter(|t| !t.is_empty()) {
        let context = audit_context(&headers);
        resources.oauth2.revoke(token, &context).await;
    }
    Json(serde_json::json!({})).into_response()
}

/// GET /oauth/userinfo: reserved, not implemented
async fn handle_userinfo() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "error": "unsupported_endpoint",
            "error_description": "The userinfo endpoint is not implemented; use the ID token claims"
        })),
    )
        .into_response()
}

/// GET /.well-known/openid-configuration
async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
    let issuer = resources.config.issuer_url.trim_end_matches('/');
    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "revocation_endpoint": format!("{issuer}/oauth/revoke"),
        "userinfo_endpoint": format!("{issuer}/oauth/userinfo"),
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "scopes_supported": crate::oauth2::endpoints::SUPPORTED_SCOPES,
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": [resources.keys.algorithm_name()],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "code_challenge_methods_supported": ["S256", "plain"],
        "claims_supported": ["sub", "iss", "aud", "exp", "iat", "auth_time", "nonce",
                             "email", "email_verified", "name", "at_hash"]
    }))
    .into_response()
}

/// GET /.well-known/jwks.json
async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Response {
    Json(resources.keys.jwks()).into_response()
}

/// Basic authorization header takes precedence over body credentials
fn extract_client_credentials(headers: &HeaderMap, request: &TokenRequest) -> ClientCredentials {
    if let Some(basic) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    {
        if let Some((client_id, client_secret)) = STANDARD
            .decode(basic.trim())
            .ok()
            .and_then(|decoded| String::from_utf8(decoded).ok())
            .and_then(|decoded| {
                decoded
                    .split_once(':')
                    .map(|(id, secret)| (id.to_string(), secret.to_string()))
            })
        {
            return ClientCredentials {
                client_id: Some(client_id),
                client_secret: Some(client_secret),
            };
        }
    }

    ClientCredentials {
        client_id: request.client_id.clone(),
        client_secret: request.client_secret.clone(),
    }
}

fn audit_authorize_denied(
    params: &AuthorizeParams,
    headers: &HeaderMap,
    rejection: &AuthorizeRejection,
) {
    let error = match rejection {
        AuthorizeRejection::Fatal(error) | AuthorizeRejection::Redirect { error, .. } => error,
    };
    audit::record(
        AuditEvent::AuthorizationDenied,
        None,
        params.client_id.as_deref(),
        &audit_context(headers),
        &error.error,
    );
}

fn audit_context(headers: &HeaderMap) -> AuditContext {
    AuditContext {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string),
    }
}

fn render_rejection(rejection: AuthorizeRejection) -> Response {
    match rejection {
        AuthorizeRejection::Fatal(error) => {
            (StatusCode::BAD_REQUEST, Json(error)).into_response()
        }
        AuthorizeRejection::Redirect {
            redirect_uri,
            state,
            error,
        } => match Url::parse(&redirect_uri) {
            Ok(mut target) => {
                target.query_pairs_mut().append_pair("error", &error.error);
                target
                    .query_pairs_mut()
                    .append_pair("error_description", &error.error_description);
                if let Some(state) = &state {
                    target.query_pairs_mut().append_pair("state", state);
                }
                Redirect::to(target.as_str()).into_response()
            }
            Err(_) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
        },
    }
}

fn login_retry(authorize: &ValidatedAuthorize) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Html(render_login_form(authorize, Some("Invalid email or password"))),
    )
        .into_response()
}

fn token_json(response: &TokenResponse) -> Response {
    (
        [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
        Json(response),
    )
        .into_response()
}

fn error_json(error: &OAuth2Error) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error)).into_response()
}

/// Simple HTML login form that carries the OAuth parameters through the
/// credential round-trip
fn render_login_form(authorize: &ValidatedAuthorize, error_message: Option<&str>) -> String {
    use html_escape::encode_double_quoted_attribute as attr;
    use html_escape::encode_text;

    let error_html = error_message.map_or_else(String::new, |message| {
        format!(r#"<p class="error">{}</p>"#, encode_text(message))
    });

    let hidden = |name: &str, value: Option<&str>| {
        value.map_or_else(String::new, |value| {
            format!(
                r#"<input type="hidden" name="{name}" value="{}">"#,
                attr(value)
            )
        })
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Sign in - {client_name}</title>
    <style>
        body {{ font-family: -apple-system, sans-serif; background: #f5f5f5; }}
        .login-form {{ max-width: 400px; margin: 80px auto; padding: 24px; background: #fff; border: 1px solid #ddd; border-radius: 8px; }}
        input[type=email], input[type=password] {{ width: 100%; padding: 8px; margin: 8px 0 16px; box-sizing: border-box; }}
        button {{ width: 100%; padding: 10px; background: #2b6cb0; color: #fff; border: none; border-radius: 4px; }}
        .error {{ color: #c53030; }}
    </style>
</head>
<body>
    <div class="login-form">
        <h2>Sign in to continue to {client_name}</h2>
        {error_html}
        <form method="post" action="/oauth/authorize">
            {client_id}{redirect_uri}{scope}{state}{code_challenge}{code_challenge_method}{nonce}
            <label for="email">Email</label>
            <input type="email" id="email" name="email" required autofocus>
            <label for="password">Password</label>
            <input type="password" id="password" name="password" required>
            <button type="submit">Sign in</button>
        </form>
    </div>
</body>
</html>"#,
        client_name = encode_text(&authorize.client.name),
        error_html = error_html,
        client_id = hidden("client_id", Some(&authorize.client.client_id)),
        redirect_uri = hidden("redirect_uri", Some(&authorize.redirect_uri)),
        scope = hidden("scope", Some(&authorize.scopes.join(" "))),
        state = hidden("state", authorize.state.as_deref()),
        code_challenge = hidden("code_challenge", authorize.code_challenge.as_deref()),
        code_challenge_method =
            hidden("code_challenge_method", authorize.code_challenge_method.as_deref()),
        nonce = hidden("nonce", authorize.nonce.as_deref()),
    )
}
