use axum::{extract::State, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, SignupRequest, SignupResponse, TokenResponse},
        password::{hash_password, verify_against_dummy, verify_password},
        repo::UserError,
    },
    error::{ApiError, ErrorBody},
    extract::{ValidForm, ValidJson},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// Register a new user.
#[utoipa::path(
    post,
    path = "/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "User created", body = SignupResponse),
        (status = 400, description = "Username or email already registered", body = ErrorBody),
        (status = 422, description = "Malformed or invalid input", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ValidJson(mut payload): ValidJson<SignupRequest>,
) -> Result<Json<SignupResponse>, ApiError> {
    payload.normalize();

    // Skip the hash when the name is obviously taken; the store re-checks on insert.
    let existing = state
        .users
        .find_by_username(&payload.username)
        .await
        .map_err(|e| ApiError::internal("Error creating user", e))?;
    if existing.is_some() {
        warn!(username = %payload.username, "username already registered");
        return Err(ApiError::BadRequest(UserError::UsernameTaken.to_string()));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Error creating user", e))?;

    let user = state
        .users
        .create(&payload.username, payload.email.as_deref(), &hash)
        .await
        .map_err(|e| match e {
            UserError::UsernameTaken | UserError::EmailTaken => {
                warn!(username = %payload.username, reason = %e, "signup conflict");
                ApiError::BadRequest(e.to_string())
            }
            UserError::Storage(source) => ApiError::internal("Error creating user", source),
        })?;

    info!(
        user_id = user.id,
        username = %user.username,
        has_email = user.email.is_some(),
        created_at = %user.created_at,
        "user registered"
    );
    Ok(Json(SignupResponse {
        msg: "User created successfully",
    }))
}

/// Exchange a username and password for a bearer access token.
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password", body = ErrorBody),
        (status = 422, description = "Malformed form", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    ValidForm(mut form): ValidForm<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    form.normalize();

    let user = state
        .users
        .find_by_username(&form.username)
        .await
        .map_err(|e| ApiError::internal("Error during login", e))?;

    let Some(user) = user else {
        verify_against_dummy(&form.password);
        warn!(username = %form.username, "login unknown username");
        return Err(bad_credentials());
    };

    let ok = verify_password(&form.password, &user.password_hash)
        .map_err(|e| ApiError::internal("Error during login", e))?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(bad_credentials());
    }
    if user.disabled {
        warn!(user_id = user.id, "login for disabled user");
        return Err(bad_credentials());
    }

    let access_token = state
        .jwt
        .sign_access(&user.username)
        .map_err(|e| ApiError::internal("Error issuing token", e))?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(TokenResponse::bearer(access_token)))
}

fn bad_credentials() -> ApiError {
    ApiError::Unauthorized("Incorrect username or password".into())
}
