use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
    users::repo::{NewUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let hash = hash_password(&payload.password)?;
    let new_user = NewUser {
        username: payload.username,
        email: payload.email,
        name: payload.name,
        password_hash: hash,
        role: payload.role,
    };

    let user = match User::create(&state.db, &new_user).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!(username = %new_user.username, "username or email already taken");
            return Err(ApiError::bad_request("Username or email already taken"));
        }
        Err(e) => return Err(ApiError::Internal(e)),
    };

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: format!("User created with name {}", user.name),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = User::find_by_username(&state.db, &payload.username)
        .await?
        .ok_or_else(|| {
            warn!(username = %payload.username, "login unknown username");
            ApiError::not_found(format!("User {} is not registered", payload.username))
        })?;

    if !verify_password(&payload.password, &user.password)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::bad_request("Invalid Password"));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, user.role)?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        token,
        name: user.name,
        id: user.id,
    }))
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|d| d.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_shape() {
        let resp = LoginResponse {
            token: "abc.def.ghi".into(),
            name: "Alice".into(),
            id: 1,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["token"], "abc.def.ghi");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn register_message_names_the_user() {
        let resp = RegisterResponse {
            success: true,
            message: format!("User created with name {}", "Alice"),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("User created with name Alice"));
    }
}
