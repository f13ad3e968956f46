use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use clubhouse_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterAccountRequest, RegisterAccountResponse,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let response = blocking(&state, move |state| {
        if state.db.get_user_by_username(&req.username)?.is_some() {
            return Err(ApiError::Conflict("username is taken".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = Uuid::new_v4();
        let display_name = req
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&req.username);

        state
            .db
            .create_user(&user_id.to_string(), &req.username, &password_hash, display_name)?;
        info!("Account created: {} ({})", req.username, user_id);

        let token = create_token(&state.jwt_secret, user_id, &req.username)?;
        Ok(RegisterAccountResponse { user_id, token })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |state| {
        let user = state
            .db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::Unauthorized)?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

        let token = create_token(&state.jwt_secret, user_id, &user.username)?;

        Ok(LoginResponse {
            user_id,
            username: user.username,
            is_admin: user.is_admin,
            token,
        })
    })
    .await?;

    Ok(Json(response))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", user_id, "ann").unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, user_id);
        assert_eq!(data.claims.username, "ann");

        let wrong = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::default(),
        );
        assert!(wrong.is_err());
    }
}
