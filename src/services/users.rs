//! Authentication and user management service

use std::{sync::Arc, time::Duration};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    clock::Clock,
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        id::UserId,
        user::{CreateUser, NewUser, User, UserClaims, UserFilter},
    },
    repository::Store,
};

use super::with_deadline;

#[derive(Clone)]
pub struct UsersService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    deadline: Duration,
}

impl UsersService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            deadline,
        }
    }

    /// Register a new user
    pub async fn register(&self, request: CreateUser) -> AppResult<User> {
        request.validate()?;
        let password_hash = self.hash_password(&request.password)?;

        with_deadline(self.deadline, "register", async {
            let user = self
                .store
                .insert_user(NewUser {
                    username: request.username,
                    password_hash,
                    created_at: self.clock.now(),
                })
                .await?;

            tracing::info!(user_id = %user.id, username = %user.username, "User registered");
            Ok(user)
        })
        .await
    }

    /// Get user by ID
    pub async fn get_user(&self, id: UserId) -> AppResult<User> {
        with_deadline(self.deadline, "get_user", async {
            self.store
                .find_user(UserFilter::Id(id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
        })
        .await
    }

    /// Authenticate user by username and return a JWT token
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = with_deadline(self.deadline, "authenticate", async {
            self.store
                .find_user(UserFilter::Username(username.to_string()))
                .await
        })
        .await?
        .ok_or_else(invalid_credentials)?;

        if !self.verify_password(&user, password)? {
            tracing::debug!(username = %username, "Rejected login");
            return Err(invalid_credentials());
        }

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Decode and check a bearer token
    pub fn verify_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Unauthenticated(format!("Invalid token: {}", e)))
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = self.clock.now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.id,
            username: user.username.clone(),
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthenticated("Invalid username or password".to_string())
}
