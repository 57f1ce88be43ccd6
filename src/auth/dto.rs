use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::extract::Validate;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Request body for signup.
#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({"username": "testuser", "email": "testuser@example.com", "password": "Test@123"}))]
pub struct SignupRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// At least 8 characters.
    pub password: String,
}

/// Usernames are stored and looked up without surrounding whitespace.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_string()
}

impl SignupRequest {
    /// Trims the username and lowercases the email.
    pub fn normalize(&mut self) {
        self.username = normalize_username(&self.username);
        if let Some(email) = self.email.as_mut() {
            *email = email.trim().to_lowercase();
        }
    }
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("Username must not be empty".into());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email.trim()) {
                return Err("Invalid email".into());
            }
        }
        Ok(())
    }
}

/// OAuth2 password-grant style login form.
#[derive(Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    /// Applies the same username normalization as signup.
    pub fn normalize(&mut self) {
        self.username = normalize_username(&self.username);
    }
}

impl Validate for LoginForm {
    fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("Username must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    pub msg: &'static str,
}

/// Longest address SMTP can route (RFC 5321 path limit minus the brackets).
const MAX_EMAIL_LEN: usize = 254;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$"
    )
    .expect("email pattern compiles");
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}
