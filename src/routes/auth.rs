//! routes/auth.rs
//! Accounts only; the rooms never look at them.
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    routing::post,
    extract::{Extension, Json},
    http::StatusCode,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    config::Config,
    error::{AppErr, AppResult},
    utils::jwt,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupInput {
    #[serde(default)] first_name: String,
    #[serde(default)] last_name:  String,
    #[serde(default)] username:   String,
    #[serde(default)] email:      String,
    #[serde(default)] password:   String,
}

#[derive(Deserialize)]
struct LoginInput {
    #[serde(default)] email:    String,
    #[serde(default)] password: String,
}

#[derive(Serialize)]
struct UserJson {
    id:       String,
    email:    String,
    username: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login",  post(login))
}

/* ---------------- validation ---------------- */
fn plausible_email(s: &str) -> bool {
    let Some((user, host)) = s.split_once('@') else { return false };
    !user.is_empty() && host.contains('.') && !host.starts_with('.') && !host.ends_with('.')
        && !s.contains(char::is_whitespace)
}

fn validate_signup(p: &SignupInput) -> Vec<&'static str> {
    let mut errs = Vec::new();
    if p.first_name.trim().is_empty()      { errs.push("First name is required"); }
    if p.last_name.trim().is_empty()       { errs.push("Last name is required"); }
    if p.username.trim().chars().count() < 3 { errs.push("Username must be at least 3 characters long"); }
    if !plausible_email(p.email.trim())    { errs.push("Please enter a valid email"); }
    if p.password.chars().count() < 6      { errs.push("Password must be at least 6 characters long"); }
    errs
}

fn errors_body(msgs: &[&str]) -> Value {
    json!({ "errors": msgs.iter().map(|m| json!({ "msg": m })).collect::<Vec<_>>() })
}

/* ---------------- Signup ---------------- */
async fn signup(
    Extension(pool): Extension<SqlitePool>,
    Json(p): Json<SignupInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let errs = validate_signup(&p);
    if !errs.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, Json(errors_body(&errs))));
    }

    let username = p.username.trim().to_string();
    let email    = p.email.trim().to_lowercase();

    let taken: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = ? OR username = ?")
            .bind(&email)
            .bind(&username)
            .fetch_optional(&pool)
            .await?;
    if taken.is_some() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(errors_body(&["Email or Username already exists"])),
        ));
    }

    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let hash = Argon2::default()
        .hash_password(p.password.as_bytes(), &salt)
        .map_err(|e| AppErr::Hash(e.to_string()))?
        .to_string();
    let uid = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, username, email, password, created_at)
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(&uid)
    .bind(p.first_name.trim())
    .bind(p.last_name.trim())
    .bind(&username)
    .bind(&email)
    .bind(&hash)
    .bind(Utc::now().to_rfc3339())
    .execute(&pool)
    .await?;

    tracing::info!(user = %uid, "registered");
    let user = UserJson { id: uid, email, username };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": user,
        })),
    ))
}

/* ---------------- Login ---------------- */
async fn login(
    Extension(pool): Extension<SqlitePool>,
    Extension(cfg): Extension<Config>,
    Json(p): Json<LoginInput>,
) -> AppResult<Json<Value>> {
    const DENIED: &str = "Invalid Email or password";
    let email = p.email.trim().to_lowercase();

    let (id, username, pwd): (String, String, String) =
        sqlx::query_as("SELECT id, username, password FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| AppErr::Unauthorized(DENIED.into()))?;

    let parsed = PasswordHash::new(&pwd).map_err(|e| AppErr::Hash(e.to_string()))?;
    if Argon2::default().verify_password(p.password.as_bytes(), &parsed).is_err() {
        return Err(AppErr::Unauthorized(DENIED.into()));
    }

    let token = jwt::sign(&id, &email, &cfg.jwt_secret)?;
    let user  = UserJson { id, email, username };
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}
