use askama::Template;
use axum::extract::State;
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::params;
use serde::Deserialize;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: String,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub error: String,
}

// -- Forms --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(cookie_name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        cookie_name, token, max_age_secs
    )
}

fn clear_session_cookie(cookie_name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", cookie_name)
}

/// Insert a user row; `Ok(None)` when the email is already taken. The
/// UNIQUE constraint is the arbiter, so two concurrent sign-ups with the
/// same email race down to one row and one friendly rejection.
fn insert_user(
    conn: &rusqlite::Connection,
    email: &str,
    password_hash: &str,
) -> AppResult<Option<i64>> {
    match conn.execute(
        "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
        params![email, password_hash],
    ) {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// -- Handlers --

pub async fn login_page(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(LoginTemplate { error: String::new() }).into_response()
}

pub async fn signup_page(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(SignupTemplate { error: String::new() }).into_response()
}

pub async fn sign_in(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || form.password.is_empty() {
        return Ok(Html(LoginTemplate {
            error: "Email and password are required".into(),
        })
        .into_response());
    }

    let found: Option<(i64, String)> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, password_hash FROM users WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok()
    };

    let Some((user_id, password_hash)) = found else {
        return Ok(Html(LoginTemplate {
            error: "Invalid email or password. Please try again.".into(),
        })
        .into_response());
    };

    if !bcrypt::verify(&form.password, &password_hash).unwrap_or(false) {
        return Ok(Html(LoginTemplate {
            error: "Invalid email or password. Please try again.".into(),
        })
        .into_response());
    }

    let token = session::create_session(&state.db, user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn sign_up(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 255 {
        return Ok(Html(SignupTemplate {
            error: "A valid email address is required".into(),
        })
        .into_response());
    }
    if form.password.len() < 8 || form.password.len() > 100 {
        return Ok(Html(SignupTemplate {
            error: "Password must be between 8 and 100 characters".into(),
        })
        .into_response());
    }

    let password_hash = bcrypt::hash(&form.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    let user_id = {
        let conn = state.db.get()?;
        match insert_user(&conn, &email, &password_hash)? {
            Some(id) => id,
            None => {
                return Ok(Html(SignupTemplate {
                    error: "Failed to create account. Please try again.".into(),
                })
                .into_response())
            }
        }
    };

    let token = session::create_session(&state.db, user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn sign_out(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    // Best effort: drop the server-side session for the presented token.
    let cookie_name = state.config.auth.cookie_name.clone();
    if let Some(token) = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|c| c.strip_prefix(&format!("{}=", cookie_name)))
    {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&cookie_name))]),
        Redirect::to("/"),
    )
        .into_response())
}
