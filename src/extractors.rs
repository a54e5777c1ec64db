use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::auth::session::{self, TokenKind};
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub token: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Extractor that requires a valid bearer access token.
/// Returns 401 if the header is missing, malformed, unknown or expired.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let user_id =
            session::lookup_token(&conn, token, TokenKind::Access)?.ok_or(AppError::Unauthorized)?;

        conn.query_row(
            "SELECT id, email, role FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    role: row.get(2)?,
                    token: token.to_string(),
                })
            },
        )
        .optional()?
        .ok_or(AppError::Unauthorized)
    }
}

/// Optional user extractor: `None` instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Authenticated user with the admin role. Returns 403 for everyone else.
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// JSON body that must pass its `validator` rules before reaching the handler.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| AppError::Validation(validation_message(&errors)))?;
        Ok(ValidatedJson(value))
    }
}

/// `field: message` pairs sorted by field, joined with `"; "`.
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "must be a valid email"))]
        email: String,
        #[validate(length(min = 8, message = "must be at least 8 characters"))]
        password: String,
        #[validate(range(min = 13, max = 120, message = "must be between 13 and 120"))]
        age: Option<i64>,
    }

    #[test]
    fn validation_message_lists_fields_in_order() {
        let signup = Signup {
            email: "nope".into(),
            password: "short".into(),
            age: Some(7),
        };
        let errors = signup.validate().unwrap_err();
        assert_eq!(
            validation_message(&errors),
            "age: must be between 13 and 120; email: must be a valid email; password: must be at least 8 characters"
        );
    }

    #[test]
    fn bearer_token_requires_prefix() {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc123")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc123"));

        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc123")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }

    fn parts_with_token(token: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn state_with_session() -> (AppState, String) {
        let pool = crate::db::testing::migrated_pool();
        let user = crate::db::testing::insert_user(&pool, "alice@example.com", None);
        let pair = session::issue_tokens(
            &pool.get().unwrap(),
            &user,
            &crate::config::AuthConfig::default(),
        )
        .unwrap();
        let state = AppState::new(pool, crate::config::Config::default());
        (state, pair.access_token)
    }

    #[tokio::test]
    async fn current_user_resolves_access_token() {
        let (state, token) = state_with_session();
        let mut parts = parts_with_token(&token);
        let user = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.token, token);
    }

    #[tokio::test]
    async fn database_failure_is_not_reported_as_unauthorized() {
        let (state, token) = state_with_session();
        state
            .db
            .get()
            .unwrap()
            .execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE users;")
            .unwrap();

        let mut parts = parts_with_token(&token);
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)), "got {:?}", err);
    }
}
