use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

fn insert_token(
    conn: &Connection,
    user_id: &str,
    kind: TokenKind,
    lifetime: &str,
) -> Result<String, rusqlite::Error> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, kind, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now', ?5), datetime('now'))",
        params![id, user_id, token, kind.as_str(), lifetime],
    )?;

    Ok(token)
}

/// Issue a fresh access + refresh token pair for a user.
pub fn issue_tokens(
    conn: &Connection,
    user_id: &str,
    config: &AuthConfig,
) -> Result<TokenPair, rusqlite::Error> {
    let access_token = insert_token(
        conn,
        user_id,
        TokenKind::Access,
        &format!("{:+} hours", config.access_token_hours),
    )?;
    let refresh_token = insert_token(
        conn,
        user_id,
        TokenKind::Refresh,
        &format!("{:+} days", config.refresh_token_days),
    )?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: config.access_token_hours * 3600,
    })
}

/// Resolve an unexpired token of the given kind to its user id.
pub fn lookup_token(
    conn: &Connection,
    token: &str,
    kind: TokenKind,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id FROM sessions
         WHERE token = ?1 AND kind = ?2 AND expires_at > datetime('now')",
        params![token, kind.as_str()],
        |row| row.get(0),
    )
    .optional()
}

/// Exchange a refresh token for a new pair. The old refresh token is consumed.
pub fn rotate_refresh_token(
    conn: &Connection,
    refresh_token: &str,
    config: &AuthConfig,
) -> Result<Option<(String, TokenPair)>, rusqlite::Error> {
    let Some(user_id) = lookup_token(conn, refresh_token, TokenKind::Refresh)? else {
        return Ok(None);
    };

    conn.execute(
        "DELETE FROM sessions WHERE token = ?1",
        params![refresh_token],
    )?;
    let pair = issue_tokens(conn, &user_id, config)?;
    Ok(Some((user_id, pair)))
}

/// Delete a token by value.
pub fn delete_token(conn: &Connection, token: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop expired tokens. Returns how many were removed.
pub fn purge_expired(conn: &Connection) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn tokens_resolve_only_for_their_kind() {
        let pool = testing::migrated_pool();
        let user = testing::insert_user(&pool, "a@example.com", None);
        let conn = pool.get().unwrap();
        let pair = issue_tokens(&conn, &user, &AuthConfig::default()).unwrap();

        assert_eq!(
            lookup_token(&conn, &pair.access_token, TokenKind::Access).unwrap(),
            Some(user.clone())
        );
        assert_eq!(
            lookup_token(&conn, &pair.access_token, TokenKind::Refresh).unwrap(),
            None
        );
        assert_eq!(pair.expires_in, 24 * 3600);
    }

    #[test]
    fn refresh_rotates_the_token() {
        let pool = testing::migrated_pool();
        let user = testing::insert_user(&pool, "a@example.com", None);
        let conn = pool.get().unwrap();
        let config = AuthConfig::default();
        let pair = issue_tokens(&conn, &user, &config).unwrap();

        let (owner, next) = rotate_refresh_token(&conn, &pair.refresh_token, &config)
            .unwrap()
            .unwrap();
        assert_eq!(owner, user);
        assert_ne!(next.refresh_token, pair.refresh_token);
        assert!(rotate_refresh_token(&conn, &pair.refresh_token, &config)
            .unwrap()
            .is_none());
    }

    #[test]
    fn expired_tokens_are_rejected_and_purged() {
        let pool = testing::migrated_pool();
        let user = testing::insert_user(&pool, "a@example.com", None);
        let conn = pool.get().unwrap();
        let config = AuthConfig {
            access_token_hours: -1,
            ..AuthConfig::default()
        };
        let pair = issue_tokens(&conn, &user, &config).unwrap();
        assert_eq!(
            lookup_token(&conn, &pair.access_token, TokenKind::Access).unwrap(),
            None
        );
        assert_eq!(purge_expired(&conn).unwrap(), 1);
    }
}
