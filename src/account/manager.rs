/// Account manager: registration, login, session issuance and validation
use crate::account::{LoginRequest, RegisterRequest, SessionResponse, ValidatedSession};
use crate::access::Role;
use crate::entities::User;
use crate::error::{PortalError, PortalResult};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

/// JWT claims embedded in every access token
#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    /// User id
    sub: String,
    /// Session id
    sid: String,
    iat: i64,
    exp: i64,
}

/// Account manager
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    jwt_secret: String,
    session_ttl: Duration,
}

impl AccountManager {
    pub fn new(db: SqlitePool, jwt_secret: String, session_ttl_secs: i64) -> Self {
        Self {
            db,
            jwt_secret,
            session_ttl: Duration::seconds(session_ttl_secs),
        }
    }

    /// Register a new student account
    pub async fn register(&self, req: RegisterRequest) -> PortalResult<User> {
        req.validate()
            .map_err(|e| PortalError::Validation(e.to_string()))?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&req.email)
            .fetch_optional(&self.db)
            .await?;
        if existing.is_some() {
            return Err(PortalError::Conflict(format!(
                "An account for {} already exists",
                req.email
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let password_hash = hash_password(&req.password)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role, faculty, created_at)
            VALUES (?, ?, ?, ?, 'student', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&req.email)
        .bind(&req.full_name)
        .bind(&password_hash)
        .bind(&req.faculty)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(User {
            id,
            email: req.email,
            full_name: req.full_name,
            password_hash,
            role: Role::Student.as_str().to_string(),
            faculty: req.faculty,
            academic_year: None,
            created_at: now,
        })
    }

    /// Verify credentials and open a session
    pub async fn login(&self, req: LoginRequest) -> PortalResult<SessionResponse> {
        let row = sqlx::query("SELECT id, email, role, password_hash FROM users WHERE email = ?")
            .bind(&req.email)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::Authentication("Invalid email or password".to_string()))?;

        let password_hash: String = row.get("password_hash");
        if !verify_password(&req.password, &password_hash)? {
            return Err(PortalError::Authentication(
                "Invalid email or password".to_string(),
            ));
        }

        let user_id_str: String = row.get("id");
        let user_id = Uuid::parse_str(&user_id_str)
            .map_err(|e| PortalError::Internal(format!("Invalid user id: {}", e)))?;

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id.to_string())
        .bind(user_id.to_string())
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        let access_token = self.issue_token(user_id, session_id, now, expires_at)?;

        Ok(SessionResponse {
            user_id,
            email: row.get("email"),
            role: row.get("role"),
            access_token,
        })
    }

    /// Validate an access token against its live session
    pub async fn validate_access_token(&self, token: &str) -> PortalResult<ValidatedSession> {
        let claims = self.decode_token(token)?;

        let session_id = Uuid::parse_str(&claims.sid)
            .map_err(|_| PortalError::Authentication("Invalid session token".to_string()))?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| PortalError::Authentication("Invalid session token".to_string()))?;

        let expires_at: Option<String> =
            sqlx::query_scalar("SELECT expires_at FROM sessions WHERE id = ? AND user_id = ?")
                .bind(session_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&self.db)
                .await?;

        let expires_at = expires_at
            .ok_or_else(|| PortalError::Authentication("Session not found".to_string()))?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            return Err(PortalError::Authentication("Session expired".to_string()));
        }

        Ok(ValidatedSession {
            user_id,
            session_id,
        })
    }

    /// Drop a session (logout)
    pub async fn revoke_session(&self, session_id: Uuid) -> PortalResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    fn issue_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> PortalResult<String> {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| PortalError::Internal(format!("Token issuance failed: {}", e)))
    }

    fn decode_token(&self, token: &str) -> PortalResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew
        validation.leeway = 60;

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                PortalError::Authentication("Token has expired".to_string())
            }
            _ => PortalError::Authentication("Invalid token".to_string()),
        })
    }
}

fn hash_password(password: &str) -> PortalResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PortalError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> PortalResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PortalError::Internal(format!("Invalid stored hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PortalError::Internal(format!("Password verify failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqlitePool {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        crate::entities::users::tests::create_table(&db).await;

        sqlx::query(
            r#"
            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        db
    }

    fn manager(db: SqlitePool) -> AccountManager {
        AccountManager::new(db, "test-secret-which-is-long-enough-0000".to_string(), 3600)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            full_name: "Ada Lovelace".to_string(),
            password: "correct horse battery".to_string(),
            faculty: Some("engineering".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_login_validate() {
        let manager = manager(test_db().await);

        let user = manager.register(register_request("ada@uni.edu")).await.unwrap();
        assert_eq!(user.role, "student");

        let session = manager
            .login(LoginRequest {
                email: "ada@uni.edu".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.user_id, user.id);

        let validated = manager
            .validate_access_token(&session.access_token)
            .await
            .unwrap();
        assert_eq!(validated.user_id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let manager = manager(test_db().await);

        manager.register(register_request("dup@uni.edu")).await.unwrap();
        let second = manager.register(register_request("dup@uni.edu")).await;
        assert!(matches!(second, Err(PortalError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let manager = manager(test_db().await);
        manager.register(register_request("eve@uni.edu")).await.unwrap();

        let err = manager
            .login(LoginRequest {
                email: "eve@uni.edu".to_string(),
                password: "wrong password".to_string(),
            })
            .await;
        assert!(matches!(err, Err(PortalError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_revoked_session_is_invalid() {
        let manager = manager(test_db().await);
        manager.register(register_request("bob@uni.edu")).await.unwrap();

        let session = manager
            .login(LoginRequest {
                email: "bob@uni.edu".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();

        let validated = manager
            .validate_access_token(&session.access_token)
            .await
            .unwrap();
        manager.revoke_session(validated.session_id).await.unwrap();

        let err = manager.validate_access_token(&session.access_token).await;
        assert!(matches!(err, Err(PortalError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_weak_password_rejected_at_registration() {
        let manager = manager(test_db().await);
        let mut req = register_request("short@uni.edu");
        req.password = "short".to_string();

        let err = manager.register(req).await;
        assert!(matches!(err, Err(PortalError::Validation(_))));
    }
}
