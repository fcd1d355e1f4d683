use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use contracts::system::auth::TokenClaims;
use contracts::system::users::User;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};

const JWT_SECRET_KEY: &str = "jwt_secret";

/// Signing material for id tokens
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl JwtKeys {
    pub fn from_secret(secret: &str, lifetime_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue an id token for `user`. The admin custom claim mirrors
    /// `user.is_admin`.
    pub fn issue(&self, user: &User) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = TokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            admin: user.is_admin,
            role: user.role,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .context("Failed to encode JWT token")?;
        Ok((token, expires_at))
    }

    /// Validate JWT token and extract claims
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let token_data = decode::<TokenClaims>(token, &self.decoding, &Validation::default())
            .context("Failed to decode JWT token")?;
        Ok(token_data.claims)
    }
}

/// Secret from configuration, else the one stored in `sys_settings`, else a
/// freshly generated one that gets stored.
pub async fn load_or_create_secret(
    db: &DatabaseConnection,
    configured: Option<&str>,
) -> Result<String> {
    if let Some(secret) = configured.filter(|s| !s.trim().is_empty()) {
        return Ok(secret.to_string());
    }
    if let Some(secret) = get_jwt_secret_from_db(db).await? {
        return Ok(secret);
    }
    let secret = generate_jwt_secret();
    save_jwt_secret_to_db(db, &secret).await?;
    tracing::info!("Generated new JWT secret");
    Ok(secret)
}

/// Generate a cryptographically secure JWT secret (256 bits)
fn generate_jwt_secret() -> String {
    use base64::{engine::general_purpose, Engine as _};
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen::<u8>()).collect();
    general_purpose::STANDARD.encode(&random_bytes)
}

async fn get_jwt_secret_from_db(db: &DatabaseConnection) -> Result<Option<String>> {
    let result = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT value FROM sys_settings WHERE key = ?",
            [JWT_SECRET_KEY.into()],
        ))
        .await?;

    match result {
        Some(row) => Ok(Some(row.try_get("", "value")?)),
        None => Ok(None),
    }
}

async fn save_jwt_secret_to_db(db: &DatabaseConnection, secret: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT OR REPLACE INTO sys_settings (key, value, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
        [
            JWT_SECRET_KEY.into(),
            secret.to_string().into(),
            "Auto-generated JWT secret for id tokens".into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use contracts::system::users::UserRole;

    fn user(is_admin: bool) -> User {
        let now = Utc::now();
        User {
            id: "u-1".into(),
            email: "ops@example.com".into(),
            first_name: "Ops".into(),
            last_name: "Team".into(),
            phone: None,
            phone_verified: false,
            role: if is_admin { UserRole::Admin } else { UserRole::Customer },
            is_admin,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            created_by: None,
        }
    }

    #[test]
    fn issued_token_carries_admin_claim() {
        let keys = JwtKeys::from_secret("test-secret", 24);
        let (token, expires_at) = keys.issue(&user(true)).unwrap();
        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert!(claims.admin);
        assert_eq!(claims.exp, expires_at.timestamp() as usize);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (token, _) = JwtKeys::from_secret("one", 24).issue(&user(false)).unwrap();
        assert!(JwtKeys::from_secret("two", 24).validate(&token).is_err());
    }

    #[tokio::test]
    async fn generated_secret_is_persisted() {
        let db = connect_in_memory().await.unwrap();
        let first = load_or_create_secret(&db, None).await.unwrap();
        let second = load_or_create_secret(&db, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(load_or_create_secret(&db, Some("fixed")).await.unwrap(), "fixed");
    }
}
