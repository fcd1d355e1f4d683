use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use contracts::system::users::{User, UserRole};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, QueryResult, SqlErr, Statement,
};

const USER_COLUMNS: &str = "id, email, first_name, last_name, phone, phone_verified, role, is_admin, is_active, created_at, updated_at, last_login_at, created_by";

/// Pending verification code of a user
#[derive(Debug, Clone)]
pub struct VerificationState {
    pub phone: Option<String>,
    pub code_hash: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub attempts: i32,
}

fn map_row(row: &QueryResult) -> Result<User> {
    let role: String = row.try_get("", "role")?;
    Ok(User {
        id: row.try_get("", "id")?,
        email: row.try_get("", "email")?,
        first_name: row.try_get("", "first_name")?,
        last_name: row.try_get("", "last_name")?,
        phone: row.try_get("", "phone")?,
        phone_verified: row.try_get::<i32>("", "phone_verified")? != 0,
        role: UserRole::from_code(&role).unwrap_or(UserRole::Customer),
        is_admin: row.try_get::<i32>("", "is_admin")? != 0,
        is_active: row.try_get::<i32>("", "is_active")? != 0,
        created_at: row.try_get("", "created_at")?,
        updated_at: row.try_get("", "updated_at")?,
        last_login_at: row.try_get("", "last_login_at")?,
        created_by: row.try_get("", "created_by")?,
    })
}

/// Create user with password hash. `false` when the email is already taken.
pub async fn create_with_password(
    db: &DatabaseConnection,
    user: &User,
    password_hash: &str,
) -> Result<bool> {
    let inserted = db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO sys_users (id, email, password_hash, first_name, last_name, phone, phone_verified, role, is_admin, is_active, created_at, updated_at, last_login_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        [
            user.id.clone().into(),
            user.email.clone().into(),
            password_hash.to_string().into(),
            user.first_name.clone().into(),
            user.last_name.clone().into(),
            user.phone.clone().into(),
            i32::from(user.phone_verified).into(),
            user.role.code().into(),
            i32::from(user.is_admin).into(),
            i32::from(user.is_active).into(),
            user.created_at.into(),
            user.updated_at.into(),
            user.last_login_at.into(),
            user.created_by.clone().into(),
        ],
    ))
    .await;

    match inserted {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to insert user")),
    }
}

pub async fn get_by_id(db: &DatabaseConnection, id: &str) -> Result<Option<User>> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            format!("SELECT {} FROM sys_users WHERE id = ?", USER_COLUMNS),
            [id.into()],
        ))
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<User>> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            format!("SELECT {} FROM sys_users WHERE email = ?", USER_COLUMNS),
            [email.to_lowercase().into()],
        ))
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_password_hash(db: &DatabaseConnection, user_id: &str) -> Result<Option<String>> {
    let result = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT password_hash FROM sys_users WHERE id = ?",
            [user_id.into()],
        ))
        .await?;

    match result {
        Some(row) => Ok(Some(row.try_get("", "password_hash")?)),
        None => Ok(None),
    }
}

pub async fn update_last_login(db: &DatabaseConnection, id: &str) -> Result<()> {
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "UPDATE sys_users SET last_login_at = ? WHERE id = ?",
        [Utc::now().into(), id.into()],
    ))
    .await
    .context("Failed to update last login")?;
    Ok(())
}

pub async fn count_users(db: &DatabaseConnection) -> Result<usize> {
    let result = db
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) as count FROM sys_users".to_string(),
        ))
        .await?;

    match result {
        Some(row) => {
            let count: i64 = row.try_get("", "count")?;
            Ok(count as usize)
        }
        None => Ok(0),
    }
}

pub async fn get_verification_state(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Option<VerificationState>> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT phone, verification_code_hash, verification_code_expiry, verification_attempts
             FROM sys_users WHERE id = ?",
            [user_id.into()],
        ))
        .await?;

    match row {
        Some(row) => Ok(Some(VerificationState {
            phone: row.try_get("", "phone")?,
            code_hash: row.try_get("", "verification_code_hash")?,
            expiry: row.try_get("", "verification_code_expiry")?,
            attempts: row.try_get("", "verification_attempts")?,
        })),
        None => Ok(None),
    }
}

/// Store a fresh code for `phone`, resetting the attempt counter. A number
/// other than the stored one is unverified until its code is confirmed.
pub async fn set_verification_code(
    db: &DatabaseConnection,
    user_id: &str,
    phone: &str,
    code_hash: &str,
    expiry: DateTime<Utc>,
) -> Result<()> {
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "UPDATE sys_users
         SET phone_verified = CASE WHEN phone IS ? THEN phone_verified ELSE 0 END,
             phone = ?, verification_code_hash = ?, verification_code_expiry = ?, verification_attempts = 0, updated_at = ?
         WHERE id = ?",
        [
            phone.into(),
            phone.into(),
            code_hash.into(),
            expiry.into(),
            Utc::now().into(),
            user_id.into(),
        ],
    ))
    .await
    .context("Failed to store verification code")?;
    Ok(())
}

/// Take one verification attempt. `false` once `max_attempts` are used up.
pub async fn reserve_verification_attempt(
    db: &DatabaseConnection,
    user_id: &str,
    max_attempts: i32,
) -> Result<bool> {
    let result = db
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "UPDATE sys_users SET verification_attempts = verification_attempts + 1
             WHERE id = ? AND verification_attempts < ?",
            [user_id.into(), max_attempts.into()],
        ))
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Drop the pending code. `verified` also marks the phone as verified.
pub async fn clear_verification_code(
    db: &DatabaseConnection,
    user_id: &str,
    verified: bool,
) -> Result<()> {
    let sql = if verified {
        "UPDATE sys_users
         SET verification_code_hash = NULL, verification_code_expiry = NULL, verification_attempts = 0, phone_verified = 1, updated_at = ?
         WHERE id = ?"
    } else {
        "UPDATE sys_users
         SET verification_code_hash = NULL, verification_code_expiry = NULL, verification_attempts = 0, updated_at = ?
         WHERE id = ?"
    };
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        sql,
        [Utc::now().into(), user_id.into()],
    ))
    .await?;
    Ok(())
}

/// Clear up to `limit` codes that expired at or before `now`
pub async fn purge_expired_codes(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    limit: u64,
) -> Result<u64> {
    let result = db
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "UPDATE sys_users
             SET verification_code_hash = NULL, verification_code_expiry = NULL, verification_attempts = 0
             WHERE id IN (
                 SELECT id FROM sys_users
                 WHERE verification_code_expiry IS NOT NULL AND verification_code_expiry <= ?
                 LIMIT ?
             )",
            [now.into(), (limit as i64).into()],
        ))
        .await
        .context("Failed to purge expired verification codes")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    fn user(id: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            email: email.into(),
            first_name: "Ada".into(),
            last_name: "Buyer".into(),
            phone: None,
            phone_verified: false,
            role: UserRole::Customer,
            is_admin: false,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_insert_reports_false() {
        let db = connect_in_memory().await.unwrap();
        assert!(create_with_password(&db, &user("u1", "ada@example.com"), "hash")
            .await
            .unwrap());
        assert!(!create_with_password(&db, &user("u2", "ada@example.com"), "hash")
            .await
            .unwrap());
        assert_eq!(count_users(&db).await.unwrap(), 1);
    }
}
