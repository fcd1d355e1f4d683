use chrono::Utc;
use contracts::system::auth::{RegisterRequest, TokenClaims};
use contracts::system::users::{CreateAdminUserRequest, User, UserRole};
use sea_orm::DatabaseConnection;

use super::repository;
use crate::shared::error::{AppError, AppResult};
use crate::system::auth::password;

/// Lowercased, trimmed email if it looks like `local@domain.tld`
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    valid.then_some(email)
}

async fn create(
    db: &DatabaseConnection,
    email: &str,
    password_plain: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<String>,
    role: UserRole,
    created_by: Option<String>,
) -> AppResult<User> {
    let email = normalize_email(email)
        .ok_or_else(|| AppError::InvalidArgument("Invalid email format".into()))?;
    password::validate_password_strength(password_plain).map_err(AppError::InvalidArgument)?;

    if repository::get_by_email(db, &email).await?.is_some() {
        return Err(AppError::AlreadyExists(format!(
            "User with email {} already exists",
            email
        )));
    }

    let password_hash = password::hash_password(password_plain)?;
    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        phone,
        phone_verified: false,
        role,
        is_admin: role.is_admin_role(),
        is_active: true,
        created_at: now,
        updated_at: now,
        last_login_at: None,
        created_by,
    };

    // A concurrent sign-up may take the email between the check and the insert.
    if !repository::create_with_password(db, &user, &password_hash).await? {
        return Err(AppError::AlreadyExists(format!(
            "User with email {} already exists",
            user.email
        )));
    }
    Ok(user)
}

/// Self-service sign-up, always as a customer
pub async fn register_customer(db: &DatabaseConnection, req: RegisterRequest) -> AppResult<User> {
    let phone = req
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    create(
        db,
        &req.email,
        &req.password,
        &req.first_name,
        &req.last_name,
        phone,
        UserRole::Customer,
        None,
    )
    .await
}

/// `createAdminUser`: only callers holding the admin claim may create staff
pub async fn create_admin_user(
    db: &DatabaseConnection,
    caller: &TokenClaims,
    req: CreateAdminUserRequest,
) -> AppResult<User> {
    if !caller.admin {
        return Err(AppError::PermissionDenied(
            "Only admins can create admin users".into(),
        ));
    }
    if !req.role.is_admin_role() {
        return Err(AppError::InvalidArgument(format!(
            "Role '{}' is not an admin role",
            req.role.code()
        )));
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "First and last name are required".into(),
        ));
    }

    let user = create(
        db,
        &req.email,
        &req.password,
        &req.first_name,
        &req.last_name,
        None,
        req.role,
        Some(caller.sub.clone()),
    )
    .await?;

    tracing::info!("Admin user {} created by {}", user.email, caller.sub);
    Ok(user)
}

/// Bootstrap account used when the user table is empty
pub async fn create_bootstrap_admin(
    db: &DatabaseConnection,
    email: &str,
    password_plain: &str,
) -> AppResult<User> {
    create(
        db,
        email,
        password_plain,
        "System",
        "Administrator",
        None,
        UserRole::SuperAdmin,
        None,
    )
    .await
}

pub async fn get_by_id(db: &DatabaseConnection, id: &str) -> AppResult<Option<User>> {
    Ok(repository::get_by_id(db, id).await?)
}

/// Verify user credentials (for token issuance)
pub async fn verify_credentials(
    db: &DatabaseConnection,
    email: &str,
    password_plain: &str,
) -> AppResult<Option<User>> {
    let user = match repository::get_by_email(db, email.trim()).await? {
        Some(u) => u,
        None => return Ok(None),
    };

    if !user.is_active {
        return Err(AppError::PermissionDenied("User account is inactive".into()));
    }

    let password_hash = match repository::get_password_hash(db, &user.id).await? {
        Some(hash) => hash,
        None => return Ok(None),
    };

    if !password::verify_password(password_plain, &password_hash)? {
        return Ok(None);
    }

    if let Err(e) = repository::update_last_login(db, &user.id).await {
        tracing::warn!("Failed to update last login for {}: {}", user.id, e);
    }

    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    fn admin_claims() -> TokenClaims {
        TokenClaims {
            sub: "root".into(),
            email: "root@example.com".into(),
            admin: true,
            role: UserRole::SuperAdmin,
            exp: 0,
            iat: 0,
        }
    }

    fn admin_request(email: &str) -> CreateAdminUserRequest {
        CreateAdminUserRequest {
            email: email.into(),
            password: "Secret123".into(),
            first_name: "Ada".into(),
            last_name: "Admin".into(),
            role: UserRole::Manager,
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Jane@Example.COM "),
            Some("jane@example.com".to_string())
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
    }

    #[tokio::test]
    async fn test_register_and_verify_credentials() {
        let db = connect_in_memory().await.unwrap();
        let user = register_customer(
            &db,
            RegisterRequest {
                email: "Shopper@Example.com".into(),
                password: "Groceries1".into(),
                first_name: "Sam".into(),
                last_name: "Shopper".into(),
                phone: Some("+15551234567".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(user.email, "shopper@example.com");
        assert_eq!(user.role, UserRole::Customer);
        assert!(!user.is_admin);

        let found = verify_credentials(&db, "shopper@example.com", "Groceries1")
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let wrong = verify_credentials(&db, "shopper@example.com", "nope")
            .await
            .unwrap();
        assert!(wrong.is_none());
    }

    #[tokio::test]
    async fn test_create_admin_user_rules() {
        let db = connect_in_memory().await.unwrap();

        let mut customer = admin_claims();
        customer.admin = false;
        let err = create_admin_user(&db, &customer, admin_request("m@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let mut req = admin_request("c@example.com");
        req.role = UserRole::Customer;
        let err = create_admin_user(&db, &admin_claims(), req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let mut req = admin_request("weak@example.com");
        req.password = "short".into();
        let err = create_admin_user(&db, &admin_claims(), req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let user = create_admin_user(&db, &admin_claims(), admin_request("m@example.com"))
            .await
            .unwrap();
        assert!(user.is_admin);
        assert_eq!(user.created_by.as_deref(), Some("root"));

        let err = create_admin_user(&db, &admin_claims(), admin_request("M@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }
}
