/// User model and database operations
///
/// Accounts are created by an admin (or the startup bootstrap) and never
/// hard-deleted; deactivation flips `is_active` instead.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     role user_role NOT NULL DEFAULT 'tenant',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     last_login_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// User role within the property
///
/// Stored as the `user_role` Postgres enum and serialized lowercase in JSON
/// and JWT claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Resident who files complaints
    Tenant,

    /// Maintenance staff assigned to complaints
    Technician,

    /// Oversees assignment and closure
    Manager,

    /// Full access including user management and analytics
    Admin,
}

impl UserRole {
    /// Manager or admin
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Manager | UserRole::Admin)
    }

    /// Roles an admin may hand out through the create-user endpoint.
    /// Admin accounts only come from the startup bootstrap.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, UserRole::Admin)
    }

    /// Lowercase name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Tenant => "tenant",
            UserRole::Technician => "technician",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lets `&[UserRole]` bind as a Postgres array (`role = ANY($1)`); the derive
/// only covers the scalar type.
impl sqlx::postgres::PgHasArrayType for UserRole {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_user_role")
    }
}

/// User account
///
/// Passwords are stored as Argon2id hashes, never in plaintext. The hash is
/// skipped during serialization so it can never leak through a response body.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address (case-insensitive via CITEXT, unique)
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Role determining which endpoints and transitions are allowed
    pub role: UserRole,

    /// Deactivated accounts cannot log in or be assigned complaints
    pub is_active: bool,

    /// When the user last logged in (None if never)
    pub last_login_at: Option<DateTime<Utc>>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, \
                            last_login_at, created_at, updated_at";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a unique-constraint error if the email is already taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, role, is_active,
                      last_login_at, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.role)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by email (case-insensitive via CITEXT)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Lists all users, newest first
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Lists users of a role, optionally restricted to active accounts,
    /// ordered by name for dropdowns
    pub async fn list_by_role(
        pool: &PgPool,
        role: UserRole,
        only_active: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = $1 AND ($2 = FALSE OR is_active = TRUE) \
             ORDER BY name ASC"
        ))
        .bind(role)
        .bind(only_active)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Stamps `last_login_at` after successful authentication
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts users holding a role
    pub async fn count_by_role(pool: &PgPool, role: UserRole) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Resets an existing account to an active admin with a fresh password.
    /// Used by the startup bootstrap when the admin email already exists.
    pub async fn promote_to_admin(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET role = 'admin', password_hash = $2, is_active = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, password_hash, role, is_active,
                      last_login_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
