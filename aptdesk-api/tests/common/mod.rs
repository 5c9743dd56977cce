/// Common test utilities for integration tests
///
/// Provides a `TestContext` with a migrated database, the full router, and
/// one seeded user per role. Each context uses unique emails so tests can run
/// against a shared database and clean up after themselves.
use aptdesk_api::app::{build_router, AppState};
use aptdesk_api::config::Config;
use aptdesk_shared::auth::jwt::{create_token, Claims, TokenType};
use aptdesk_shared::auth::password::hash_password;
use aptdesk_shared::models::complaint::{Complaint, CreateComplaint, Priority};
use aptdesk_shared::models::user::{CreateUser, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

/// Plaintext password shared by all seeded test users
pub const TEST_PASSWORD: &str = "Test#Pass1";

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub config: Config,
    pub admin: User,
    pub manager: User,
    pub technician: User,
    pub tenant: User,
}

impl TestContext {
    /// Creates a new test context with a migrated database and seeded users
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        let db = PgPool::connect(&config.database.url).await?;

        aptdesk_shared::db::run_migrations(&db).await?;

        let password_hash = hash_password(TEST_PASSWORD)?;

        let admin = seed_user(&db, UserRole::Admin, &password_hash).await?;
        let manager = seed_user(&db, UserRole::Manager, &password_hash).await?;
        let technician = seed_user(&db, UserRole::Technician, &password_hash).await?;
        let tenant = seed_user(&db, UserRole::Tenant, &password_hash).await?;

        let state = AppState::new(db.clone(), config.clone());
        let app = build_router(state);

        Ok(TestContext {
            db,
            app,
            config,
            admin,
            manager,
            technician,
            tenant,
        })
    }

    /// Returns an authorization header value for a seeded user
    pub fn auth_header(&self, user: &User) -> String {
        let claims = Claims::new(user.id, user.role, TokenType::Access);
        let token = create_token(&claims, &self.config.jwt.secret)
            .expect("token creation should not fail");
        format!("Bearer {}", token)
    }

    /// Returns an authorization header value for an arbitrary user id and role
    pub fn bearer_for(&self, user_id: Uuid, role: UserRole) -> String {
        let claims = Claims::new(user_id, role, TokenType::Access);
        let token = create_token(&claims, &self.config.jwt.secret)
            .expect("token creation should not fail");
        format!("Bearer {}", token)
    }

    /// Creates a complaint owned by the context's tenant, via the model layer
    pub async fn create_test_complaint(&self, title: &str) -> anyhow::Result<Complaint> {
        let token = Complaint::next_token(&self.db).await?;
        let complaint = Complaint::create(
            &self.db,
            CreateComplaint {
                token,
                title: title.to_string(),
                description: format!("{} (test)", title),
                image: String::new(),
                category: "general".to_string(),
                priority: Priority::Medium,
                created_by: self.tenant.id,
            },
        )
        .await?;

        Ok(complaint)
    }

    /// Deactivates a seeded user directly in the database
    pub async fn deactivate_user(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Removes everything this context created
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let user_ids = [
            self.admin.id,
            self.manager.id,
            self.technician.id,
            self.tenant.id,
        ];

        // Complaints first: created_by is a NOT NULL foreign key
        sqlx::query("DELETE FROM complaints WHERE created_by = ANY($1)")
            .bind(&user_ids[..])
            .execute(&self.db)
            .await?;
        sqlx::query("DELETE FROM action_logs WHERE performed_by = ANY($1)")
            .bind(&user_ids[..])
            .execute(&self.db)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&user_ids[..])
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

async fn seed_user(pool: &PgPool, role: UserRole, password_hash: &str) -> anyhow::Result<User> {
    let user = User::create(
        pool,
        CreateUser {
            name: format!("Test {}", role),
            email: format!("test-{}-{}@example.com", role, Uuid::new_v4()),
            password_hash: password_hash.to_string(),
            role,
        },
    )
    .await?;

    Ok(user)
}
