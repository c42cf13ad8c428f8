/// Application context and dependency injection
use crate::{
    account::AccountManager,
    audit::AuditLogSink,
    config::ServerConfig,
    db,
    entities::{DegreeStore, IdeaStore, PaperStore, UserStore},
    error::PortalResult,
    ledger::PendingChangeLedger,
    moderation::ModerationWorkflow,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub users: UserStore,
    pub papers: PaperStore,
    pub ideas: IdeaStore,
    pub degrees: DegreeStore,
    // The audit sink is injected here once and passed to whatever needs
    // it; there is no global logger instance
    pub audit: AuditLogSink,
    pub workflow: ModerationWorkflow,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PortalResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire services over an existing pool (used by tests)
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let accounts = Arc::new(AccountManager::new(
            pool.clone(),
            config.authentication.jwt_secret.clone(),
            config.authentication.session_ttl_secs,
        ));

        let audit = AuditLogSink::new(pool.clone());
        let ledger = PendingChangeLedger::new(pool.clone());
        let workflow = ModerationWorkflow::new(pool.clone(), ledger, audit.clone());

        Self {
            config: Arc::new(config),
            db: pool.clone(),
            accounts,
            users: UserStore::new(pool.clone()),
            papers: PaperStore::new(pool.clone()),
            ideas: IdeaStore::new(pool.clone()),
            degrees: DegreeStore::new(pool),
            audit,
            workflow,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
