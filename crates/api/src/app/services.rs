use std::sync::Arc;

use anyhow::Context;

use registrar_auth::{Hs256JwtValidator, Sha256PasswordHasher};
use registrar_infra::{
    ContentStore, DocumentRegistry, FeeLedger, FsContentStore, IdentityService,
    InMemoryContentStore, InMemoryRecordStore, RecordStore, RegistrarConfig,
};

/// Services shared by every handler.
pub struct AppServices {
    pub identity: IdentityService,
    pub ledger: FeeLedger,
    pub registry: DocumentRegistry,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
        tokens: Arc<Hs256JwtValidator>,
    ) -> Self {
        Self {
            identity: IdentityService::new(store.clone(), content.clone(), tokens),
            ledger: FeeLedger::new(store.clone()),
            registry: DocumentRegistry::new(store, content),
        }
    }

    /// Re-keys password hashing to `rounds` iterations; stored hashes keep their own count.
    pub fn with_password_rounds(mut self, rounds: u32) -> Self {
        self.identity = self
            .identity
            .with_hasher(Arc::new(Sha256PasswordHasher::with_rounds(rounds)));
        self
    }
}

pub async fn build_services(config: &RegistrarConfig) -> anyhow::Result<AppServices> {
    let tokens = Arc::new(
        Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes())
            .with_ttl(chrono::Duration::minutes(config.token_ttl_minutes)),
    );

    let store = build_record_store(config).await?;
    let content = build_content_store(config).await?;
    let services =
        AppServices::new(store, content, tokens).with_password_rounds(config.password_hash_rounds);

    if let Some(admin) = &config.bootstrap_admin {
        services
            .identity
            .ensure_bootstrap_admin(admin)
            .await
            .context("failed to create bootstrap admin")?;
    }

    Ok(services)
}

async fn build_record_store(config: &RegistrarConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for persistent stores")?;
            let store = registrar_infra::PostgresRecordStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!("using postgres record store");
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    Ok(Arc::new(InMemoryRecordStore::new()))
}

async fn build_content_store(config: &RegistrarConfig) -> anyhow::Result<Arc<dyn ContentStore>> {
    match &config.content_dir {
        Some(dir) => {
            let store = FsContentStore::open(dir.clone())
                .await
                .with_context(|| format!("failed to open content dir {}", dir.display()))?;
            tracing::info!(content_dir = %dir.display(), "using filesystem content store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryContentStore::new())),
    }
}
