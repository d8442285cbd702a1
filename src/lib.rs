//! Book catalog application
//!
//! Wires the application modules onto the catalog kernel: opens the store,
//! applies module schemas, runs module lifecycles and serves HTTP.

pub mod modules;

use anyhow::Context;
use axum::Router;
use catalog_db::SqlitePool;
use catalog_kernel::settings::Settings;
use catalog_kernel::{InitCtx, ModuleRegistry};

/// A bootstrapped application: store open, schema applied, modules started.
pub struct Application {
    settings: Settings,
    pool: SqlitePool,
    registry: ModuleRegistry,
}

impl Application {
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let pool = catalog_db::connect(&settings.database)
            .await
            .context("failed to connect to database")?;

        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &pool);

        let ctx = InitCtx {
            settings: &settings,
            db: &pool,
        };
        registry.init_all(&ctx).await?;

        catalog_db::apply_schema(&pool, &registry.collect_schema())
            .await
            .context("failed to apply schema")?;

        registry.start_all(&ctx).await?;

        Ok(Self {
            settings,
            pool,
            registry,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn router(&self) -> Router {
        catalog_http::build_router(&self.registry, &self.settings)
    }

    /// Serve until shutdown, then stop modules and close the pool.
    pub async fn serve(self) -> anyhow::Result<()> {
        let served = catalog_http::start_server(&self.registry, &self.settings).await;
        self.shutdown().await?;
        served
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.registry.stop_all().await?;
        self.pool.close().await;
        tracing::info!("catalog-app shutdown complete");
        Ok(())
    }
}

/// Bootstrap and serve.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    Application::bootstrap(settings).await?.serve().await
}

/// Create the tables and indexes every module needs, then disconnect.
pub async fn init_database(settings: &Settings) -> anyhow::Result<usize> {
    let pool = catalog_db::connect(&settings.database)
        .await
        .context("failed to connect to database")?;

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, &pool);
    let statements = registry.collect_schema();

    catalog_db::apply_schema(&pool, &statements)
        .await
        .context("failed to apply schema")?;
    pool.close().await;

    Ok(statements.len())
}
