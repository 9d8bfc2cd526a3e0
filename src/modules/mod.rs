pub mod books;

use std::sync::Arc;

use anyhow::Context;
use libris_db::{postgres, MemoryTable, Repository};
use libris_kernel::{settings::Settings, ModuleRegistry};

use books::{models::Book, store::PgBookStore};

/// Register all project-specific modules with the registry
pub fn register_all(
    registry: &mut ModuleRegistry,
    settings: &Settings,
    store: Arc<dyn Repository<Book>>,
) -> anyhow::Result<()> {
    registry.register(books::create_module(settings, store))?;
    Ok(())
}

/// Open the book store selected by `database.url`: PostgreSQL when set,
/// process memory otherwise.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn Repository<Book>>> {
    let database = &settings.database;
    let Some(url) = database.url.as_deref() else {
        tracing::warn!("database.url is not set; books are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryTable::<Book>::new()));
    };

    let pool = postgres::connect(url, database)
        .await
        .with_context(|| format!("failed to open {}", database.redacted_url().unwrap_or_default()))?;
    let store = PgBookStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to prepare the book table")?;

    tracing::info!(url = ?database.redacted_url(), "book store ready");
    Ok(Arc::new(store))
}
