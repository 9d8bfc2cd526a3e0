//! Libris application library
//!
//! Wires the project modules into the kernel registry and drives the
//! init → start → serve → stop lifecycle.

pub mod modules;

use std::sync::Arc;

use libris_db::Repository;
use libris_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use modules::books::models::Book;

/// Build a registry with every project module registered against `store`
pub fn build_registry(
    settings: &Settings,
    store: Arc<dyn Repository<Book>>,
) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, settings, store)?;
    Ok(registry)
}

/// Run the application until the HTTP server shuts down
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        address = %settings.server.bind_address(),
        "libris bootstrap starting"
    );

    let store = modules::open_store(&settings).await?;
    let registry = build_registry(&settings, store)?;
    let ctx = InitCtx {
        settings: &settings,
    };

    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;
    tracing::info!("libris bootstrap complete");

    let served = libris_http::start_server(&registry, &settings).await;
    registry.stop_modules().await?;
    served
}
